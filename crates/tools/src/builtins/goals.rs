//! Goal tools, including the curation trigger.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use fincoach_curation::CurationPipeline;
use fincoach_ledger::{GoalStatus, GoalUpdate, LedgerError, LedgerService, NewStep};

use super::{parse_amount, require};
use crate::{ParamType, Tool, ToolOutput, ToolParam, ToolSpec};

/// Parse the `steps` argument.  The model sends either an array of strings
/// or an array of `{description, is_user_defined}` objects; the runtime
/// passes arrays through as their JSON text.
fn parse_steps(raw: Option<&String>) -> Result<Vec<NewStep>> {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        bail!("steps must be a JSON array");
    };
    let Some(items) = value.as_array() else {
        bail!("steps must be a JSON array");
    };

    let mut steps = Vec::with_capacity(items.len());
    for item in items {
        match item {
            serde_json::Value::String(description) => steps.push(NewStep {
                description: description.trim().to_string(),
                is_user_defined: false,
            }),
            serde_json::Value::Object(fields) => {
                let Some(description) = fields.get("description").and_then(|d| d.as_str()) else {
                    bail!("step object is missing 'description'");
                };
                steps.push(NewStep {
                    description: description.trim().to_string(),
                    is_user_defined: fields
                        .get("is_user_defined")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                });
            }
            other => bail!("unexpected step entry: {other}"),
        }
    }
    Ok(steps)
}

fn parse_goal_id(raw: &str) -> Result<Uuid> {
    match raw.trim().parse() {
        Ok(id) => Ok(id),
        Err(_) => bail!("goal_id '{raw}' is not a valid id"),
    }
}

/// Creates a goal with its action steps, deduplicating against existing
/// goal titles.  A fresh goal immediately enqueues resource curation;
/// a deduplicated call writes nothing and does not re-trigger curation.
pub struct CreateGoalTool {
    pub ledger: Arc<LedgerService>,
    pub curation: Arc<CurationPipeline>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for CreateGoalTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_goal".to_string(),
            description: "Create a financial goal with ordered action steps. Safe to call \
                          again for the same goal; near-duplicate titles return the \
                          existing goal."
                .to_string(),
            params: vec![
                ToolParam::required("title", "Short goal title, e.g. 'Buy a House'"),
                ToolParam::optional("description", "One-sentence description"),
                ToolParam::optional("target_amount", "Target amount if stated")
                    .with_type(ParamType::Number),
                ToolParam::optional("current_amount", "Amount already saved")
                    .with_type(ParamType::Number),
                ToolParam::optional(
                    "steps",
                    "Ordered action steps; strings, or objects with description and \
                     is_user_defined (true when the user dictated the step)",
                )
                .with_type(ParamType::Array),
            ],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let title = require(args, "title")?;
        let description = args.get("description").map(String::as_str).unwrap_or("");
        let target_amount = match args.get("target_amount").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_amount(raw)?),
            None => None,
        };
        let current_amount = match args.get("current_amount").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_amount(raw)?),
            None => None,
        };
        let steps = parse_steps(args.get("steps"))?;

        let outcome = match self
            .ledger
            .create_goal(&self.owner_id, title, description, target_amount, current_amount, steps)
            .await
        {
            Ok(outcome) => outcome,
            Err(LedgerError::NotFound(message)) => return Ok(ToolOutput::failed(message)),
            Err(error) => return Err(error.into()),
        };

        if !outcome.deduplicated {
            self.curation.spawn_for_goal(outcome.goal_id, title);
        }

        Ok(ToolOutput::ok(serde_json::to_string(&outcome)?))
    }
}

/// Progress and status updates, plus appending new steps.
pub struct UpdateGoalTool {
    pub ledger: Arc<LedgerService>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for UpdateGoalTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "update_goal".to_string(),
            description: "Update a goal's saved amount or status, or append new steps."
                .to_string(),
            params: vec![
                ToolParam::required("goal_id", "Id returned by create_goal or get_goals"),
                ToolParam::optional("current_amount", "New saved amount")
                    .with_type(ParamType::Number),
                ToolParam::optional("status", "New status")
                    .with_enum(&["active", "completed", "archived"]),
                ToolParam::optional("new_steps", "Steps to append (same shape as create_goal)")
                    .with_type(ParamType::Array),
            ],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let goal_id = parse_goal_id(require(args, "goal_id")?)?;
        let current_amount = match args.get("current_amount").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_amount(raw)?),
            None => None,
        };
        let status = match args.get("status").map(|s| s.trim()).filter(|s| !s.is_empty()) {
            Some(raw) => match GoalStatus::from_label(raw) {
                Some(status) => Some(status),
                None => bail!("unrecognized status '{raw}'"),
            },
            None => None,
        };
        let new_steps = parse_steps(args.get("new_steps"))?;

        let update = GoalUpdate {
            current_amount,
            status,
            new_steps,
        };
        match self.ledger.update_goal(&self.owner_id, goal_id, update).await {
            Ok(()) => Ok(ToolOutput::ok(json!({"goal_id": goal_id, "updated": true}).to_string())),
            Err(LedgerError::NotFound(message)) => Ok(ToolOutput::failed(message)),
            Err(error) => Err(error.into()),
        }
    }
}

/// Goals with their steps and any curated resources.
pub struct GetGoalsTool {
    pub ledger: Arc<LedgerService>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for GetGoalsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_goals".to_string(),
            description: "List the user's goals with steps and curated resources.".to_string(),
            params: vec![],
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        let goals = self.ledger.get_goals(&self.owner_id)?;
        Ok(ToolOutput::ok(serde_json::to_string_pretty(&goals)?))
    }
}

/// Fire-and-forget curation trigger for an existing goal.  Completion is
/// observable only by re-reading the goal's resources via `get_goals`.
pub struct CurateResourcesTool {
    pub curation: Arc<CurationPipeline>,
}

#[async_trait]
impl Tool for CurateResourcesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "curate_resources".to_string(),
            description: "Start background curation of web resources for a goal's steps. \
                          Returns immediately; results appear on the goal later."
                .to_string(),
            params: vec![
                ToolParam::required("goal_id", "Goal to curate resources for"),
                ToolParam::required("goal_title", "Goal title, for logging"),
            ],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let goal_id = parse_goal_id(require(args, "goal_id")?)?;
        let goal_title = require(args, "goal_title")?;
        self.curation.spawn_for_goal(goal_id, goal_title);
        Ok(ToolOutput::ok(
            json!({"goal_id": goal_id, "curation": "started"}).to_string(),
        ))
    }
}
