//! Stage 1: turn a goal step into a structured search intent.
//!
//! The model is asked for a fixed-schema JSON object and nothing else.
//! Anything that fails to parse into the full shape is a contract
//! violation and hard-fails the step, with no partial acceptance.

use std::sync::Arc;

use serde::Deserialize;

use fincoach_ledger::{IntentConstraints, IntentSpec, ResourceType, UserJob};
use fincoach_llm::extract_json_block;

use crate::error::CurationError;
use crate::model::CurationModel;

pub struct IntentExtractor {
    model: Arc<dyn CurationModel>,
}

/// Tolerantly-typed wire shape; validated into [`IntentSpec`] afterwards.
#[derive(Debug, Deserialize)]
struct RawIntent {
    user_job: String,
    #[serde(default)]
    constraints: IntentConstraints,
    resource_types_needed: Vec<String>,
    query_terms: String,
}

impl IntentExtractor {
    pub fn new(model: Arc<dyn CurationModel>) -> Self {
        Self { model }
    }

    pub async fn extract(
        &self,
        step_description: &str,
        goal_context: &str,
    ) -> Result<IntentSpec, CurationError> {
        let prompt = build_prompt(step_description, goal_context);
        let raw = self.model.complete(&prompt).await?;
        parse_intent(&raw)
    }
}

fn build_prompt(step_description: &str, goal_context: &str) -> String {
    format!(
        r#"You convert one step of a personal-finance goal into a structured search intent.

Respond with exactly one JSON object and nothing else:
{{
  "user_job": "<one of: learn, compare, choose, estimate, plan, apply, track>",
  "constraints": {{
    "budget": "<optional>",
    "timeline": "<optional>",
    "location": "<optional>",
    "risk_tolerance": "<optional>",
    "vendor_preference": "<optional>"
  }},
  "resource_types_needed": ["<subset of: guide, comparison, calculator, official, article, video>"],
  "query_terms": "<exactly one web search query>"
}}

Give a single query in query_terms: one, not a list.

Goal: {goal_context}
Step: {step_description}"#
    )
}

/// Strict validation of the model's reply.  Every failure mode maps to
/// [`CurationError::Contract`].
fn parse_intent(raw: &str) -> Result<IntentSpec, CurationError> {
    let parsed: RawIntent = extract_json_block(raw).ok_or_else(|| {
        CurationError::Contract("intent response is not the expected JSON shape".to_string())
    })?;

    let user_job = UserJob::from_label(&parsed.user_job).ok_or_else(|| {
        CurationError::Contract(format!("unknown user_job '{}'", parsed.user_job))
    })?;

    let mut resource_types = Vec::with_capacity(parsed.resource_types_needed.len());
    for label in &parsed.resource_types_needed {
        let resource_type = ResourceType::from_label(label).ok_or_else(|| {
            CurationError::Contract(format!("unknown resource type '{label}'"))
        })?;
        if !resource_types.contains(&resource_type) {
            resource_types.push(resource_type);
        }
    }
    if resource_types.is_empty() {
        return Err(CurationError::Contract(
            "resource_types_needed is empty".to_string(),
        ));
    }

    let query = parsed.query_terms.trim();
    if query.is_empty() {
        return Err(CurationError::Contract("query_terms is empty".to_string()));
    }

    Ok(IntentSpec {
        user_job,
        constraints: parsed.constraints,
        resource_types_needed: resource_types,
        query_terms: query.to_string(),
    })
}
