//! The per-goal curation orchestrator.
//!
//! One job per goal; each of the goal's steps runs the stage sequence
//! intent → search → filter → curate → persist.  A stage failure ends that
//! step with a captured error and moves on to the next step; sibling
//! steps and the goal-level caller never see it.
//!
//! All jobs in the process share one ordering gate: the search API allows
//! a single request per second, so every new job waits for every earlier
//! job to finish, and steps inside a job run strictly sequentially with a
//! fixed delay after each.  Head-of-line blocking is accepted at this
//! scale; the gate is in-process only and provides no cross-process
//! exclusion.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use fincoach_ledger::{CurationStore, Goal, Step};

use crate::curate::Curator;
use crate::error::CurationError;
use crate::filter;
use crate::intent::IntentExtractor;
use crate::model::CurationModel;
use crate::search::{SearchApi, SearchGateway};

/// Stage a failure is attributed to in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Intent,
    Search,
    Filter,
    Curate,
    Persist,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Intent => "intent",
            Self::Search => "search",
            Self::Filter => "filter",
            Self::Curate => "curate",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StepStatus {
    /// Terminal success: resources were persisted.
    Curated {
        resource_count: usize,
        insufficient_sources: bool,
    },
    /// Zero candidates survived filtering.  Not an exception; the step
    /// simply ends with no resources.
    Empty { resource_count: usize },
    /// A stage hard-failed; no further stages ran for this step.
    Failed { stage: PipelineStage, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step_id: Uuid,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalReport {
    pub goal_id: Uuid,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Pause after each step, keeping the job under the search quota even
    /// when the step's own stages were fast.
    pub step_delay: Duration,
    pub min_resources: usize,
    pub max_resources: usize,
    pub max_search_results: usize,
    pub freshness_days: i64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(1100),
            min_resources: 5,
            max_resources: 8,
            max_search_results: 20,
            freshness_days: 730,
        }
    }
}

pub struct CurationPipeline {
    intent: IntentExtractor,
    gateway: SearchGateway,
    curator: Curator,
    store: CurationStore,
    gate: Mutex<()>,
    step_delay: Duration,
}

impl CurationPipeline {
    pub fn new(
        model: Arc<dyn CurationModel>,
        search_api: Arc<dyn SearchApi>,
        store: CurationStore,
        options: PipelineOptions,
    ) -> Self {
        Self {
            intent: IntentExtractor::new(model.clone()),
            gateway: SearchGateway::new(
                search_api,
                options.max_search_results,
                options.freshness_days,
            ),
            curator: Curator::new(model, options.min_resources, options.max_resources),
            store,
            gate: Mutex::new(()),
            step_delay: options.step_delay,
        }
    }

    /// Curate every step of `goal_id`, strictly in order.  Waits for all
    /// previously enqueued jobs (on this pipeline) to finish first.
    pub async fn curate_goal(&self, goal_id: Uuid) -> Result<GoalReport, CurationError> {
        let _slot = self.gate.lock().await;

        let goal = self
            .store
            .goal(goal_id)?
            .ok_or_else(|| CurationError::Storage(anyhow::anyhow!("goal {goal_id} not found")))?;
        let steps = self.store.steps_for_goal(goal_id)?;
        info!(goal = %goal.title, steps = steps.len(), "curation job started");

        let mut reports = Vec::with_capacity(steps.len());
        for step in &steps {
            reports.push(self.run_step(&goal, step).await);
            tokio::time::sleep(self.step_delay).await;
        }

        Ok(GoalReport {
            goal_id,
            steps: reports,
        })
    }

    /// Fire-and-forget trigger.  The caller gets no completion signal;
    /// success is observable only by re-reading the step's resource rows.
    pub fn spawn_for_goal(self: &Arc<Self>, goal_id: Uuid, goal_title: &str) {
        let pipeline = self.clone();
        let title = goal_title.to_string();
        tokio::spawn(async move {
            match pipeline.curate_goal(goal_id).await {
                Ok(report) => {
                    info!(goal = %title, steps = report.steps.len(), "curation job finished")
                }
                Err(error) => warn!(goal = %title, %error, "curation job failed"),
            }
        });
    }

    async fn run_step(&self, goal: &Goal, step: &Step) -> StepReport {
        match self.try_step(goal, step).await {
            Ok(status) => {
                info!(step = %step.description, ?status, "curation step done");
                StepReport {
                    step_id: step.id,
                    status,
                }
            }
            // Not an exception: the step just ends with zero resources.
            Err((_, CurationError::EmptyResult)) => {
                info!(step = %step.description, "no candidates survived filtering");
                StepReport {
                    step_id: step.id,
                    status: StepStatus::Empty { resource_count: 0 },
                }
            }
            Err((stage, error)) => {
                warn!(step = %step.description, %stage, %error, "curation step failed");
                StepReport {
                    step_id: step.id,
                    status: StepStatus::Failed {
                        stage,
                        message: error.to_string(),
                    },
                }
            }
        }
    }

    async fn try_step(
        &self,
        goal: &Goal,
        step: &Step,
    ) -> Result<StepStatus, (PipelineStage, CurationError)> {
        use PipelineStage as Stage;

        let goal_context = if goal.description.is_empty() {
            goal.title.clone()
        } else {
            format!("{}: {}", goal.title, goal.description)
        };

        let intent = self
            .intent
            .extract(&step.description, &goal_context)
            .await
            .map_err(|e| (Stage::Intent, e))?;
        self.store
            .set_step_intent(step, intent.clone())
            .map_err(|e| (Stage::Intent, e.into()))?;

        let candidates = self
            .gateway
            .search(&intent.query_terms)
            .await
            .map_err(|e| (Stage::Search, e))?;

        let filtered = filter::screen(candidates);
        if filtered.is_empty() {
            return Err((Stage::Filter, CurationError::EmptyResult));
        }

        let outcome = self
            .curator
            .curate(step.id, &step.description, &intent, &filtered)
            .await
            .map_err(|e| (Stage::Curate, e))?;

        self.store
            .replace_resources(step.id, &outcome.resources)
            .map_err(|e| (Stage::Persist, e.into()))?;

        Ok(StepStatus::Curated {
            resource_count: outcome.resources.len(),
            insufficient_sources: outcome.insufficient_sources,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use fincoach_ledger::{LedgerDb, LedgerService, NewStep};

    use crate::search::RawSearchResult;

    /// Answers intent prompts with a fixed intent and curation prompts by
    /// selecting the first N candidate URLs it finds in the prompt.
    struct ScriptedModel {
        picks: usize,
        extra_url: Option<String>,
        fail_on_step: Option<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(picks: usize) -> Self {
            Self {
                picks,
                extra_url: None,
                fail_on_step: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CurationModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String, CurationError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(ref marker) = self.fail_on_step {
                if prompt.contains(marker.as_str()) {
                    return Err(CurationError::Upstream("scripted outage".to_string()));
                }
            }

            if prompt.contains("structured search intent") {
                return Ok(r#"{
                    "user_job": "compare",
                    "constraints": {},
                    "resource_types_needed": ["comparison", "official"],
                    "query_terms": "mortgage lender comparison rates"
                }"#
                .to_string());
            }

            // Curation prompt: pick the first `picks` candidate URLs listed.
            let mut urls: Vec<String> = prompt
                .lines()
                .filter_map(|line| line.trim().strip_prefix("url: "))
                .map(str::to_string)
                .take(self.picks)
                .collect();
            if let Some(ref fake) = self.extra_url {
                urls.push(fake.clone());
            }
            let selections: Vec<String> = urls
                .iter()
                .enumerate()
                .map(|(i, url)| {
                    let resource_type = if i % 2 == 0 { "comparison" } else { "official" };
                    format!(r#"{{"url": "{url}", "resource_type": "{resource_type}"}}"#)
                })
                .collect();
            Ok(format!(
                r#"{{"selections": [{}], "insufficient_sources": false}}"#,
                selections.join(", ")
            ))
        }
    }

    struct CannedSearch(Vec<RawSearchResult>);

    #[async_trait]
    impl SearchApi for CannedSearch {
        async fn search(
            &self,
            _query: &str,
            _freshness: &str,
            _count: usize,
        ) -> Result<Vec<RawSearchResult>, CurationError> {
            Ok(self.0.clone())
        }
    }

    fn canned_results(n: usize) -> Vec<RawSearchResult> {
        (0..n)
            .map(|i| RawSearchResult {
                title: format!("Mortgage lender review {i}"),
                url: format!("https://lender-site-{i}.com/review"),
                description: "A thorough review of this mortgage lender's rates.".to_string(),
            })
            .collect()
    }

    fn fast_options() -> PipelineOptions {
        PipelineOptions {
            step_delay: Duration::from_millis(0),
            ..PipelineOptions::default()
        }
    }

    async fn seed_goal(
        service: &LedgerService,
        steps: &[&str],
    ) -> (Uuid, Vec<fincoach_ledger::Step>) {
        let outcome = service
            .create_goal(
                "alice",
                "Buy a House",
                "Save for a down payment and find a lender",
                None,
                None,
                steps
                    .iter()
                    .map(|d| NewStep {
                        description: d.to_string(),
                        is_user_defined: false,
                    })
                    .collect(),
            )
            .await
            .unwrap();
        let store = CurationStore::new(service.db());
        let steps = store.steps_for_goal(outcome.goal_id).unwrap();
        (outcome.goal_id, steps)
    }

    fn build_pipeline(
        dir: &TempDir,
        model: Arc<ScriptedModel>,
        results: Vec<RawSearchResult>,
    ) -> (LedgerService, Arc<CurationPipeline>) {
        let db = Arc::new(LedgerDb::open(dir.path().join("ledger.redb")).unwrap());
        let service = LedgerService::new(db.clone());
        let pipeline = Arc::new(CurationPipeline::new(
            model,
            Arc::new(CannedSearch(results)),
            CurationStore::new(db),
            fast_options(),
        ));
        (service, pipeline)
    }

    #[tokio::test]
    async fn end_to_end_step_curation() {
        let dir = TempDir::new().unwrap();
        let (service, pipeline) =
            build_pipeline(&dir, Arc::new(ScriptedModel::new(6)), canned_results(8));
        let (goal_id, steps) =
            seed_goal(&service, &["Research mortgage lenders and compare rates"]).await;

        let report = pipeline.curate_goal(goal_id).await.unwrap();
        assert_eq!(report.steps.len(), 1);
        let StepStatus::Curated {
            resource_count,
            insufficient_sources,
        } = &report.steps[0].status
        else {
            panic!("expected curated status, got {:?}", report.steps[0].status);
        };
        assert!((5..=8).contains(resource_count));
        assert!(!insufficient_sources);

        let store = CurationStore::new(service.db());
        // Intent was written onto the step.
        let step = &store.steps_for_goal(goal_id).unwrap()[0];
        let intent = step.intent.as_ref().expect("intent stored");
        assert!(intent.query_terms.contains("mortgage"));

        // Persisted rows equal the curated set, all URL-matching candidates.
        let resources = store.resources_for_step(steps[0].id).unwrap();
        assert_eq!(resources.len(), *resource_count);
        assert!(resources
            .iter()
            .all(|r| r.url.starts_with("https://lender-site-")));
    }

    #[tokio::test]
    async fn hallucinated_url_never_persists() {
        let dir = TempDir::new().unwrap();
        let mut model = ScriptedModel::new(5);
        model.extra_url = Some("https://totally-invented.com/page".to_string());
        let (service, pipeline) = build_pipeline(&dir, Arc::new(model), canned_results(8));
        let (goal_id, steps) = seed_goal(&service, &["Compare lenders"]).await;

        pipeline.curate_goal(goal_id).await.unwrap();
        let store = CurationStore::new(service.db());
        let resources = store.resources_for_step(steps[0].id).unwrap();
        assert_eq!(resources.len(), 5);
        assert!(resources.iter().all(|r| r.url != "https://totally-invented.com/page"));
    }

    #[tokio::test]
    async fn step_failure_is_isolated_from_siblings() {
        let dir = TempDir::new().unwrap();
        let mut model = ScriptedModel::new(6);
        model.fail_on_step = Some("BROKEN".to_string());
        let (service, pipeline) = build_pipeline(&dir, Arc::new(model), canned_results(8));
        let (goal_id, steps) = seed_goal(
            &service,
            &["Compare lenders", "BROKEN step that cannot curate", "Estimate closing costs"],
        )
        .await;

        let report = pipeline.curate_goal(goal_id).await.unwrap();
        assert_eq!(report.steps.len(), 3);
        assert!(matches!(report.steps[0].status, StepStatus::Curated { .. }));
        assert!(matches!(
            report.steps[1].status,
            StepStatus::Failed {
                stage: PipelineStage::Intent,
                ..
            }
        ));
        assert!(matches!(report.steps[2].status, StepStatus::Curated { .. }));

        let store = CurationStore::new(service.db());
        assert!(store.resources_for_step(steps[1].id).unwrap().is_empty());
        assert!(!store.resources_for_step(steps[2].id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_filter_result_reports_zero_resources() {
        let dir = TempDir::new().unwrap();
        // Every search result is too thin to survive the filter.
        let thin: Vec<RawSearchResult> = (0..4)
            .map(|i| RawSearchResult {
                title: "tiny".to_string(),
                url: format!("https://thin-{i}.com"),
                description: "short".to_string(),
            })
            .collect();
        let (service, pipeline) = build_pipeline(&dir, Arc::new(ScriptedModel::new(6)), thin);
        let (goal_id, _steps) = seed_goal(&service, &["Compare lenders"]).await;

        let report = pipeline.curate_goal(goal_id).await.unwrap();
        assert!(matches!(
            report.steps[0].status,
            StepStatus::Empty { resource_count: 0 }
        ));
    }

    #[tokio::test]
    async fn concurrent_goal_jobs_are_serialized() {
        let dir = TempDir::new().unwrap();
        let model = Arc::new(ScriptedModel::new(6));
        let (service, pipeline) = build_pipeline(&dir, model.clone(), canned_results(8));
        let (goal_a, _) = seed_goal(&service, &["Compare lenders", "Estimate closing costs"]).await;
        let goal_b = service
            .create_goal(
                "alice",
                "Pay off student loans",
                "",
                None,
                None,
                vec![NewStep {
                    description: "Compare refinancing offers".to_string(),
                    is_user_defined: false,
                }],
            )
            .await
            .unwrap()
            .goal_id;

        let a = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.curate_goal(goal_a).await })
        };
        let b = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.curate_goal(goal_b).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(
            model.max_in_flight.load(Ordering::SeqCst),
            1,
            "model calls from different jobs must never overlap"
        );
    }

    #[tokio::test]
    async fn recuration_replaces_prior_resources() {
        let dir = TempDir::new().unwrap();
        let (service, pipeline) =
            build_pipeline(&dir, Arc::new(ScriptedModel::new(6)), canned_results(8));
        let (goal_id, steps) = seed_goal(&service, &["Compare lenders"]).await;

        pipeline.curate_goal(goal_id).await.unwrap();
        let store = CurationStore::new(service.db());
        let first: Vec<Uuid> = store
            .resources_for_step(steps[0].id)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();

        pipeline.curate_goal(goal_id).await.unwrap();
        let second = store.resources_for_step(steps[0].id).unwrap();
        assert_eq!(second.len(), first.len());
        assert!(
            second.iter().all(|r| !first.contains(&r.id)),
            "rows are replaced, not merged"
        );
    }
}
