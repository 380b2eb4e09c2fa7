//! Stage 4: guardrailed LLM selection over filtered candidates.
//!
//! The model proposes 5–8 picks; code enforces the post-conditions it
//! cannot be trusted with.  Any returned URL that is not *exactly* a
//! candidate URL is dropped (hallucination self-healing, not an error),
//! and `insufficient_sources` is forced true whenever fewer than the
//! minimum survive, regardless of what the model claimed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use fincoach_ledger::{IntentSpec, Resource, ResourceType};
use fincoach_llm::extract_json_block;

use crate::error::CurationError;
use crate::model::CurationModel;
use crate::search::Candidate;

pub struct Curator {
    model: Arc<dyn CurationModel>,
    min_picks: usize,
    max_picks: usize,
}

#[derive(Debug, Clone)]
pub struct CurationOutcome {
    pub resources: Vec<Resource>,
    pub insufficient_sources: bool,
}

#[derive(Debug, Deserialize)]
struct RawCuration {
    #[serde(default)]
    selections: Vec<RawSelection>,
    #[serde(default)]
    insufficient_sources: bool,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    url: String,
    #[serde(default)]
    resource_type: Option<String>,
}

impl Curator {
    pub fn new(model: Arc<dyn CurationModel>, min_picks: usize, max_picks: usize) -> Self {
        Self {
            model,
            min_picks,
            max_picks,
        }
    }

    pub async fn curate(
        &self,
        step_id: Uuid,
        step_description: &str,
        intent: &IntentSpec,
        candidates: &[Candidate],
    ) -> Result<CurationOutcome, CurationError> {
        let prompt = self.build_prompt(step_description, intent, candidates);
        let raw = self.model.complete(&prompt).await?;
        let parsed: RawCuration = extract_json_block(&raw).ok_or_else(|| {
            CurationError::Contract("curation response is not the expected JSON shape".to_string())
        })?;
        Ok(self.apply_guardrails(step_id, parsed, candidates))
    }

    fn build_prompt(
        &self,
        step_description: &str,
        intent: &IntentSpec,
        candidates: &[Candidate],
    ) -> String {
        let listing: String = candidates
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                format!(
                    "{}. {}\n   url: {}\n   publisher: {} (credibility {:.2})\n   {}",
                    idx + 1,
                    c.title,
                    c.url,
                    c.publisher,
                    c.credibility,
                    c.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Select the {min}-{max} most useful resources for this personal-finance step.

Step: {step}
User job: {job:?}
Resource types wanted: {types:?}

DIVERSITY RULE: span at least 3 distinct publishers and at least 2 resource types.
Only use URLs from the candidate list, copied exactly.

Respond with exactly one JSON object:
{{
  "selections": [{{"url": "<candidate url>", "resource_type": "<guide|comparison|calculator|official|article|video>"}}],
  "insufficient_sources": <true when the candidates cannot support {min} good picks>
}}

Candidates:
{listing}"#,
            min = self.min_picks,
            max = self.max_picks,
            step = step_description,
            job = intent.user_job,
            types = intent.resource_types_needed,
        )
    }

    fn apply_guardrails(
        &self,
        step_id: Uuid,
        parsed: RawCuration,
        candidates: &[Candidate],
    ) -> CurationOutcome {
        let by_url: HashMap<&str, &Candidate> =
            candidates.iter().map(|c| (c.url.as_str(), c)).collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut resources: Vec<Resource> = Vec::new();
        for selection in parsed.selections {
            let Some(candidate) = by_url.get(selection.url.as_str()) else {
                warn!(url = %selection.url, "curated URL not in candidate set; dropping");
                continue;
            };
            if !seen.insert(candidate.url.clone()) {
                continue;
            }
            let resource_type = selection
                .resource_type
                .as_deref()
                .and_then(ResourceType::from_label)
                .unwrap_or(ResourceType::Article);
            resources.push(Resource {
                id: Uuid::new_v4(),
                step_id,
                title: candidate.title.clone(),
                url: candidate.url.clone(),
                publisher: candidate.publisher.clone(),
                resource_type,
                credibility_score: candidate.credibility,
            });
            if resources.len() == self.max_picks {
                break;
            }
        }

        let insufficient_sources = parsed.insufficient_sources || resources.len() < self.min_picks;

        // Diversity is observed, not enforced: the prompt states the rule,
        // but a violating set is only logged.
        let publishers: HashSet<&str> = resources.iter().map(|r| r.publisher.as_str()).collect();
        let types: HashSet<ResourceType> = resources.iter().map(|r| r.resource_type).collect();
        if !resources.is_empty() && (publishers.len() < 3 || types.len() < 2) {
            warn!(
                publishers = publishers.len(),
                resource_types = types.len(),
                "curated set does not satisfy the diversity rule"
            );
        }

        CurationOutcome {
            resources,
            insufficient_sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fincoach_ledger::{IntentConstraints, UserJob};

    struct CannedModel(String);

    #[async_trait]
    impl CurationModel for CannedModel {
        async fn complete(&self, _prompt: &str) -> Result<String, CurationError> {
            Ok(self.0.clone())
        }
    }

    fn intent() -> IntentSpec {
        IntentSpec {
            user_job: UserJob::Compare,
            constraints: IntentConstraints::default(),
            resource_types_needed: vec![ResourceType::Comparison],
            query_terms: "compare mortgage lenders".to_string(),
        }
    }

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                title: format!("Mortgage lender comparison {i}"),
                url: format!("https://site{i}.com/lenders"),
                description: "An in-depth comparison of mortgage lenders.".to_string(),
                publisher: format!("site{i}.com"),
                credibility: 0.5,
            })
            .collect()
    }

    fn selections_json(urls: &[&str], insufficient: bool) -> String {
        let selections: Vec<String> = urls
            .iter()
            .map(|u| format!(r#"{{"url": "{u}", "resource_type": "comparison"}}"#))
            .collect();
        format!(
            r#"{{"selections": [{}], "insufficient_sources": {insufficient}}}"#,
            selections.join(", ")
        )
    }

    async fn run(reply: String, candidates: &[Candidate]) -> CurationOutcome {
        Curator::new(Arc::new(CannedModel(reply)), 5, 8)
            .curate(Uuid::new_v4(), "Compare lenders", &intent(), candidates)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn foreign_url_dropped_others_kept() {
        let cands = candidates(6);
        let reply = selections_json(
            &[
                "https://site0.com/lenders",
                "https://site1.com/lenders",
                "https://made-up-by-the-model.com/fake",
                "https://site2.com/lenders",
                "https://site3.com/lenders",
                "https://site4.com/lenders",
            ],
            false,
        );
        let outcome = run(reply, &cands).await;
        assert_eq!(outcome.resources.len(), 5);
        assert!(outcome
            .resources
            .iter()
            .all(|r| r.url != "https://made-up-by-the-model.com/fake"));
        assert!(!outcome.insufficient_sources, "5 survivors meet the minimum");
    }

    #[tokio::test]
    async fn dropping_below_minimum_forces_insufficient() {
        let cands = candidates(6);
        // Model says sufficient, but only 4 of its URLs are real.
        let reply = selections_json(
            &[
                "https://site0.com/lenders",
                "https://site1.com/lenders",
                "https://site2.com/lenders",
                "https://site3.com/lenders",
                "https://phantom.com/a",
                "https://phantom.com/b",
            ],
            false,
        );
        let outcome = run(reply, &cands).await;
        assert_eq!(outcome.resources.len(), 4);
        assert!(
            outcome.insufficient_sources,
            "must be forced true even though the model said false"
        );
    }

    #[tokio::test]
    async fn model_reported_insufficient_is_kept() {
        let cands = candidates(6);
        let reply = selections_json(
            &[
                "https://site0.com/lenders",
                "https://site1.com/lenders",
                "https://site2.com/lenders",
                "https://site3.com/lenders",
                "https://site4.com/lenders",
            ],
            true,
        );
        let outcome = run(reply, &cands).await;
        assert_eq!(outcome.resources.len(), 5);
        assert!(outcome.insufficient_sources);
    }

    #[tokio::test]
    async fn duplicate_selections_counted_once() {
        let cands = candidates(6);
        let reply = selections_json(
            &[
                "https://site0.com/lenders",
                "https://site0.com/lenders",
                "https://site1.com/lenders",
            ],
            false,
        );
        let outcome = run(reply, &cands).await;
        assert_eq!(outcome.resources.len(), 2);
    }

    #[tokio::test]
    async fn selections_capped_at_max() {
        let cands = candidates(12);
        let urls: Vec<String> = (0..12).map(|i| format!("https://site{i}.com/lenders")).collect();
        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let reply = selections_json(&url_refs, false);
        let outcome = run(reply, &cands).await;
        assert_eq!(outcome.resources.len(), 8);
    }

    #[tokio::test]
    async fn resource_fields_come_from_the_candidate() {
        let cands = candidates(6);
        let reply = selections_json(&["https://site2.com/lenders"], true);
        let outcome = run(reply, &cands).await;
        let resource = &outcome.resources[0];
        assert_eq!(resource.title, "Mortgage lender comparison 2");
        assert_eq!(resource.publisher, "site2.com");
        assert_eq!(resource.credibility_score, 0.5);
        assert_eq!(resource.resource_type, ResourceType::Comparison);
    }

    #[tokio::test]
    async fn unparseable_reply_is_contract_violation() {
        let result = Curator::new(
            Arc::new(CannedModel("no json here".to_string())),
            5,
            8,
        )
        .curate(Uuid::new_v4(), "step", &intent(), &candidates(6))
        .await;
        assert!(matches!(result, Err(CurationError::Contract(_))));
    }

    #[tokio::test]
    async fn unknown_resource_type_defaults_to_article() {
        let cands = candidates(6);
        let reply = r#"{"selections": [{"url": "https://site0.com/lenders", "resource_type": "mixtape"}], "insufficient_sources": true}"#;
        let outcome = run(reply.to_string(), &cands).await;
        assert_eq!(outcome.resources[0].resource_type, ResourceType::Article);
    }
}
