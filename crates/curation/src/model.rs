//! LLM seam for the curation stages.
//!
//! Intent extraction and curation both need one completion call with a
//! JSON-contract prompt.  The trait keeps the pipeline testable against
//! canned models; the production implementation delegates to the same
//! router the advisor uses.

use async_trait::async_trait;

use fincoach_llm::{LlmRouter, Provider};

use crate::error::CurationError;

#[async_trait]
pub trait CurationModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CurationError>;
}

pub struct RouterModel {
    router: LlmRouter,
    provider: Provider,
    ollama_model: String,
    openrouter_model: String,
}

impl RouterModel {
    pub fn new(
        router: LlmRouter,
        provider: Provider,
        ollama_model: impl Into<String>,
        openrouter_model: impl Into<String>,
    ) -> Self {
        Self {
            router,
            provider,
            ollama_model: ollama_model.into(),
            openrouter_model: openrouter_model.into(),
        }
    }
}

#[async_trait]
impl CurationModel for RouterModel {
    async fn complete(&self, prompt: &str) -> Result<String, CurationError> {
        self.router
            .chat(
                self.provider,
                &self.ollama_model,
                &self.openrouter_model,
                prompt,
            )
            .await
            .map_err(|e| CurationError::Upstream(e.to_string()))
    }
}
