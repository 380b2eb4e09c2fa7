use thiserror::Error;

/// Per-stage failures inside the curation pipeline.
///
/// A guardrail trim (a curated URL outside the candidate set) is *not* an
/// error; the offending item is dropped and the pipeline continues.
#[derive(Debug, Error)]
pub enum CurationError {
    /// The model's response did not match the expected JSON shape.
    #[error("contract violation: {0}")]
    Contract(String),

    /// The search or LLM API was unreachable, unauthorized, or non-2xx.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Zero candidates survived search + filtering.
    #[error("no candidates survived filtering")]
    EmptyResult,

    #[error("curation storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
