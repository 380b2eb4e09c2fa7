use thiserror::Error;

/// Failures surfaced to the tool-calling layer.  `NotFound` is the only
/// variant the advisor is expected to explain to the user (e.g. a merge
/// naming an account that was never recorded); storage failures are bugs or
/// environment problems.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
