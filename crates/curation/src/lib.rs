//! Resource curation: from a goal step to a vetted set of web resources.
//!
//! Stages per step: intent extraction → search → filter → guardrailed
//! curation → persistence.  All jobs are globally serialized against the
//! rate-limited search API; see [`pipeline::CurationPipeline`].

pub mod credibility;
pub mod curate;
pub mod error;
pub mod filter;
pub mod intent;
pub mod model;
pub mod pipeline;
pub mod search;

pub use curate::{CurationOutcome, Curator};
pub use error::CurationError;
pub use intent::IntentExtractor;
pub use model::{CurationModel, RouterModel};
pub use pipeline::{
    CurationPipeline, GoalReport, PipelineOptions, PipelineStage, StepReport, StepStatus,
};
pub use search::{BraveSearchApi, Candidate, RawSearchResult, SearchApi, SearchGateway};
