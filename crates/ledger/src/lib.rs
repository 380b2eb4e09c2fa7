//! Ledger: the advisor's persistent record of accounts, balances, and goals.
//!
//! All writes to account/goal rows go through [`LedgerService`]; the curation
//! pipeline gets the narrower [`CurationStore`] handle, which may only touch
//! step intents and resource rows.

pub mod curation_store;
pub mod error;
pub mod locks;
pub mod schema;
pub mod service;
pub mod similarity;
pub mod store;

pub use curation_store::CurationStore;
pub use error::LedgerError;
pub use schema::{
    AccountKind, AccountRecord, AccountType, BalanceEvent, BalanceSource, Goal, GoalStatus,
    IntentConstraints, IntentSpec, Resource, ResourceType, Step, UserJob,
};
pub use service::{
    AccountUpsert, AccountMerge, FinancialSummary, GoalCreateOutcome, GoalDetail, GoalUpdate,
    HistoryPoint, LedgerService, NewStep, StepDetail,
};
pub use store::LedgerDb;
