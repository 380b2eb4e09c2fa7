//! The curation pipeline's write handle.
//!
//! Curation owns exactly two pieces of ledger state: the intent spec on a
//! step and the resource rows under a step.  This wrapper exposes only
//! those writes (plus the reads the pipeline needs), so goal/account state
//! stays writable through [`crate::LedgerService`] alone.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::schema::{Goal, IntentSpec, Resource, Step};
use crate::store::LedgerDb;

#[derive(Clone)]
pub struct CurationStore {
    db: Arc<LedgerDb>,
}

impl CurationStore {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    pub fn goal(&self, goal_id: Uuid) -> Result<Option<Goal>> {
        self.db.get_goal(goal_id)
    }

    /// Steps in numeric order, as the pipeline processes them.
    pub fn steps_for_goal(&self, goal_id: Uuid) -> Result<Vec<Step>> {
        self.db.steps_for_goal(goal_id)
    }

    pub fn set_step_intent(&self, step: &Step, intent: IntentSpec) -> Result<()> {
        let mut updated = step.clone();
        updated.intent = Some(intent);
        self.db.put_step(&updated)
    }

    /// Replace the full resource set for a step (delete-then-insert).
    pub fn replace_resources(&self, step_id: Uuid, resources: &[Resource]) -> Result<()> {
        self.db.replace_resources(step_id, resources)
    }

    pub fn resources_for_step(&self, step_id: Uuid) -> Result<Vec<Resource>> {
        self.db.resources_for_step(step_id)
    }
}
