//! Account and goal reconciliation.
//!
//! All mutations are serialized on in-process keyed locks: account upserts
//! and merges on `(kind, owner, normalized-name)`, goal creation per owner.
//! Two calls for the same logical account never interleave; unrelated
//! accounts proceed in parallel.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::locks::KeyedLocks;
use crate::schema::{
    AccountKind, AccountRecord, AccountType, BalanceEvent, BalanceSource, Goal, GoalStatus,
    Resource, Step,
};
use crate::similarity::title_similarity;
use crate::store::{account_key, normalize_name, LedgerDb};

/// Default normalized-similarity threshold above which a new goal title is
/// treated as a duplicate of an existing goal.
pub const DEFAULT_GOAL_DEDUP_THRESHOLD: f64 = 0.7;

// ── Inputs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AccountUpsert {
    pub owner_id: String,
    pub kind: AccountKind,
    pub account_type: AccountType,
    pub name: String,
    pub value: Decimal,
    pub effective_date: DateTime<Utc>,
    pub source: BalanceSource,
    pub is_active: bool,
}

/// Rename-and-update for name clarification ("my checking" → "Chase
/// Checking").  Keyed by the old name so a rename and a concurrent upsert
/// under the old name cannot race.
#[derive(Debug, Clone)]
pub struct AccountMerge {
    pub owner_id: String,
    pub kind: AccountKind,
    pub account_type: AccountType,
    pub old_name: String,
    pub new_name: String,
    pub value: Decimal,
    pub effective_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStep {
    pub description: String,
    pub is_user_defined: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    pub current_amount: Option<Decimal>,
    pub status: Option<GoalStatus>,
    pub new_steps: Vec<NewStep>,
}

// ── Outputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GoalCreateOutcome {
    pub goal_id: Uuid,
    /// `true` when an existing goal's title matched and nothing was written.
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinancialSummary {
    pub assets_total: Decimal,
    pub debts_total: Decimal,
    pub net_worth: Decimal,
    pub assets: Vec<AccountRecord>,
    pub debts: Vec<AccountRecord>,
}

/// One point of the reconstructed net-worth series.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub assets: Decimal,
    pub debts: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepDetail {
    pub step: Step,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalDetail {
    pub goal: Goal,
    pub steps: Vec<StepDetail>,
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct LedgerService {
    db: Arc<LedgerDb>,
    account_locks: KeyedLocks,
    goal_locks: KeyedLocks,
    dedup_threshold: f64,
}

impl LedgerService {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self {
            db,
            account_locks: KeyedLocks::new(),
            goal_locks: KeyedLocks::new(),
            dedup_threshold: DEFAULT_GOAL_DEDUP_THRESHOLD,
        }
    }

    pub fn with_dedup_threshold(mut self, threshold: f64) -> Self {
        self.dedup_threshold = threshold;
        self
    }

    pub fn db(&self) -> Arc<LedgerDb> {
        self.db.clone()
    }

    fn account_lock_key(kind: AccountKind, owner_id: &str, normalized_name: &str) -> String {
        format!("{}|{owner_id}|{normalized_name}", kind.slug())
    }

    // ── upsert ───────────────────────────────────────────────────────────

    /// Insert-or-update one logical account and always append a history
    /// event.  The main record only moves forward: an incoming effective
    /// date older than the stored one is a backfill and leaves the record
    /// untouched.
    pub async fn upsert_account(&self, input: AccountUpsert) -> Result<Uuid, LedgerError> {
        let normalized = normalize_name(&input.name);
        let lock_key = Self::account_lock_key(input.kind, &input.owner_id, &normalized);
        let _guard = self.account_locks.acquire(&lock_key).await;

        let dedup_key = account_key(input.kind, &input.owner_id, input.account_type, &normalized);
        let now = Utc::now();

        let account_id = match self.db.find_account_id(&dedup_key)? {
            Some(id) => {
                let mut record = self.db.get_account(id)?.ok_or_else(|| {
                    LedgerError::Storage(anyhow::anyhow!("index entry {dedup_key} points at missing account {id}"))
                })?;

                if input.effective_date >= record.effective_date {
                    record.value = input.value;
                    record.effective_date = input.effective_date;
                    record.updated_date = now;
                    record.source = input.source;
                    record.is_active = input.is_active;
                    let event = balance_event(id, &input, now);
                    self.db.apply_upsert(&record, &dedup_key, &event)?;
                    debug!(account = %record.name, value = %input.value, "account updated");
                } else {
                    // Out-of-order backfill: history only, current value stays.
                    let event = balance_event(id, &input, now);
                    self.db.append_event(&event)?;
                    debug!(account = %record.name, effective = %input.effective_date, "backfill event recorded");
                }
                id
            }
            None => {
                let id = Uuid::new_v4();
                let record = AccountRecord {
                    id,
                    owner_id: input.owner_id.clone(),
                    kind: input.kind,
                    account_type: input.account_type,
                    name: input.name.trim().to_string(),
                    value: input.value,
                    effective_date: input.effective_date,
                    updated_date: now,
                    source: input.source,
                    is_active: input.is_active,
                };
                let event = balance_event(id, &input, now);
                self.db.apply_upsert(&record, &dedup_key, &event)?;
                info!(account = %record.name, kind = record.kind.label(), "account created");
                id
            }
        };

        Ok(account_id)
    }

    // ── merge ────────────────────────────────────────────────────────────

    /// Rename an existing account and apply an effective-date-gated value
    /// update.  History continues under the original record id.
    pub async fn merge_account(&self, input: AccountMerge) -> Result<Uuid, LedgerError> {
        let old_normalized = normalize_name(&input.old_name);
        let lock_key = Self::account_lock_key(input.kind, &input.owner_id, &old_normalized);
        let _guard = self.account_locks.acquire(&lock_key).await;

        let old_key = account_key(
            input.kind,
            &input.owner_id,
            input.account_type,
            &old_normalized,
        );
        let id = self.db.find_account_id(&old_key)?.ok_or_else(|| {
            LedgerError::NotFound(format!(
                "no {} account named '{}'",
                input.kind.slug(),
                input.old_name.trim()
            ))
        })?;
        let mut record = self.db.get_account(id)?.ok_or_else(|| {
            LedgerError::Storage(anyhow::anyhow!("index entry {old_key} points at missing account {id}"))
        })?;

        let new_normalized = normalize_name(&input.new_name);
        let renamed = new_normalized != old_normalized;
        let new_key = if renamed {
            let key = account_key(
                input.kind,
                &input.owner_id,
                input.account_type,
                &new_normalized,
            );
            if let Some(other) = self.db.find_account_id(&key)? {
                if other != id {
                    warn!(
                        old = %input.old_name,
                        new = %input.new_name,
                        "rename target name already indexed to another account; index entry will be taken over"
                    );
                }
            }
            record.name = input.new_name.trim().to_string();
            key
        } else {
            old_key.clone()
        };

        let now = Utc::now();
        record.updated_date = now;
        if input.effective_date >= record.effective_date {
            record.value = input.value;
            record.effective_date = input.effective_date;
            record.source = BalanceSource::UserInput;
        }

        let event = BalanceEvent {
            id: Uuid::new_v4(),
            account_id: id,
            value: input.value,
            effective_date: input.effective_date,
            recorded_at: now,
            source: BalanceSource::UserInput,
        };
        self.db.apply_rename(&old_key, &new_key, &record, &event)?;
        info!(account = %record.name, renamed, "account merged");
        Ok(id)
    }

    // ── goals ────────────────────────────────────────────────────────────

    /// Create a goal unless a fuzzy title match says it already exists.
    ///
    /// The per-owner lock makes goal creation totally ordered: two
    /// near-simultaneous creates for the same conceptual goal cannot both
    /// miss each other's uncommitted title.
    pub async fn create_goal(
        &self,
        owner_id: &str,
        title: &str,
        description: &str,
        target_amount: Option<Decimal>,
        current_amount: Option<Decimal>,
        steps: Vec<NewStep>,
    ) -> Result<GoalCreateOutcome, LedgerError> {
        let _guard = self.goal_locks.acquire(owner_id).await;

        for existing in self.db.goals_for_owner(owner_id)? {
            let similarity = title_similarity(title, &existing.title);
            if similarity >= self.dedup_threshold {
                info!(
                    title,
                    existing = %existing.title,
                    similarity,
                    "goal creation deduplicated against existing goal"
                );
                return Ok(GoalCreateOutcome {
                    goal_id: existing.id,
                    deduplicated: true,
                });
            }
        }

        let goal = Goal {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            target_amount,
            current_amount: current_amount.unwrap_or(Decimal::ZERO),
            status: GoalStatus::Active,
            created_at: Utc::now(),
        };
        let steps: Vec<Step> = steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| Step {
                id: Uuid::new_v4(),
                goal_id: goal.id,
                description: step.description,
                order: (idx + 1).to_string(),
                is_completed: false,
                is_user_defined: step.is_user_defined,
                intent: None,
            })
            .collect();

        self.db.insert_goal_with_steps(&goal, &steps)?;
        info!(title = %goal.title, steps = steps.len(), "goal created");
        Ok(GoalCreateOutcome {
            goal_id: goal.id,
            deduplicated: false,
        })
    }

    /// Apply field updates and append new steps, numbering them after the
    /// existing ones.  Existing steps are never renumbered.
    pub async fn update_goal(
        &self,
        owner_id: &str,
        goal_id: Uuid,
        update: GoalUpdate,
    ) -> Result<(), LedgerError> {
        let _guard = self.goal_locks.acquire(owner_id).await;

        let mut goal = self
            .db
            .get_goal(goal_id)?
            .filter(|g| g.owner_id == owner_id)
            .ok_or_else(|| LedgerError::NotFound(format!("goal {goal_id} for owner {owner_id}")))?;

        if let Some(amount) = update.current_amount {
            goal.current_amount = amount;
        }
        if let Some(status) = update.status {
            goal.status = status;
        }

        let existing_count = self.db.steps_for_goal(goal_id)?.len();
        let new_steps: Vec<Step> = update
            .new_steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| Step {
                id: Uuid::new_v4(),
                goal_id,
                description: step.description,
                order: (existing_count + idx + 1).to_string(),
                is_completed: false,
                is_user_defined: step.is_user_defined,
                intent: None,
            })
            .collect();

        self.db.update_goal_with_steps(&goal, &new_steps)?;
        Ok(())
    }

    // ── reads ────────────────────────────────────────────────────────────

    pub fn get_financial_summary(&self, owner_id: &str) -> Result<FinancialSummary, LedgerError> {
        let mut assets = Vec::new();
        let mut debts = Vec::new();
        for record in self.db.accounts_for_owner(owner_id)? {
            if !record.is_active {
                continue;
            }
            match record.kind {
                AccountKind::Asset => assets.push(record),
                AccountKind::Debt => debts.push(record),
            }
        }
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        debts.sort_by(|a, b| a.name.cmp(&b.name));

        let assets_total: Decimal = assets.iter().map(|a| a.value).sum();
        let debts_total: Decimal = debts.iter().map(|d| d.value).sum();
        Ok(FinancialSummary {
            assets_total,
            debts_total,
            net_worth: assets_total - debts_total,
            assets,
            debts,
        })
    }

    /// Reconstruct the per-day net-worth series from balance history.
    ///
    /// One entry per unique effective date across all of the owner's
    /// accounts; for each date every account contributes its most recent
    /// event with `effective_date <= date` (forward fill), or nothing if it
    /// has no event yet.
    pub fn get_financial_history(&self, owner_id: &str) -> Result<Vec<HistoryPoint>, LedgerError> {
        let accounts = self.db.accounts_for_owner(owner_id)?;
        let mut per_account: Vec<(AccountKind, Vec<BalanceEvent>)> = Vec::new();
        for account in &accounts {
            let mut events = self.db.events_for_account(account.id)?;
            events.sort_by_key(|e| e.effective_date);
            per_account.push((account.kind, events));
        }

        let dates: BTreeSet<NaiveDate> = per_account
            .iter()
            .flat_map(|(_, events)| events.iter().map(|e| e.effective_date.date_naive()))
            .collect();

        let mut points = Vec::with_capacity(dates.len());
        for date in dates {
            let mut assets = Decimal::ZERO;
            let mut debts = Decimal::ZERO;
            for (kind, events) in &per_account {
                let value = events
                    .iter()
                    .rev()
                    .find(|e| e.effective_date.date_naive() <= date)
                    .map(|e| e.value);
                let Some(value) = value else { continue };
                match kind {
                    AccountKind::Asset => assets += value,
                    AccountKind::Debt => debts += value,
                }
            }
            points.push(HistoryPoint {
                date,
                assets,
                debts,
                net_worth: assets - debts,
            });
        }
        Ok(points)
    }

    pub fn get_goals(&self, owner_id: &str) -> Result<Vec<GoalDetail>, LedgerError> {
        let mut details = Vec::new();
        for goal in self.db.goals_for_owner(owner_id)? {
            let mut steps = Vec::new();
            for step in self.db.steps_for_goal(goal.id)? {
                let resources = self.db.resources_for_step(step.id)?;
                steps.push(StepDetail { step, resources });
            }
            details.push(GoalDetail { goal, steps });
        }
        Ok(details)
    }
}

fn balance_event(account_id: Uuid, input: &AccountUpsert, recorded_at: DateTime<Utc>) -> BalanceEvent {
    BalanceEvent {
        id: Uuid::new_v4(),
        account_id,
        value: input.value,
        effective_date: input.effective_date,
        recorded_at,
        source: input.source,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
