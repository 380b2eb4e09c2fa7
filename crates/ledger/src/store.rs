//! redb-backed persistence for the ledger.
//!
//! Rows are serde_json-encoded values under string keys.  Composite keys use
//! `|` separators so related rows cluster under a shared prefix and can be
//! read back with a single range scan.
//!
//! # Tables
//!
//! | Name             | Key                                      | Value                |
//! |------------------|------------------------------------------|----------------------|
//! | `accounts`       | account UUID                             | [`AccountRecord`]    |
//! | `account_keys`   | `kind\|owner\|type\|normalized-name`     | account UUID         |
//! | `balance_events` | `account-id\|recorded-at\|event-id`      | [`BalanceEvent`]     |
//! | `goals`          | goal UUID                                | [`Goal`]             |
//! | `steps`          | `goal-id\|step-id`                       | [`Step`]             |
//! | `resources`      | `step-id\|resource-id`                   | [`Resource`]         |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::schema::{AccountKind, AccountRecord, AccountType, BalanceEvent, Goal, Resource, Step};

const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
const ACCOUNT_KEYS: TableDefinition<&str, &str> = TableDefinition::new("account_keys");
const BALANCE_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("balance_events");
const GOALS: TableDefinition<&str, &[u8]> = TableDefinition::new("goals");
const STEPS: TableDefinition<&str, &[u8]> = TableDefinition::new("steps");
const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

/// Case- and whitespace-insensitive form of an account name; the dedup key
/// component.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Dedup/index key for one logical account.
pub fn account_key(
    kind: AccountKind,
    owner_id: &str,
    account_type: AccountType,
    normalized_name: &str,
) -> String {
    format!(
        "{}|{owner_id}|{}|{normalized_name}",
        kind.slug(),
        account_type.slug()
    )
}

fn event_key(event: &BalanceEvent) -> String {
    format!(
        "{}|{}|{}",
        event.account_id,
        event.recorded_at.to_rfc3339(),
        event.id
    )
}

fn step_key(goal_id: Uuid, step_id: Uuid) -> String {
    format!("{goal_id}|{step_id}")
}

fn resource_key(step_id: Uuid, resource_id: Uuid) -> String {
    format!("{step_id}|{resource_id}")
}

pub struct LedgerDb {
    db: Database,
    path: PathBuf,
}

impl LedgerDb {
    /// Open or create the ledger database at `path`, ensuring all tables
    /// exist so later read transactions never hit a missing table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening ledger db at {}", path.display()))?;

        {
            let tx = db.begin_write()?;
            tx.open_table(ACCOUNTS)?;
            tx.open_table(ACCOUNT_KEYS)?;
            tx.open_table(BALANCE_EVENTS)?;
            tx.open_table(GOALS)?;
            tx.open_table(STEPS)?;
            tx.open_table(RESOURCES)?;
            tx.commit()?;
        }

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    pub fn find_account_id(&self, dedup_key: &str) -> Result<Option<Uuid>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(ACCOUNT_KEYS)?;
        match table.get(dedup_key)? {
            None => Ok(None),
            Some(guard) => Ok(Some(guard.value().parse()?)),
        }
    }

    pub fn get_account(&self, id: Uuid) -> Result<Option<AccountRecord>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(ACCOUNTS)?;
        match table.get(id.to_string().as_str())? {
            None => Ok(None),
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        }
    }

    pub fn accounts_for_owner(&self, owner_id: &str) -> Result<Vec<AccountRecord>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(ACCOUNTS)?;
        let mut records = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            let record: AccountRecord = serde_json::from_slice(value.value())?;
            if record.owner_id == owner_id {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Write the account row, its name-index entry, and one history event in
    /// a single transaction.
    pub fn apply_upsert(
        &self,
        record: &AccountRecord,
        dedup_key: &str,
        event: &BalanceEvent,
    ) -> Result<()> {
        let record_bytes = serde_json::to_vec(record)?;
        let event_bytes = serde_json::to_vec(event)?;
        let id_str = record.id.to_string();

        let tx = self.db.begin_write()?;
        {
            let mut accounts = tx.open_table(ACCOUNTS)?;
            accounts.insert(id_str.as_str(), record_bytes.as_slice())?;

            let mut keys = tx.open_table(ACCOUNT_KEYS)?;
            keys.insert(dedup_key, id_str.as_str())?;

            let mut events = tx.open_table(BALANCE_EVENTS)?;
            events.insert(event_key(event).as_str(), event_bytes.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Move an account's name-index entry from `old_key` to `new_key` while
    /// writing the updated row and its history event, in one transaction so
    /// a crash can never leave the index pointing at a renamed-away key.
    pub fn apply_rename(
        &self,
        old_key: &str,
        new_key: &str,
        record: &AccountRecord,
        event: &BalanceEvent,
    ) -> Result<()> {
        let record_bytes = serde_json::to_vec(record)?;
        let event_bytes = serde_json::to_vec(event)?;
        let id_str = record.id.to_string();

        let tx = self.db.begin_write()?;
        {
            let mut keys = tx.open_table(ACCOUNT_KEYS)?;
            if old_key != new_key {
                keys.remove(old_key)?;
            }
            keys.insert(new_key, id_str.as_str())?;

            let mut accounts = tx.open_table(ACCOUNTS)?;
            accounts.insert(id_str.as_str(), record_bytes.as_slice())?;

            let mut events = tx.open_table(BALANCE_EVENTS)?;
            events.insert(event_key(event).as_str(), event_bytes.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Append a history event without touching the main record (the
    /// out-of-order backfill path).
    pub fn append_event(&self, event: &BalanceEvent) -> Result<()> {
        let event_bytes = serde_json::to_vec(event)?;
        let tx = self.db.begin_write()?;
        {
            let mut events = tx.open_table(BALANCE_EVENTS)?;
            events.insert(event_key(event).as_str(), event_bytes.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn events_for_account(&self, account_id: Uuid) -> Result<Vec<BalanceEvent>> {
        let prefix = format!("{account_id}|");
        let tx = self.db.begin_read()?;
        let table = tx.open_table(BALANCE_EVENTS)?;
        let mut events = Vec::new();
        for row in table.range(prefix.as_str()..)? {
            let (key, value) = row?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }

    // ── Goals & steps ────────────────────────────────────────────────────

    /// Insert a goal and all of its steps atomically: either the goal and
    /// every step land, or nothing does.
    pub fn insert_goal_with_steps(&self, goal: &Goal, steps: &[Step]) -> Result<()> {
        let goal_bytes = serde_json::to_vec(goal)?;

        let tx = self.db.begin_write()?;
        {
            let mut goals = tx.open_table(GOALS)?;
            goals.insert(goal.id.to_string().as_str(), goal_bytes.as_slice())?;

            let mut step_table = tx.open_table(STEPS)?;
            for step in steps {
                let bytes = serde_json::to_vec(step)?;
                step_table.insert(step_key(goal.id, step.id).as_str(), bytes.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_goal(&self, goal_id: Uuid) -> Result<Option<Goal>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(GOALS)?;
        match table.get(goal_id.to_string().as_str())? {
            None => Ok(None),
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        }
    }

    pub fn goals_for_owner(&self, owner_id: &str) -> Result<Vec<Goal>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(GOALS)?;
        let mut goals = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            let goal: Goal = serde_json::from_slice(value.value())?;
            if goal.owner_id == owner_id {
                goals.push(goal);
            }
        }
        goals.sort_by_key(|g| g.created_at);
        Ok(goals)
    }

    /// Write updated goal fields and append any new steps in one transaction.
    pub fn update_goal_with_steps(&self, goal: &Goal, new_steps: &[Step]) -> Result<()> {
        let goal_bytes = serde_json::to_vec(goal)?;

        let tx = self.db.begin_write()?;
        {
            let mut goals = tx.open_table(GOALS)?;
            goals.insert(goal.id.to_string().as_str(), goal_bytes.as_slice())?;

            let mut step_table = tx.open_table(STEPS)?;
            for step in new_steps {
                let bytes = serde_json::to_vec(step)?;
                step_table.insert(step_key(goal.id, step.id).as_str(), bytes.as_slice())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Steps for a goal, sorted by numeric order (the order field is stored
    /// as text).
    pub fn steps_for_goal(&self, goal_id: Uuid) -> Result<Vec<Step>> {
        let prefix = format!("{goal_id}|");
        let tx = self.db.begin_read()?;
        let table = tx.open_table(STEPS)?;
        let mut steps: Vec<Step> = Vec::new();
        for row in table.range(prefix.as_str()..)? {
            let (key, value) = row?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            steps.push(serde_json::from_slice(value.value())?);
        }
        steps.sort_by_key(|s| s.order_num());
        Ok(steps)
    }

    pub fn put_step(&self, step: &Step) -> Result<()> {
        let bytes = serde_json::to_vec(step)?;
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(STEPS)?;
            table.insert(step_key(step.goal_id, step.id).as_str(), bytes.as_slice())?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Resources ────────────────────────────────────────────────────────

    pub fn resources_for_step(&self, step_id: Uuid) -> Result<Vec<Resource>> {
        let prefix = format!("{step_id}|");
        let tx = self.db.begin_read()?;
        let table = tx.open_table(RESOURCES)?;
        let mut resources = Vec::new();
        for row in table.range(prefix.as_str()..)? {
            let (key, value) = row?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            resources.push(serde_json::from_slice(value.value())?);
        }
        Ok(resources)
    }

    /// Delete every resource row for the step, then insert the replacement
    /// set in one transaction.  Re-curation replaces, never merges.
    pub fn replace_resources(&self, step_id: Uuid, resources: &[Resource]) -> Result<()> {
        let prefix = format!("{step_id}|");
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(RESOURCES)?;
            let stale: Vec<String> = {
                let mut keys = Vec::new();
                for row in table.range(prefix.as_str()..)? {
                    let (key, _) = row?;
                    if !key.value().starts_with(prefix.as_str()) {
                        break;
                    }
                    keys.push(key.value().to_string());
                }
                keys
            };
            for key in &stale {
                table.remove(key.as_str())?;
            }
            for resource in resources {
                let bytes = serde_json::to_vec(resource)?;
                table.insert(
                    resource_key(step_id, resource.id).as_str(),
                    bytes.as_slice(),
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
