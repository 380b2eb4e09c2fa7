//! Built-in advisor tools.
//!
//! One tool per ledger/curation entry point the tool-calling model is
//! allowed to use.  Each tool is bound to a single owner id at
//! construction: there is no authentication layer, so the session owner
//! is fixed by the process, never chosen by the model.

mod accounts;
mod goals;

pub use accounts::{FinancialHistoryTool, FinancialSummaryTool, MergeAccountTool, UpsertAccountTool};
pub use goals::{CreateGoalTool, CurateResourcesTool, GetGoalsTool, UpdateGoalTool};

use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use fincoach_ledger::{AccountKind, AccountType};

pub(crate) fn require<'a>(args: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    match args.get(key).map(String::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => bail!("missing required param: {key}"),
    }
}

pub(crate) fn parse_kind(raw: &str) -> Result<AccountKind> {
    match AccountKind::from_label(raw) {
        Some(kind) => Ok(kind),
        None => bail!("kind must be 'asset' or 'debt', got '{raw}'"),
    }
}

pub(crate) fn parse_account_type(raw: &str) -> Result<AccountType> {
    match AccountType::from_label(raw) {
        Some(account_type) => Ok(account_type),
        None => bail!("unrecognized account_type '{raw}'"),
    }
}

/// Money amounts arrive as the model wrote them; tolerate `$` and `,`.
pub(crate) fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    match cleaned.parse::<Decimal>() {
        Ok(value) => Ok(value),
        Err(_) => bail!("could not parse amount '{raw}'"),
    }
}

/// Optional `effective_date` param: `YYYY-MM-DD` or RFC 3339; defaults to
/// now when absent.
pub(crate) fn parse_effective_date(args: &HashMap<String, String>) -> Result<DateTime<Utc>> {
    let Some(raw) = args.get("effective_date").map(String::as_str).map(str::trim) else {
        return Ok(Utc::now());
    };
    if raw.is_empty() {
        return Ok(Utc::now());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(stamp.with_timezone(&Utc));
    }
    bail!("could not parse effective_date '{raw}' (expected YYYY-MM-DD)")
}

pub(crate) fn parse_flag(args: &HashMap<String, String>, key: &str, default: bool) -> bool {
    args.get(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"))
        .unwrap_or(default)
}
