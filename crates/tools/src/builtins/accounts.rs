//! Asset/debt balance tools.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use fincoach_ledger::{
    AccountMerge, AccountUpsert, BalanceSource, LedgerError, LedgerService,
};

use super::{
    parse_account_type, parse_amount, parse_effective_date, parse_flag, parse_kind, require,
};
use crate::{ParamType, Tool, ToolOutput, ToolParam, ToolSpec};

/// Records a balance the user just reported.  Matching is by normalized
/// name, so "chase checking" and " Chase Checking " land on one account.
pub struct UpsertAccountTool {
    pub ledger: Arc<LedgerService>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for UpsertAccountTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "upsert_account".to_string(),
            description: "Record or update an asset or debt balance the user mentioned."
                .to_string(),
            params: vec![
                ToolParam::required("kind", "Which side of the ledger")
                    .with_enum(&["asset", "debt"]),
                ToolParam::required(
                    "account_type",
                    "Category, e.g. checking, savings, investment, credit_card, mortgage",
                ),
                ToolParam::required("name", "Account name as the user refers to it"),
                ToolParam::required("value", "Current balance").with_type(ParamType::Number),
                ToolParam::optional(
                    "effective_date",
                    "When the balance was true (YYYY-MM-DD); omit for today",
                ),
                ToolParam::optional(
                    "is_active",
                    "false when the user reports the account as closed",
                )
                .with_type(ParamType::Boolean),
            ],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let input = AccountUpsert {
            owner_id: self.owner_id.clone(),
            kind: parse_kind(require(args, "kind")?)?,
            account_type: parse_account_type(require(args, "account_type")?)?,
            name: require(args, "name")?.to_string(),
            value: parse_amount(require(args, "value")?)?,
            effective_date: parse_effective_date(args)?,
            source: BalanceSource::UserInput,
            is_active: parse_flag(args, "is_active", true),
        };

        match self.ledger.upsert_account(input).await {
            Ok(id) => Ok(ToolOutput::ok(
                json!({"account_id": id, "recorded": true}).to_string(),
            )),
            Err(LedgerError::NotFound(message)) => Ok(ToolOutput::failed(message)),
            Err(error) => Err(error.into()),
        }
    }
}

/// Renames an account when the user clarifies what it actually is
/// ("my checking" → "Chase Checking").
pub struct MergeAccountTool {
    pub ledger: Arc<LedgerService>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for MergeAccountTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "merge_account".to_string(),
            description: "Rename an existing account when the user clarifies its name, \
                          optionally updating the balance."
                .to_string(),
            params: vec![
                ToolParam::required("kind", "Which side of the ledger")
                    .with_enum(&["asset", "debt"]),
                ToolParam::required("account_type", "Category of the existing account"),
                ToolParam::required("old_name", "Name the account was recorded under"),
                ToolParam::required("new_name", "Clarified name"),
                ToolParam::required("value", "Latest balance").with_type(ParamType::Number),
                ToolParam::optional("effective_date", "When the balance was true (YYYY-MM-DD)"),
            ],
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let input = AccountMerge {
            owner_id: self.owner_id.clone(),
            kind: parse_kind(require(args, "kind")?)?,
            account_type: parse_account_type(require(args, "account_type")?)?,
            old_name: require(args, "old_name")?.to_string(),
            new_name: require(args, "new_name")?.to_string(),
            value: parse_amount(require(args, "value")?)?,
            effective_date: parse_effective_date(args)?,
        };

        match self.ledger.merge_account(input).await {
            Ok(id) => Ok(ToolOutput::ok(
                json!({"account_id": id, "merged": true}).to_string(),
            )),
            Err(LedgerError::NotFound(message)) => Ok(ToolOutput::failed(message)),
            Err(error) => Err(error.into()),
        }
    }
}

/// Current totals and per-account balances.
pub struct FinancialSummaryTool {
    pub ledger: Arc<LedgerService>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for FinancialSummaryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_financial_summary".to_string(),
            description: "Current assets, debts, and net worth with per-account balances."
                .to_string(),
            params: vec![],
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        let summary = self.ledger.get_financial_summary(&self.owner_id)?;
        Ok(ToolOutput::ok(serde_json::to_string_pretty(&summary)?))
    }
}

/// Reconstructed per-day net-worth time series.
pub struct FinancialHistoryTool {
    pub ledger: Arc<LedgerService>,
    pub owner_id: String,
}

#[async_trait]
impl Tool for FinancialHistoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_financial_history".to_string(),
            description: "Day-by-day history of total assets, debts, and net worth.".to_string(),
            params: vec![],
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        let history = self.ledger.get_financial_history(&self.owner_id)?;
        Ok(ToolOutput::ok(serde_json::to_string_pretty(&history)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fincoach_ledger::LedgerDb;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<LedgerService>) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(LedgerDb::open(dir.path().join("ledger.redb")).unwrap());
        (dir, Arc::new(LedgerService::new(db)))
    }

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn upsert_then_summary() {
        let (_dir, ledger) = setup();
        let upsert = UpsertAccountTool {
            ledger: ledger.clone(),
            owner_id: "alice".to_string(),
        };
        let result = upsert
            .run(&args(&[
                ("kind", "asset"),
                ("account_type", "checking"),
                ("name", "Chase Checking"),
                ("value", "$2,500.00"),
            ]))
            .await
            .unwrap();
        assert!(result.success, "{}", result.output);

        let summary = FinancialSummaryTool {
            ledger,
            owner_id: "alice".to_string(),
        };
        let result = summary.run(&HashMap::new()).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains("Chase Checking"));
        assert!(result.output.contains("2500"));
    }

    #[tokio::test]
    async fn upsert_missing_param_errors() {
        let (_dir, ledger) = setup();
        let upsert = UpsertAccountTool {
            ledger,
            owner_id: "alice".to_string(),
        };
        let result = upsert
            .run(&args(&[("kind", "asset"), ("account_type", "checking")]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn merge_missing_account_reports_failure_not_error() {
        let (_dir, ledger) = setup();
        let merge = MergeAccountTool {
            ledger,
            owner_id: "alice".to_string(),
        };
        let result = merge
            .run(&args(&[
                ("kind", "asset"),
                ("account_type", "checking"),
                ("old_name", "ghost"),
                ("new_name", "Chase"),
                ("value", "100"),
            ]))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("ghost"));
    }
}
