mod chat;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use fincoach_config::{default_config_path, AppConfig};
use fincoach_curation::{BraveSearchApi, CurationPipeline, PipelineOptions, RouterModel};
use fincoach_ledger::{
    AccountKind, AccountMerge, AccountType, AccountUpsert, BalanceSource, CurationStore,
    LedgerDb, LedgerService,
};
use fincoach_llm::{LlmRouter, Provider};
use fincoach_runtime::Advisor;
use fincoach_tools::{
    CreateGoalTool, CurateResourcesTool, FinancialHistoryTool, FinancialSummaryTool,
    GetGoalsTool, MergeAccountTool, ToolRegistry, UpdateGoalTool, UpsertAccountTool,
};

#[derive(Debug, Parser)]
#[command(
    name = "fincoach",
    version,
    about = "A conversational personal-finance assistant"
)]
struct Cli {
    /// Path to the config file (defaults to ~/.fincoach/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive advisor chat (the default).
    Chat,
    /// Print current assets, debts, and net worth.
    Summary,
    /// Print the reconstructed day-by-day net-worth history.
    History,
    /// Print goals with their steps and curated resources.
    Goals,
    /// Run resource curation for one goal and wait for the report.
    Curate {
        goal_id: Uuid,
    },
    /// Record a balance directly, bypassing the advisor.
    Upsert {
        #[arg(long)]
        kind: String,
        #[arg(long = "type")]
        account_type: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: Decimal,
        /// When the balance was true (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        effective_date: Option<NaiveDate>,
        /// Mark the account closed.
        #[arg(long)]
        inactive: bool,
    },
    /// Rename an account directly, optionally updating its balance.
    Merge {
        #[arg(long)]
        kind: String,
        #[arg(long = "type")]
        account_type: String,
        #[arg(long)]
        old_name: String,
        #[arg(long)]
        new_name: String,
        #[arg(long)]
        value: Decimal,
        #[arg(long)]
        effective_date: Option<NaiveDate>,
    },
}

struct Stack {
    config: AppConfig,
    ledger: Arc<LedgerService>,
    curation: Arc<CurationPipeline>,
}

fn build_stack(config: AppConfig) -> Result<Stack> {
    let db = Arc::new(LedgerDb::open(&config.ledger.db_path)?);
    let ledger = Arc::new(
        LedgerService::new(db.clone()).with_dedup_threshold(config.ledger.goal_dedup_threshold),
    );

    let provider = if config.llm.provider.eq_ignore_ascii_case("openrouter") {
        Provider::OpenRouter
    } else {
        Provider::Ollama
    };
    let model = Arc::new(RouterModel::new(
        LlmRouter::default(),
        provider,
        config.llm.ollama_model.clone(),
        config.llm.openrouter_model.clone(),
    ));
    let search = Arc::new(BraveSearchApi::new(config.search.brave_api_key.clone()));
    let curation = Arc::new(CurationPipeline::new(
        model,
        search,
        CurationStore::new(db),
        PipelineOptions {
            step_delay: std::time::Duration::from_millis(config.curation.step_delay_ms),
            min_resources: config.curation.min_resources,
            max_resources: config.curation.max_resources,
            max_search_results: config.search.max_results,
            freshness_days: config.search.freshness_days,
        },
    ));

    Ok(Stack {
        config,
        ledger,
        curation,
    })
}

fn build_registry(stack: &Stack) -> ToolRegistry {
    let owner_id = stack.config.advisor.owner_id.clone();
    let mut registry = ToolRegistry::default();
    registry.register(Box::new(UpsertAccountTool {
        ledger: stack.ledger.clone(),
        owner_id: owner_id.clone(),
    }));
    registry.register(Box::new(MergeAccountTool {
        ledger: stack.ledger.clone(),
        owner_id: owner_id.clone(),
    }));
    registry.register(Box::new(CreateGoalTool {
        ledger: stack.ledger.clone(),
        curation: stack.curation.clone(),
        owner_id: owner_id.clone(),
    }));
    registry.register(Box::new(UpdateGoalTool {
        ledger: stack.ledger.clone(),
        owner_id: owner_id.clone(),
    }));
    registry.register(Box::new(FinancialSummaryTool {
        ledger: stack.ledger.clone(),
        owner_id: owner_id.clone(),
    }));
    registry.register(Box::new(FinancialHistoryTool {
        ledger: stack.ledger.clone(),
        owner_id: owner_id.clone(),
    }));
    registry.register(Box::new(GetGoalsTool {
        ledger: stack.ledger.clone(),
        owner_id,
    }));
    registry.register(Box::new(CurateResourcesTool {
        curation: stack.curation.clone(),
    }));
    registry
}

fn effective_date_or_now(date: Option<NaiveDate>) -> chrono::DateTime<Utc> {
    match date {
        Some(date) => date.and_time(NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    }
}

fn parse_kind(raw: &str) -> Result<AccountKind> {
    AccountKind::from_label(raw)
        .ok_or_else(|| anyhow::anyhow!("kind must be 'asset' or 'debt', got '{raw}'"))
}

fn parse_account_type(raw: &str) -> Result<AccountType> {
    AccountType::from_label(raw)
        .ok_or_else(|| anyhow::anyhow!("unrecognized account type '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::load_from(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .init();

    let stack = build_stack(config)?;
    let owner_id = stack.config.advisor.owner_id.clone();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let registry = build_registry(&stack);
            let mut advisor = Advisor::new(&stack.config, registry);
            chat::run(&mut advisor).await?;
        }
        Commands::Summary => {
            let summary = stack.ledger.get_financial_summary(&owner_id)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::History => {
            let history = stack.ledger.get_financial_history(&owner_id)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Commands::Goals => {
            let goals = stack.ledger.get_goals(&owner_id)?;
            println!("{}", serde_json::to_string_pretty(&goals)?);
        }
        Commands::Curate { goal_id } => {
            let report = stack.curation.curate_goal(goal_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Upsert {
            kind,
            account_type,
            name,
            value,
            effective_date,
            inactive,
        } => {
            let id = stack
                .ledger
                .upsert_account(AccountUpsert {
                    owner_id,
                    kind: parse_kind(&kind)?,
                    account_type: parse_account_type(&account_type)?,
                    name,
                    value,
                    effective_date: effective_date_or_now(effective_date),
                    source: BalanceSource::UserInput,
                    is_active: !inactive,
                })
                .await?;
            println!("recorded account {id}");
        }
        Commands::Merge {
            kind,
            account_type,
            old_name,
            new_name,
            value,
            effective_date,
        } => {
            let id = stack
                .ledger
                .merge_account(AccountMerge {
                    owner_id,
                    kind: parse_kind(&kind)?,
                    account_type: parse_account_type(&account_type)?,
                    old_name,
                    new_name,
                    value,
                    effective_date: effective_date_or_now(effective_date),
                })
                .await?;
            println!("merged account {id}");
        }
    }

    Ok(())
}
