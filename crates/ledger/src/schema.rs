use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Accounts ──────────────────────────────────────────────────────────────────

/// Whether a record sits on the asset or the debt side of the ledger.
/// The two sides are symmetric; every account operation takes a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Debt,
}

impl AccountKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Asset => "Asset",
            Self::Debt => "Debt",
        }
    }

    /// Slug used in lock keys and index keys.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Debt => "debt",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asset" | "assets" => Some(Self::Asset),
            "debt" | "debts" | "liability" => Some(Self::Debt),
            _ => None,
        }
    }
}

/// Category of an account.  One shared enum across both kinds: the dedup
/// key always includes the [`AccountKind`], so `Other` on the asset side
/// never collides with `Other` on the debt side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    // Asset-side categories.
    Checking,
    Savings,
    Investment,
    Retirement,
    RealEstate,
    Vehicle,
    // Debt-side categories.
    CreditCard,
    StudentLoan,
    Mortgage,
    AutoLoan,
    PersonalLoan,
    Medical,
    // Either side.
    Other,
}

impl AccountType {
    pub fn slug(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::Investment => "investment",
            Self::Retirement => "retirement",
            Self::RealEstate => "real_estate",
            Self::Vehicle => "vehicle",
            Self::CreditCard => "credit_card",
            Self::StudentLoan => "student_loan",
            Self::Mortgage => "mortgage",
            Self::AutoLoan => "auto_loan",
            Self::PersonalLoan => "personal_loan",
            Self::Medical => "medical",
            Self::Other => "other",
        }
    }

    /// Parse a type from the strings the tool-calling model produces.
    pub fn from_label(s: &str) -> Option<Self> {
        match s
            .trim()
            .to_ascii_lowercase()
            .replace([' ', '-'], "_")
            .as_str()
        {
            "checking" => Some(Self::Checking),
            "savings" => Some(Self::Savings),
            "investment" | "brokerage" => Some(Self::Investment),
            "retirement" | "401k" | "ira" => Some(Self::Retirement),
            "real_estate" | "property" | "home" => Some(Self::RealEstate),
            "vehicle" | "car" => Some(Self::Vehicle),
            "credit_card" => Some(Self::CreditCard),
            "student_loan" => Some(Self::StudentLoan),
            "mortgage" => Some(Self::Mortgage),
            "auto_loan" | "car_loan" => Some(Self::AutoLoan),
            "personal_loan" => Some(Self::PersonalLoan),
            "medical" | "medical_debt" => Some(Self::Medical),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Where a balance figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    UserInput,
    SystemSync,
}

/// Current state of one logical account.
///
/// At most one active record exists per `(owner_id, lowercased-trimmed name,
/// account_type)` within a kind; [`crate::LedgerService::upsert_account`]
/// enforces this via the name index.  Records are deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub kind: AccountKind,
    pub account_type: AccountType,
    pub name: String,
    pub value: Decimal,
    /// When the balance was actually true (as reported by the user).
    pub effective_date: DateTime<Utc>,
    /// When the system last wrote this record.
    pub updated_date: DateTime<Utc>,
    pub source: BalanceSource,
    pub is_active: bool,
}

/// Append-only balance history row.  Written on every upsert/merge call,
/// whether or not the main record moved; this is what makes full
/// time-series reconstruction possible when balances arrive out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub value: Decimal,
    pub effective_date: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub source: BalanceSource,
}

// ── Goals ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Archived,
}

impl GoalStatus {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" | "complete" | "done" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub target_amount: Option<Decimal>,
    pub current_amount: Decimal,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
}

/// One action step under a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub description: String,
    /// 1-indexed position, stored as text; use [`Step::order_num`] when
    /// sorting, since lexical order puts "10" before "2".
    pub order: String,
    pub is_completed: bool,
    pub is_user_defined: bool,
    /// Filled in by the curation pipeline; `None` until curation has run.
    #[serde(default)]
    pub intent: Option<IntentSpec>,
}

impl Step {
    pub fn order_num(&self) -> u32 {
        self.order.trim().parse().unwrap_or(0)
    }
}

/// A curated web resource attached to a step.  The full set for a step is
/// replaced wholesale on re-curation, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub step_id: Uuid,
    pub title: String,
    pub url: String,
    pub publisher: String,
    pub resource_type: ResourceType,
    pub credibility_score: f32,
}

// ── Intent spec ───────────────────────────────────────────────────────────────

/// What the user is trying to get done with a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserJob {
    Learn,
    Compare,
    Choose,
    Estimate,
    Plan,
    Apply,
    Track,
}

impl UserJob {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learn" => Some(Self::Learn),
            "compare" => Some(Self::Compare),
            "choose" => Some(Self::Choose),
            "estimate" => Some(Self::Estimate),
            "plan" => Some(Self::Plan),
            "apply" => Some(Self::Apply),
            "track" => Some(Self::Track),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Guide,
    Comparison,
    Calculator,
    Official,
    Article,
    Video,
}

impl ResourceType {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guide" => Some(Self::Guide),
            "comparison" => Some(Self::Comparison),
            "calculator" => Some(Self::Calculator),
            "official" => Some(Self::Official),
            "article" => Some(Self::Article),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Soft constraints the user mentioned, carried through to search and
/// curation prompts.  All optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConstraints {
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub location: Option<String>,
    pub risk_tolerance: Option<String>,
    pub vendor_preference: Option<String>,
}

/// Structured extraction of what kind of resources a step needs.
///
/// `query_terms` holds exactly one search query: the search API allows one
/// request per second, so extra queries would cost pipeline latency
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSpec {
    pub user_job: UserJob,
    #[serde(default)]
    pub constraints: IntentConstraints,
    pub resource_types_needed: Vec<ResourceType>,
    pub query_terms: String,
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_from_label_accepts_variants() {
        assert_eq!(AccountType::from_label("checking"), Some(AccountType::Checking));
        assert_eq!(AccountType::from_label("Credit Card"), Some(AccountType::CreditCard));
        assert_eq!(AccountType::from_label("credit-card"), Some(AccountType::CreditCard));
        assert_eq!(AccountType::from_label("401k"), Some(AccountType::Retirement));
        assert_eq!(AccountType::from_label("unknown-thing"), None);
    }

    #[test]
    fn account_kind_from_label() {
        assert_eq!(AccountKind::from_label("asset"), Some(AccountKind::Asset));
        assert_eq!(AccountKind::from_label("Debts"), Some(AccountKind::Debt));
        assert_eq!(AccountKind::from_label("liability"), Some(AccountKind::Debt));
        assert_eq!(AccountKind::from_label(""), None);
    }

    #[test]
    fn step_order_sorts_numerically() {
        let mk = |order: &str| Step {
            id: Uuid::new_v4(),
            goal_id: Uuid::new_v4(),
            description: String::new(),
            order: order.to_string(),
            is_completed: false,
            is_user_defined: false,
            intent: None,
        };
        let mut steps = vec![mk("10"), mk("2"), mk("1")];
        steps.sort_by_key(|s| s.order_num());
        let orders: Vec<&str> = steps.iter().map(|s| s.order.as_str()).collect();
        assert_eq!(orders, vec!["1", "2", "10"]);
    }

    #[test]
    fn intent_spec_serde_round_trip() {
        let spec = IntentSpec {
            user_job: UserJob::Compare,
            constraints: IntentConstraints {
                budget: Some("under $400k".to_string()),
                ..Default::default()
            },
            resource_types_needed: vec![ResourceType::Comparison, ResourceType::Calculator],
            query_terms: "mortgage lender comparison".to_string(),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: IntentSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_job, UserJob::Compare);
        assert_eq!(back.constraints.budget.as_deref(), Some("under $400k"));
        assert_eq!(back.resource_types_needed.len(), 2);
    }

    #[test]
    fn user_job_covers_all_seven_labels() {
        for label in ["learn", "compare", "choose", "estimate", "plan", "apply", "track"] {
            assert!(UserJob::from_label(label).is_some(), "missing: {label}");
        }
        assert!(UserJob::from_label("browse").is_none());
    }
}
