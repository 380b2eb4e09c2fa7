//! The advisor session: a conversation plus the tool loop that grounds it.

use anyhow::Result;
use chrono::Utc;

use fincoach_config::AppConfig;
use fincoach_llm::{ChatMessage, LlmRouter, Provider};
use fincoach_tools::ToolRegistry;

use crate::tool_loop::{build_tools_json, run_tool_loop, ToolExecution};

pub struct Advisor {
    llm: LlmRouter,
    registry: ToolRegistry,
    provider: Provider,
    ollama_model: String,
    openrouter_model: String,
    max_tool_rounds: usize,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct AdvisorReply {
    pub content: String,
    pub tool_executions: Vec<ToolExecution>,
}

impl Advisor {
    pub fn new(config: &AppConfig, registry: ToolRegistry) -> Self {
        let provider = if config.llm.provider.eq_ignore_ascii_case("openrouter") {
            Provider::OpenRouter
        } else {
            Provider::Ollama
        };
        let messages = vec![ChatMessage::system(system_prompt(&config.advisor.name))];
        Self {
            llm: LlmRouter::default(),
            registry,
            provider,
            ollama_model: config.llm.ollama_model.clone(),
            openrouter_model: config.llm.openrouter_model.clone(),
            max_tool_rounds: config.advisor.max_tool_rounds,
            messages,
        }
    }

    /// Handle one user turn: run the tool loop to completion and record
    /// both sides in the session history.
    pub async fn handle_turn(&mut self, user_text: &str) -> Result<AdvisorReply> {
        self.messages.push(ChatMessage::user(user_text));

        let tools = build_tools_json(&self.registry.list_specs());
        let result = run_tool_loop(
            &self.llm,
            self.provider,
            &self.ollama_model,
            &self.openrouter_model,
            &mut self.messages,
            Some(&tools),
            &self.registry,
            self.max_tool_rounds,
        )
        .await?;

        self.messages.push(ChatMessage::assistant(result.content.clone()));
        Ok(AdvisorReply {
            content: result.content,
            tool_executions: result.tool_executions,
        })
    }
}

fn system_prompt(advisor_name: &str) -> String {
    let today = Utc::now().date_naive();
    format!(
        r#"You are {advisor_name}, a personal-finance advisor. Today is {today}.

When the user states a financial fact, persist it with a tool call before replying:
- balances and debts → upsert_account (use the effective date the user implies, not today, when they mention a past date)
- "my checking is actually my Chase checking" style clarifications → merge_account
- a new goal → create_goal with 3-5 concrete action steps
- progress on a goal → update_goal

Use get_financial_summary, get_financial_history, and get_goals to answer questions about their situation instead of guessing. Keep replies short and concrete. Never invent balances the user did not state."#
    )
}
