//! Structured tool calling loop.
//!
//! Sends chat messages with tool definitions to the LLM, parses any
//! `tool_calls` from the response, executes them (in parallel when
//! multiple are requested), feeds results back as tool-role messages,
//! and repeats until the model stops requesting tools.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info, warn};

use fincoach_llm::{ChatMessage, ChatResponse, LlmRouter, Provider, ToolCall};
use fincoach_tools::{ToolRegistry, ToolSpec};

/// Result of the structured tool loop: the final assistant text plus every
/// tool execution that happened along the way.
#[derive(Debug, Clone)]
pub struct ToolLoopResult {
    /// Provider that handled the final response.
    pub provider: Provider,
    /// Final assistant text response.
    pub content: String,
    /// All tool executions during the loop, in order.
    pub tool_executions: Vec<ToolExecution>,
}

/// Record of a single tool execution within the loop.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub tool_name: String,
    pub args: HashMap<String, serde_json::Value>,
    pub success: bool,
    pub output: String,
}

/// Run the structured tool calling loop.
///
/// 1. Sends `messages` + `tools` schema to the LLM.
/// 2. If the response contains `tool_calls`, execute them (in parallel if >1).
/// 3. Append tool results as tool-role messages and re-send.
/// 4. Repeat until the model returns a normal text response or `max_rounds`
///    is hit; on the last round tools are omitted to force a text answer.
pub async fn run_tool_loop(
    llm: &LlmRouter,
    primary: Provider,
    ollama_model: &str,
    openrouter_model: &str,
    messages: &mut Vec<ChatMessage>,
    tools_json: Option<&serde_json::Value>,
    registry: &ToolRegistry,
    max_rounds: usize,
) -> Result<ToolLoopResult> {
    let mut all_executions: Vec<ToolExecution> = Vec::new();
    let mut final_content = String::new();
    let mut final_provider = primary;

    for round in 0..max_rounds {
        debug!(round, msg_count = messages.len(), "tool loop iteration");

        // On the last allowed round, omit tools to force a text answer.
        let effective_tools = if round < max_rounds - 1 {
            tools_json
        } else {
            warn!("tool loop hit max rounds ({max_rounds}), forcing text response");
            None
        };

        let response: ChatResponse = llm
            .chat_messages(
                primary,
                ollama_model,
                openrouter_model,
                messages,
                effective_tools,
            )
            .await?;

        final_provider = response.provider;

        // No tool calls → done, return the text response.
        if response.tool_calls.is_empty() {
            final_content = response.content;
            break;
        }

        info!(
            round,
            count = response.tool_calls.len(),
            "LLM requested tool calls"
        );

        // Echo the assistant's tool-call message into the conversation,
        // then each result as a tool-role message.
        messages.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));

        let executions = execute_tool_calls(&response.tool_calls, registry).await;
        for (call, exec) in response.tool_calls.iter().zip(executions.iter()) {
            messages.push(ChatMessage::tool_result(&call.id, &exec.output));
        }
        all_executions.extend(executions);
    }

    // If the loop exhausted without a final text response, build one from
    // the tool results so the user sees *something*.
    if final_content.is_empty() && !all_executions.is_empty() {
        final_content = all_executions
            .iter()
            .map(|e| format!("[{}]: {}", e.tool_name, &e.output[..e.output.len().min(500)]))
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    Ok(ToolLoopResult {
        provider: final_provider,
        content: final_content,
        tool_executions: all_executions,
    })
}

/// Execute a batch of tool calls, in parallel when there is more than one.
async fn execute_tool_calls(calls: &[ToolCall], registry: &ToolRegistry) -> Vec<ToolExecution> {
    if calls.is_empty() {
        return vec![];
    }

    let futs: Vec<_> = calls
        .iter()
        .map(|call| {
            let tool_name = call.function.name.clone();
            let args = call.function.arguments.clone();
            async move {
                let string_args = json_value_to_string_map(&args);
                let (success, output) = match registry.get(&tool_name) {
                    Some(tool) => match tool.run(&string_args).await {
                        Ok(result) => (result.success, result.output),
                        Err(error) => (false, error.to_string()),
                    },
                    None => (false, format!("unknown tool: {tool_name}")),
                };
                ToolExecution {
                    tool_name,
                    args: args
                        .as_object()
                        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                        .unwrap_or_default(),
                    success,
                    output,
                }
            }
        })
        .collect();

    futures::future::join_all(futs).await
}

/// Convert a JSON object value to `HashMap<String, String>` for tool `run`
/// signatures.  Non-string values keep their JSON text, so array/object
/// params stay parseable on the tool side.
fn json_value_to_string_map(val: &serde_json::Value) -> HashMap<String, String> {
    val.as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let s = match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), s)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Build the OpenAI-compatible tools JSON array from tool specs.
pub fn build_tools_json(specs: &[ToolSpec]) -> serde_json::Value {
    fincoach_tools::specs_to_openai_tools(specs)
}
