//! Chat clients for the advisor's LLM calls.
//!
//! Two providers are supported: a local Ollama instance (`/api/chat`) and
//! OpenRouter (`/chat/completions`).  Both speak the OpenAI-style message
//! format, including the `tools` parameter and `tool_calls` responses, so
//! the advisor's tool loop is provider-agnostic.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

// ── Message types ─────────────────────────────────────────────────────────────

/// A single function call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    /// Parsed argument object.  OpenRouter delivers arguments as a JSON
    /// string, Ollama as an object; both are normalized to a [`serde_json::Value`]
    /// at parse time.
    pub arguments: serde_json::Value,
}

/// One turn in the conversation sent to the chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant turn carrying tool calls (echoed back into the conversation
    /// before the matching tool-role results).
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: String::new(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool-role message answering the call with id `call_id`.
    pub fn tool_result(call_id: &str, content: &str) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.to_string(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

/// Final parsed response for one chat call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub provider: Provider,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenRouter,
}

// ── Clients ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenRouterClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes chat calls to the configured primary provider, falling back from
/// Ollama to OpenRouter when the local instance is unreachable and a key is
/// available.
#[derive(Debug, Clone, Default)]
pub struct LlmRouter {
    ollama: OllamaClient,
    openrouter: OpenRouterClient,
}

impl LlmRouter {
    pub async fn chat_messages(
        &self,
        primary: Provider,
        ollama_model: &str,
        openrouter_model: &str,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<ChatResponse> {
        match primary {
            Provider::OpenRouter => {
                self.openrouter
                    .chat_messages(openrouter_model, messages, tools)
                    .await
            }
            Provider::Ollama => {
                match self.ollama.chat_messages(ollama_model, messages, tools).await {
                    Ok(response) => Ok(response),
                    Err(error) if openrouter_key().is_some() => {
                        tracing::warn!(%error, "ollama call failed, falling back to OpenRouter");
                        self.openrouter
                            .chat_messages(openrouter_model, messages, tools)
                            .await
                    }
                    Err(error) => Err(error),
                }
            }
        }
    }

    /// Single-prompt convenience used for plain (non-tool) completions.
    pub async fn chat(
        &self,
        primary: Provider,
        ollama_model: &str,
        openrouter_model: &str,
        prompt: &str,
    ) -> Result<String> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .chat_messages(primary, ollama_model, openrouter_model, &messages, None)
            .await?;
        Ok(response.content)
    }
}

fn openrouter_key() -> Option<String> {
    std::env::var("OPENROUTER_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
}

/// Serialize messages for the wire.  OpenRouter (OpenAI format) wants
/// `function.arguments` as a JSON-encoded string; Ollama wants the object.
fn wire_messages(messages: &[ChatMessage], stringify_args: bool) -> serde_json::Value {
    let rendered: Vec<serde_json::Value> = messages
        .iter()
        .map(|message| {
            let mut obj = json!({
                "role": message.role,
                "content": message.content,
            });
            if !message.tool_calls.is_empty() {
                obj["tool_calls"] = serde_json::Value::Array(
                    message
                        .tool_calls
                        .iter()
                        .map(|call| {
                            let arguments = if stringify_args {
                                serde_json::Value::String(call.function.arguments.to_string())
                            } else {
                                call.function.arguments.clone()
                            };
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.function.name,
                                    "arguments": arguments,
                                }
                            })
                        })
                        .collect(),
                );
            }
            if let Some(ref id) = message.tool_call_id {
                obj["tool_call_id"] = json!(id);
            }
            obj
        })
        .collect();
    serde_json::Value::Array(rendered)
}

/// Parse a `tool_calls` array from a response message, tolerating both the
/// string-encoded and object-encoded argument styles.
fn parse_tool_calls(message: &serde_json::Value) -> Vec<ToolCall> {
    let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    calls
        .iter()
        .enumerate()
        .filter_map(|(idx, call)| {
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = match function.get("arguments") {
                Some(serde_json::Value::String(raw)) => {
                    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
                }
                Some(value) => value.clone(),
                None => serde_json::Value::Null,
            };
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("call_{idx}"));
            Some(ToolCall {
                id,
                function: ToolFunction { name, arguments },
            })
        })
        .collect()
}

impl OllamaClient {
    async fn chat_messages(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<ChatResponse> {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let endpoint = format!("{}/api/chat", base_url.trim_end_matches('/'));

        let mut payload = json!({
            "model": model,
            "messages": wire_messages(messages, false),
            "stream": false,
        });
        if let Some(tools) = tools {
            payload["tools"] = tools.clone();
        }

        let response = self.client.post(endpoint).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            anyhow::bail!("Ollama error ({status}): {body}");
        }

        let message = &body["message"];
        let content = message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok(ChatResponse {
            provider: Provider::Ollama,
            content,
            tool_calls: parse_tool_calls(message),
        })
    }
}

impl OpenRouterClient {
    async fn chat_messages(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> Result<ChatResponse> {
        let Some(api_key) = openrouter_key() else {
            anyhow::bail!("OPENROUTER_API_KEY not set");
        };

        let mut payload = json!({
            "model": model,
            "messages": wire_messages(messages, true),
        });
        if let Some(tools) = tools {
            payload["tools"] = tools.clone();
        }

        let response = self
            .client
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(api_key)
            .header("HTTP-Referer", "https://fincoach.local")
            .header("X-Title", "Fincoach")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            anyhow::bail!("OpenRouter error ({status}): {body}");
        }

        let message = &body["choices"][0]["message"];
        let content = message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok(ChatResponse {
            provider: Provider::OpenRouter,
            content,
            tool_calls: parse_tool_calls(message),
        })
    }
}

// ── Structured output extraction ──────────────────────────────────────────────

/// Extract the first valid JSON payload of type `T` from an LLM response.
///
/// The intent-extraction and curation stages instruct the model to answer
/// with a single JSON object, optionally wrapped in a fenced ` ```json `
/// block.  This looks for the fenced form first, then falls back to the
/// outermost bare `{...}` span.  Returns `None` when neither parses, which
/// callers treat as a contract violation.
pub fn extract_json_block<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    // Strategy 1: fenced ```json ... ``` blocks.
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    // Strategy 2: bare JSON object, first '{' to the last '}'.
    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct IntentShape {
        user_job: String,
        query_terms: String,
    }

    // ── extract_json_block ─────────────────────────────────────────────────

    #[test]
    fn extract_fenced_json() {
        let raw = "Here you go:\n```json\n{\"user_job\":\"compare\",\"query_terms\":\"best mortgage rates\"}\n```";
        let out = extract_json_block::<IntentShape>(raw).unwrap();
        assert_eq!(out.user_job, "compare");
        assert_eq!(out.query_terms, "best mortgage rates");
    }

    #[test]
    fn extract_fenced_json_with_surrounding_prose() {
        let raw = "Sure — the structured intent is below.\n\n```json\n{\"user_job\":\"learn\",\"query_terms\":\"what is a 401k\"}\n```\n\nLet me know if you need more.";
        let out = extract_json_block::<IntentShape>(raw).unwrap();
        assert_eq!(out.user_job, "learn");
    }

    #[test]
    fn extract_bare_json() {
        let raw = r#"{"user_job":"estimate","query_terms":"emergency fund size"}"#;
        let out = extract_json_block::<IntentShape>(raw).unwrap();
        assert_eq!(out.user_job, "estimate");
    }

    #[test]
    fn extract_bare_json_with_surrounding_text() {
        let raw = "intent: {\"user_job\":\"plan\",\"query_terms\":\"debt snowball\"} done";
        let out = extract_json_block::<IntentShape>(raw).unwrap();
        assert_eq!(out.user_job, "plan");
    }

    #[test]
    fn extract_returns_none_for_plain_text() {
        let raw = "I could not produce a structured answer.";
        assert!(extract_json_block::<IntentShape>(raw).is_none());
    }

    #[test]
    fn extract_returns_none_for_malformed_fence() {
        let raw = "```json\n{not valid json}\n```";
        assert!(extract_json_block::<IntentShape>(raw).is_none());
    }

    #[test]
    fn extract_returns_none_for_missing_fields() {
        // Valid JSON but the wrong shape must not deserialize.
        let raw = r#"{"job":"compare"}"#;
        assert!(extract_json_block::<IntentShape>(raw).is_none());
    }

    /// Fenced blocks take precedence over bare objects elsewhere in the text.
    #[test]
    fn extract_fenced_takes_precedence_over_bare() {
        let raw = r#"Bare: {"user_job":"wrong","query_terms":"no"}
```json
{"user_job":"track","query_terms":"net worth tracker"}
```
"#;
        let out = extract_json_block::<IntentShape>(raw).unwrap();
        assert_eq!(out.user_job, "track");
    }

    // ── wire format ────────────────────────────────────────────────────────

    #[test]
    fn wire_messages_stringifies_arguments_for_openrouter() {
        let calls = vec![ToolCall {
            id: "call_0".to_string(),
            function: ToolFunction {
                name: "upsert_account".to_string(),
                arguments: serde_json::json!({"name": "Chase Checking"}),
            },
        }];
        let messages = vec![ChatMessage::assistant_tool_calls(calls)];

        let stringified = wire_messages(&messages, true);
        assert!(stringified[0]["tool_calls"][0]["function"]["arguments"].is_string());

        let object_form = wire_messages(&messages, false);
        assert!(object_form[0]["tool_calls"][0]["function"]["arguments"].is_object());
    }

    #[test]
    fn wire_messages_omits_empty_tool_fields() {
        let messages = vec![ChatMessage::user("hello")];
        let wire = wire_messages(&messages, true);
        assert!(wire[0].get("tool_calls").is_none());
        assert!(wire[0].get("tool_call_id").is_none());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = ChatMessage::tool_result("call_3", "{\"ok\":true}");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_3"));
    }

    // ── parse_tool_calls ───────────────────────────────────────────────────

    #[test]
    fn parse_tool_calls_string_arguments() {
        let message = serde_json::json!({
            "tool_calls": [{
                "id": "abc",
                "function": {
                    "name": "create_goal",
                    "arguments": "{\"title\":\"Buy a House\"}"
                }
            }]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "abc");
        assert_eq!(calls[0].function.name, "create_goal");
        assert_eq!(calls[0].function.arguments["title"], "Buy a House");
    }

    #[test]
    fn parse_tool_calls_object_arguments_and_missing_id() {
        let message = serde_json::json!({
            "tool_calls": [{
                "function": {
                    "name": "get_goals",
                    "arguments": {}
                }
            }]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_0");
        assert!(calls[0].function.arguments.as_object().unwrap().is_empty());
    }

    #[test]
    fn parse_tool_calls_absent_returns_empty() {
        let message = serde_json::json!({"content": "plain answer"});
        assert!(parse_tool_calls(&message).is_empty());
    }

    #[test]
    fn provider_serde_roundtrip() {
        for provider in [Provider::Ollama, Provider::OpenRouter] {
            let json = serde_json::to_string(&provider).unwrap();
            let back: Provider = serde_json::from_str(&json).unwrap();
            assert_eq!(back, provider);
        }
    }
}
