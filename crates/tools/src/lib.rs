use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ── Tool trait and registry ──────────────────────────────────────────────────

/// JSON-friendly type hint for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl Default for ParamType {
    fn default() -> Self {
        Self::String
    }
}

/// Describes a single parameter that a tool accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
    /// JSON Schema type for the parameter (default: String).
    #[serde(default)]
    pub param_type: ParamType,
    /// Allowed values when the parameter is an enum.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl ToolParam {
    /// Required string parameter, the most common case.
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            param_type: ParamType::String,
            enum_values: Vec::new(),
        }
    }

    /// Optional string parameter.
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
            param_type: ParamType::String,
            enum_values: Vec::new(),
        }
    }

    pub fn with_type(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(ToString::to_string).collect();
        self
    }
}

/// Static metadata about a tool, used by the LLM to decide which tool to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolSpec {
    /// Generate the OpenAI-compatible `tools` array element for this tool.
    ///
    /// ```json
    /// {
    ///   "type": "function",
    ///   "function": {
    ///     "name": "upsert_account",
    ///     "description": "...",
    ///     "parameters": {
    ///       "type": "object",
    ///       "properties": { ... },
    ///       "required": [...]
    ///     }
    ///   }
    /// }
    /// ```
    ///
    /// This format is accepted by both OpenRouter (OpenAI-compatible) and
    /// Ollama's `/api/chat` endpoint.
    pub fn to_openai_tool_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required: Vec<String> = Vec::new();

        for p in &self.params {
            let type_str = match p.param_type {
                ParamType::String => "string",
                ParamType::Number => "number",
                ParamType::Integer => "integer",
                ParamType::Boolean => "boolean",
                ParamType::Array => "array",
                ParamType::Object => "object",
            };
            let mut prop = serde_json::json!({
                "type": type_str,
                "description": p.description,
            });
            if !p.enum_values.is_empty() {
                prop["enum"] = serde_json::json!(p.enum_values);
            }
            properties.insert(p.name.clone(), prop);
            if p.required {
                required.push(p.name.clone());
            }
        }

        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Convert a slice of `ToolSpec` into the `tools` JSON array accepted by
/// Ollama `/api/chat` and OpenRouter `/chat/completions`.
pub fn specs_to_openai_tools(specs: &[ToolSpec]) -> serde_json::Value {
    serde_json::Value::Array(specs.iter().map(|s| s.to_openai_tool_schema()).collect())
}

/// The result returned after a tool runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Trait implemented by every advisor tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput>;
}

/// Central registry for all available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .map(|t| t.as_ref())
    }
}

// ── Built-in tools ───────────────────────────────────────────────────────────

pub mod builtins;
pub use builtins::{
    CreateGoalTool, CurateResourcesTool, FinancialHistoryTool, FinancialSummaryTool,
    GetGoalsTool, MergeAccountTool, UpdateGoalTool, UpsertAccountTool,
};

// ── ToolRegistry tests ───────────────────────────────────────────────────────
