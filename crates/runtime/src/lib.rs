//! Advisor runtime: the LLM tool-calling loop over the ledger and curation
//! tools, plus the conversation session that drives it.

pub mod advisor;
pub mod tool_loop;

pub use advisor::{Advisor, AdvisorReply};
pub use tool_loop::{build_tools_json, run_tool_loop, ToolExecution, ToolLoopResult};
