//! Agent model seam and tool-call protocol.
//!
//! The debug loop talks to a language model through the [`AgentModel`]
//! trait and receives structured turns. Tool calls are a closed tagged
//! union; an unknown tool fails deserialization instead of reaching a
//! stringly-typed dispatcher.

pub mod debug_loop;

pub use debug_loop::{DebugLoop, DebugReport, LoopTermination};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Marker the model emits when it believes the issue is resolved.
pub const COMPLETION_MARKER: &str = "DEBUG_COMPLETE";

/// One action the model can take against the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    RunCommand { command: String },
    ReadFile { path: String },
    WriteFile { path: String, contents: String },
    ListFiles { dir: Option<String> },
    RestartDevServer,
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::RunCommand { .. } => "run_command",
            ToolCall::ReadFile { .. } => "read_file",
            ToolCall::WriteFile { .. } => "write_file",
            ToolCall::ListFiles { .. } => "list_files",
            ToolCall::RestartDevServer => "restart_dev_server",
        }
    }

    /// Stable identity string used by repetition detection. Write calls
    /// include a content hash so rewriting a file with different contents
    /// is not flagged as a repeat.
    pub fn fingerprint(&self) -> String {
        match self {
            ToolCall::RunCommand { command } => format!("run_command:{}", command),
            ToolCall::ReadFile { path } => format!("read_file:{}", path),
            ToolCall::WriteFile { path, contents } => {
                let mut hash: u64 = 0xcbf29ce484222325;
                for byte in contents.as_bytes() {
                    hash ^= u64::from(*byte);
                    hash = hash.wrapping_mul(0x100000001b3);
                }
                format!("write_file:{}:{:016x}", path, hash)
            }
            ToolCall::ListFiles { dir } => {
                format!("list_files:{}", dir.as_deref().unwrap_or(""))
            }
            ToolCall::RestartDevServer => "restart_dev_server".to_string(),
        }
    }
}

/// Role of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry in the debug transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into() }
    }
}

/// One model response: free text plus the tool calls to execute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTurn {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl AgentTurn {
    /// Parses the completion signal out of the turn text, if present.
    pub fn completion(&self) -> Option<CompletionSignal> {
        let marker_at = self.text.find(COMPLETION_MARKER)?;
        let rest = &self.text[marker_at + COMPLETION_MARKER.len()..];
        // an optional JSON payload may follow the marker
        let payload = rest.trim_start();
        if payload.starts_with('{') {
            if let Some(end) = payload.find('}') {
                if let Ok(signal) = serde_json::from_str::<CompletionSignal>(&payload[..=end]) {
                    return Some(signal);
                }
            }
        }
        Some(CompletionSignal::default())
    }
}

/// Structured payload the model may attach to the completion marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionSignal {
    #[serde(default)]
    pub issues_fixed: Vec<String>,
    #[serde(default)]
    pub issues_remaining: Vec<String>,
}

/// Seam to whichever language model drives the debug loop.
#[async_trait]
pub trait AgentModel: Send + Sync {
    /// Produces the next turn given the transcript so far.
    async fn next_turn(&self, transcript: &[AgentMessage]) -> Result<AgentTurn>;

    /// Model identifier for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_serialization_is_tagged() {
        let call = ToolCall::RunCommand { command: "npm run build".to_string() };
        let json = serde_json::to_string(&call).unwrap();
        assert_eq!(json, r#"{"tool":"run_command","args":{"command":"npm run build"}}"#);

        let back: ToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn unknown_tool_fails_to_parse() {
        let result = serde_json::from_str::<ToolCall>(
            r#"{"tool":"delete_everything","args":{}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn fingerprint_distinguishes_write_contents() {
        let a = ToolCall::WriteFile { path: "src/App.tsx".to_string(), contents: "v1".to_string() };
        let b = ToolCall::WriteFile { path: "src/App.tsx".to_string(), contents: "v2".to_string() };
        let c = ToolCall::WriteFile { path: "src/App.tsx".to_string(), contents: "v1".to_string() };

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn completion_marker_with_payload() {
        let turn = AgentTurn {
            text: format!(
                "All fixed. {} {}",
                COMPLETION_MARKER,
                r#"{"issues_fixed":["missing import"],"issues_remaining":[]}"#
            ),
            tool_calls: vec![],
        };
        let signal = turn.completion().unwrap();
        assert_eq!(signal.issues_fixed, vec!["missing import"]);
        assert!(signal.issues_remaining.is_empty());
    }

    #[test]
    fn completion_marker_without_payload() {
        let turn = AgentTurn { text: format!("Done. {}", COMPLETION_MARKER), tool_calls: vec![] };
        let signal = turn.completion().unwrap();
        assert!(signal.issues_fixed.is_empty());
    }

    #[test]
    fn malformed_payload_falls_back_to_empty_signal() {
        let turn = AgentTurn {
            text: format!("{} {{not json}}", COMPLETION_MARKER),
            tool_calls: vec![],
        };
        let signal = turn.completion().unwrap();
        assert!(signal.issues_fixed.is_empty());
    }

    #[test]
    fn no_marker_means_no_completion() {
        let turn = AgentTurn { text: "still working".to_string(), tool_calls: vec![] };
        assert!(turn.completion().is_none());
    }
}
