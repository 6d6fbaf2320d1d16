//! Chat messages exchanged with the model and kept in session history.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum non-system messages kept in history (and on disk).
pub const MAX_HISTORY: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Tool call as it is recorded on an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMessage {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCallMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallMessage {
    pub name: String,
    /// Always a JSON object once recorded
    #[serde(default)]
    pub arguments: Value,
}

fn function_type() -> String {
    "function".to_string()
}

/// A request from the model to run one named tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn to_message(&self) -> ToolCallMessage {
        ToolCallMessage {
            id: self.id.clone(),
            call_type: function_type(),
            function: FunctionCallMessage {
                name: self.name.clone(),
                arguments: Value::Object(self.parameters.clone()),
            },
        }
    }
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(calls: &[ToolCall]) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls.iter().map(ToolCall::to_message).collect()),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Keep the system message (if any) first and only the most recent
/// `max` other messages after it.
pub fn trim_history(messages: Vec<Message>, max: usize) -> Vec<Message> {
    let mut system = None;
    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == Role::System {
            if system.is_none() {
                system = Some(message);
            }
        } else {
            rest.push(message);
        }
    }

    let mut trimmed: Vec<Message> = Vec::with_capacity(max + 1);
    trimmed.extend(system);
    trimmed.extend(keep_recent(rest, max));
    trimmed
}

/// The last `max` messages, cut so the result never opens with a tool
/// message whose assistant `tool_calls` entry was dropped.
pub fn keep_recent(mut messages: Vec<Message>, max: usize) -> Vec<Message> {
    let mut skip = messages.len().saturating_sub(max);
    while messages.get(skip).is_some_and(|m| m.role == Role::Tool) {
        skip += 1;
    }
    messages.drain(..skip);
    messages
}
