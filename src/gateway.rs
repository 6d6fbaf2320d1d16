//! Chat client for Ollama / Open WebUI style endpoints.
//!
//! Sends the conversation plus the tool schema and turns the reply into either
//! final text or a batch of tool calls. Nothing here returns an `Err` to the
//! caller: transport and protocol failures become an `Error: ...` text reply
//! that ends the turn.

use crate::conversation::{Message, ToolCall};
use crate::tools::{get_tool_definitions, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_CHAT_URL: &str = "http://localhost:11434/ollama/api/chat";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Environment variable holding the bearer token, if any
pub const API_KEY_ENV: &str = "OLLAMA_API_KEY";

/// Map the accepted spellings of a base URL onto one chat endpoint.
///
/// `http://host`, `http://host/ollama/api` and `http://host/ollama/api/chat`
/// all end up at `http://host/ollama/api/chat`.
pub fn build_chat_url(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_CHAT_URL.to_string();
    };
    let trimmed = raw.trim_end_matches('/');
    if trimmed.ends_with("/api/chat") {
        trimmed.to_string()
    } else if trimmed.ends_with("/api") {
        format!("{}/chat", trimmed)
    } else {
        format!("{}/ollama/api/chat", trimmed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPLIES
// ═══════════════════════════════════════════════════════════════════════════

/// What the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

impl GatewayReply {
    /// Recover tool calls that a model wrote into its text instead of the
    /// tool-call channel. An empty batch of calls is plain (empty) text.
    pub fn normalize(self) -> Self {
        match self {
            GatewayReply::Text(content) => match extract_tool_from_text(&content) {
                Some(call) => {
                    debug!("Recovered tool call '{}' from reply text", call.name);
                    GatewayReply::ToolCalls(vec![call])
                }
                None => GatewayReply::Text(content),
            },
            GatewayReply::ToolCalls(calls) if calls.is_empty() => {
                GatewayReply::Text(String::new())
            }
            calls => calls,
        }
    }
}

/// A tool call serialized as the entire reply text:
/// `{"name": "...", "parameters": {...}}`.
pub fn extract_tool_from_text(content: &str) -> Option<ToolCall> {
    let trimmed = content.trim();
    if !trimmed.starts_with('{')
        || !trimmed.contains("\"name\"")
        || !trimmed.contains("\"parameters\"")
    {
        return None;
    }

    let value: Value = serde_json::from_str(trimmed).ok()?;
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let parameters = value.get("parameters")?.as_object()?.clone();

    Some(ToolCall {
        id: new_call_id(),
        name: name.to_string(),
        parameters,
    })
}

/// Decode tool arguments that may arrive as an object or as a JSON string.
/// Anything unreadable counts as no arguments.
pub fn parse_tool_args(raw: Option<&Value>) -> Map<String, Value> {
    match raw {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => {
                if !s.trim().is_empty() {
                    warn!("Ignoring unparseable tool arguments: {}", s);
                }
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

// ═══════════════════════════════════════════════════════════════════════════
//  WIRE FORMAT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    tools: Vec<ToolDefinition>,
    tool_choice: &'static str,
    stream: bool,
}

/// Ollama replies with `message`, OpenAI-compatible servers with `choices`.
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default)]
    parameters: Option<Value>,
}

impl WireToolCall {
    fn into_tool_call(self) -> ToolCall {
        let raw_args = self
            .function
            .arguments
            .as_ref()
            .filter(|v| !v.is_null())
            .or(self.function.parameters.as_ref());
        ToolCall {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_call_id),
            name: self.function.name,
            parameters: parse_tool_args(raw_args),
        }
    }
}

impl ChatResponse {
    fn into_message(self) -> Option<ResponseMessage> {
        self.message
            .or_else(|| self.choices.into_iter().next().and_then(|c| c.message))
    }
}

impl ResponseMessage {
    fn into_reply(self) -> GatewayReply {
        match self.tool_calls {
            Some(calls) if !calls.is_empty() => GatewayReply::ToolCalls(
                calls.into_iter().map(WireToolCall::into_tool_call).collect(),
            ),
            _ => GatewayReply::Text(self.content.unwrap_or_default()),
        }
    }
}

/// Parse a successful response body.
fn parse_reply(body: &str) -> GatewayReply {
    let parsed: ChatResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => return GatewayReply::Text(format!("Error: Failed to parse response: {}", e)),
    };
    match parsed.into_message() {
        Some(message) => message.into_reply().normalize(),
        None => GatewayReply::Text("Error: empty response from model".to_string()),
    }
}

fn preview(body: &str) -> String {
    let count = body.chars().count();
    if count <= ERROR_BODY_PREVIEW_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS - 3).collect();
    format!("{}...", cut)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLIENT
// ═══════════════════════════════════════════════════════════════════════════

/// Anything that can answer a conversation.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        endpoint: Option<&str>,
    ) -> GatewayReply;
}

/// HTTP gateway for Ollama's `/api/chat` (directly or behind Open WebUI).
pub struct OllamaGateway {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OllamaGateway {
    pub fn new(api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Build a gateway authenticated with `OLLAMA_API_KEY` when it is set.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(std::env::var(API_KEY_ENV).ok())
    }

    async fn post(&self, url: &str, request: &ChatRequest<'_>) -> Result<GatewayReply, reqwest::Error> {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("Chat endpoint answered {} ({} bytes)", status, text.len());

        if !status.is_success() {
            warn!("Chat endpoint returned {}", status);
            return Ok(GatewayReply::Text(format!(
                "Error: API error {}: {}",
                status,
                preview(&text)
            )));
        }
        Ok(parse_reply(&text))
    }
}

#[async_trait]
impl ChatGateway for OllamaGateway {
    async fn complete(
        &self,
        messages: &[Message],
        model: &str,
        endpoint: Option<&str>,
    ) -> GatewayReply {
        let url = build_chat_url(endpoint);
        let request = ChatRequest {
            model,
            messages,
            tools: get_tool_definitions(),
            tool_choice: "auto",
            stream: false,
        };

        info!("Sending {} messages to {} ({})", messages.len(), url, model);
        let start = Instant::now();
        let reply = match self.post(&url, &request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                GatewayReply::Text(format!("Error: {}", e))
            }
        };
        debug!("Chat round-trip took {:?}", start.elapsed());
        reply
    }
}
