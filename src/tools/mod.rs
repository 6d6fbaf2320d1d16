//! Tools the model can call to work on the project.
//!
//! Every tool runs inside the [`Sandbox`] and reports failures as a
//! [`ToolOutput::Error`] value instead of an `Err`, so nothing that goes wrong
//! inside a tool can end the conversation.

mod exec;
mod fs;
mod search;

pub use exec::{run_command, RunCommandArgs};
pub use fs::{
    current_dir, list_files, read_file, replace_in_file, write_file, ListFilesArgs, ReadFileArgs,
    ReplaceInFileArgs, WriteFileArgs,
};
pub use search::{search_text, search_text_with, SearchBackend, SearchTextArgs};

use crate::sandbox::Sandbox;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Files above this size must be read by line range.
pub const MAX_READ_BYTES: u64 = 512 * 1024;

pub const CURRENT_DIR: &str = "current_dir";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_FILES: &str = "list_files";
pub const SEARCH_TEXT: &str = "search_text";
pub const REPLACE_IN_FILE: &str = "replace_in_file";
pub const RUN_COMMAND: &str = "run_command";

// ═══════════════════════════════════════════════════════════════════════════
//  TOOL DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Tool definitions for the LLM
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn definition(name: &'static str, description: &'static str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function",
        function: FunctionDefinition {
            name,
            description,
            parameters,
        },
    }
}

/// The static tool schema sent with every chat request
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        definition(
            READ_FILE,
            "Read a file from disk (optionally by line range)",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "start_line": { "type": "number" },
                    "end_line": { "type": "number" }
                },
                "required": ["path"]
            }),
        ),
        definition(
            WRITE_FILE,
            "Write a file to disk",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            }),
        ),
        definition(
            LIST_FILES,
            "List files in a directory (optional recursion)",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "recursive": { "type": "boolean" },
                    "max_depth": { "type": "number" }
                }
            }),
        ),
        definition(
            SEARCH_TEXT,
            "Search for text in files",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "path": { "type": "string" },
                    "regex": { "type": "boolean" },
                    "case_sensitive": { "type": "boolean" },
                    "max_results": { "type": "number" }
                },
                "required": ["pattern"]
            }),
        ),
        definition(
            REPLACE_IN_FILE,
            "Replace text in a file",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "search": { "type": "string" },
                    "replace": { "type": "string" },
                    "all": { "type": "boolean" },
                    "regex": { "type": "boolean" }
                },
                "required": ["path", "search", "replace"]
            }),
        ),
        definition(
            RUN_COMMAND,
            "Run a shell command in the project directory",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "args": { "type": "array", "items": { "type": "string" } },
                    "cwd": { "type": "string" }
                },
                "required": ["command"]
            }),
        ),
        definition(
            CURRENT_DIR,
            "Get current working directory",
            serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        ),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  TOOL RESULTS
// ═══════════════════════════════════════════════════════════════════════════

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    Text(String),
    Lines(Vec<String>),
    Error(String),
}

impl ToolOutput {
    pub fn error(reason: impl fmt::Display) -> Self {
        ToolOutput::Error(reason.to_string())
    }

    pub(crate) fn from_error(err: anyhow::Error) -> Self {
        ToolOutput::Error(format!("{:#}", err))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error(_))
    }

    /// Content of the tool message sent back to the model.
    pub fn to_message_content(&self) -> String {
        match self {
            ToolOutput::Text(text) => text.clone(),
            ToolOutput::Lines(lines) => {
                serde_json::to_string_pretty(lines).unwrap_or_else(|_| lines.join("\n"))
            }
            ToolOutput::Error(reason) => format!("ERROR: {}", reason),
        }
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Text(text) => f.write_str(text),
            ToolOutput::Lines(lines) => f.write_str(&lines.join("\n")),
            ToolOutput::Error(reason) => write!(f, "ERROR: {}", reason),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  TOOL DISPATCH
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool \"{0}\"")]
    Unknown(String),
    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        source: serde_json::Error,
    },
}

/// Everything a tool needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub sandbox: Sandbox,
    pub command_timeout: Duration,
}

/// A validated call to one of the registered tools.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    CurrentDir,
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    ListFiles(ListFilesArgs),
    SearchText(SearchTextArgs),
    ReplaceInFile(ReplaceInFileArgs),
    RunCommand(RunCommandArgs),
}

impl ToolRequest {
    /// Match a tool name and decode its parameters.
    pub fn parse(name: &str, parameters: &Map<String, Value>) -> Result<Self, ToolError> {
        let request = match name {
            CURRENT_DIR => ToolRequest::CurrentDir,
            READ_FILE => ToolRequest::ReadFile(decode(READ_FILE, parameters)?),
            WRITE_FILE => ToolRequest::WriteFile(decode(WRITE_FILE, parameters)?),
            LIST_FILES => ToolRequest::ListFiles(decode(LIST_FILES, parameters)?),
            SEARCH_TEXT => ToolRequest::SearchText(decode(SEARCH_TEXT, parameters)?),
            REPLACE_IN_FILE => ToolRequest::ReplaceInFile(decode(REPLACE_IN_FILE, parameters)?),
            RUN_COMMAND => ToolRequest::RunCommand(decode(RUN_COMMAND, parameters)?),
            other => return Err(ToolError::Unknown(other.to_string())),
        };
        Ok(request)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::CurrentDir => CURRENT_DIR,
            ToolRequest::ReadFile(_) => READ_FILE,
            ToolRequest::WriteFile(_) => WRITE_FILE,
            ToolRequest::ListFiles(_) => LIST_FILES,
            ToolRequest::SearchText(_) => SEARCH_TEXT,
            ToolRequest::ReplaceInFile(_) => REPLACE_IN_FILE,
            ToolRequest::RunCommand(_) => RUN_COMMAND,
        }
    }

    /// Tools with side effects need the operator's go-ahead.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolRequest::WriteFile(_) | ToolRequest::ReplaceInFile(_) | ToolRequest::RunCommand(_)
        )
    }

    /// What the operator is asked to approve, for mutating tools.
    pub fn confirmation_summary(&self) -> Option<String> {
        match self {
            ToolRequest::WriteFile(args) => Some(format!(
                "The assistant wants to write:\n  {}",
                args.path.as_deref().unwrap_or("")
            )),
            ToolRequest::ReplaceInFile(args) => Some(format!(
                "The assistant wants to edit:\n  {}",
                args.path.as_deref().unwrap_or("")
            )),
            ToolRequest::RunCommand(args) => {
                Some(format!("The assistant wants to run:\n  {}", args.display_command()))
            }
            _ => None,
        }
    }

    pub async fn execute(&self, ctx: &ToolContext) -> ToolOutput {
        match self {
            ToolRequest::CurrentDir => current_dir(),
            ToolRequest::ReadFile(args) => read_file(&ctx.sandbox, args).await,
            ToolRequest::WriteFile(args) => write_file(&ctx.sandbox, args).await,
            ToolRequest::ListFiles(args) => list_files(&ctx.sandbox, args).await,
            ToolRequest::SearchText(args) => search_text(&ctx.sandbox, args).await,
            ToolRequest::ReplaceInFile(args) => replace_in_file(&ctx.sandbox, args).await,
            ToolRequest::RunCommand(args) => {
                run_command(&ctx.sandbox, args, ctx.command_timeout).await
            }
        }
    }
}

fn decode<T: DeserializeOwned>(
    tool: &'static str,
    parameters: &Map<String, Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(parameters.clone()))
        .map_err(|source| ToolError::InvalidArguments { tool, source })
}

/// Treat a missing or blank string argument as absent.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

// Models are loose with JSON types: "10" for 10, "true" for true.

pub(crate) fn lenient_usize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.is_finite() && f < usize::MAX as f64 => Ok(Some(f.max(0.0) as usize)),
            _ => Err(de::Error::custom(format!("number out of range: {}", n))),
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected a number, got \"{}\"", s))),
        Some(other) => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

pub(crate) fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => Ok(Some(n.as_f64().unwrap_or(0.0) != 0.0)),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(de::Error::custom(format!("expected a boolean, got \"{}\"", s))),
        },
        Some(other) => Err(de::Error::custom(format!("expected a boolean, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_tool_definitions() {
        let tools = get_tool_definitions();
        let names: Vec<_> = tools.iter().map(|t| t.function.name).collect();
        assert_eq!(
            names,
            vec![
                "read_file",
                "write_file",
                "list_files",
                "search_text",
                "replace_in_file",
                "run_command",
                "current_dir"
            ]
        );
        for tool in &tools {
            assert_eq!(tool.tool_type, "function");
            assert_eq!(tool.function.parameters["type"], "object");
        }

        let json = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["parameters"]["required"][0], "path");
    }

    #[test]
    fn test_every_definition_parses_as_a_request() {
        for tool in get_tool_definitions() {
            let result = ToolRequest::parse(tool.function.name, &Map::new());
            let request = result.expect("all arguments are optional at decode time");
            assert_eq!(request.name(), tool.function.name);
        }
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolRequest::parse("delete_everything", &Map::new()).unwrap_err();
        assert!(matches!(err, ToolError::Unknown(ref name) if name == "delete_everything"));
        assert_eq!(err.to_string(), "Unknown tool \"delete_everything\"");
    }

    #[test]
    fn test_invalid_argument_types() {
        let err = ToolRequest::parse(READ_FILE, &params(json!({"path": ["a", "b"]}))).unwrap_err();
        assert!(err.to_string().starts_with("Invalid arguments for read_file"));
    }

    #[test]
    fn test_lenient_numbers_and_booleans() {
        let request = ToolRequest::parse(
            LIST_FILES,
            &params(json!({"path": "src", "recursive": "true", "max_depth": "3"})),
        )
        .unwrap();
        match request {
            ToolRequest::ListFiles(args) => {
                assert_eq!(args.recursive, Some(true));
                assert_eq!(args.max_depth, Some(3));
            }
            other => panic!("unexpected request {:?}", other),
        }

        let request =
            ToolRequest::parse(READ_FILE, &params(json!({"path": "a", "start_line": 5.0}))).unwrap();
        assert!(matches!(request, ToolRequest::ReadFile(ref a) if a.start_line == Some(5)));
    }

    #[test]
    fn test_out_of_range_numbers_are_invalid_arguments() {
        let err = ToolRequest::parse(READ_FILE, &params(json!({"path": "a", "start_line": 1e30})))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { tool: READ_FILE, .. }));
        assert!(err.to_string().contains("number out of range"), "{}", err);

        let request =
            ToolRequest::parse(READ_FILE, &params(json!({"path": "a", "start_line": -4}))).unwrap();
        assert!(matches!(request, ToolRequest::ReadFile(ref a) if a.start_line == Some(0)));
    }

    #[test]
    fn test_mutating_tools() {
        let mutating: Vec<_> = get_tool_definitions()
            .into_iter()
            .filter_map(|t| {
                let request = ToolRequest::parse(t.function.name, &Map::new()).ok()?;
                request.is_mutating().then_some(t.function.name)
            })
            .collect();
        assert_eq!(mutating, vec!["write_file", "replace_in_file", "run_command"]);
    }

    #[test]
    fn test_confirmation_summary() {
        let request =
            ToolRequest::parse(RUN_COMMAND, &params(json!({"command": "ls", "args": ["-la"]})))
                .unwrap();
        assert_eq!(
            request.confirmation_summary().unwrap(),
            "The assistant wants to run:\n  ls -la"
        );
        assert!(ToolRequest::CurrentDir.confirmation_summary().is_none());
    }

    #[test]
    fn test_output_rendering() {
        let lines = ToolOutput::Lines(vec!["a.rs".to_string(), "src/".to_string()]);
        assert_eq!(lines.to_string(), "a.rs\nsrc/");
        assert_eq!(lines.to_message_content(), "[\n  \"a.rs\",\n  \"src/\"\n]");

        let err = ToolOutput::error("File not found: x");
        assert!(err.is_error());
        assert_eq!(err.to_message_content(), "ERROR: File not found: x");

        let text = ToolOutput::Text("OK: No changes made".to_string());
        assert_eq!(text.to_message_content(), "OK: No changes made");
    }

    #[tokio::test]
    async fn test_execute_dispatches_through_sandbox() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let ctx = ToolContext {
            sandbox: Sandbox::new(dir.path()),
            command_timeout: Duration::from_secs(30),
        };

        let read = ToolRequest::parse(READ_FILE, &params(json!({"path": "hello.txt"}))).unwrap();
        assert_eq!(read.execute(&ctx).await, ToolOutput::Text("hi there".to_string()));

        let escape = ToolRequest::parse(READ_FILE, &params(json!({"path": "../x"}))).unwrap();
        assert_eq!(
            escape.execute(&ctx).await,
            ToolOutput::Error("Path outside project: ../x".to_string())
        );
    }
}
