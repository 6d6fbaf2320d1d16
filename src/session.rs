//! The conversation loop.
//!
//! A [`Session`] owns the live message history and drives one turn at a time:
//! ask the model, run whatever tools it requests (asking the operator before
//! anything that writes or executes), feed the results back, and repeat until
//! the model answers in plain text.

use crate::commands::{parse_input, Flow, Input};
use crate::config::{Config, Settings, STATE_DIR};
use crate::conversation::{trim_history, Message, ToolCall, MAX_HISTORY};
use crate::gateway::{ChatGateway, GatewayReply};
use crate::memory::MemoryStore;
use crate::prompt;
use crate::sandbox::Sandbox;
use crate::tools::{ToolContext, ToolOutput, ToolRequest};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const CONFIRM_PROMPT: &str = "Proceed? (y/n): ";

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// Ctrl-C at the prompt
    Interrupted,
    /// Input stream closed
    Eof,
}

/// The human side of the session.
pub trait Operator {
    fn read_line(&mut self, prompt: &str) -> InputEvent;
    fn say(&mut self, text: &str);
    /// Ask a yes/no question; anything but `y`/`yes` is a no.
    fn confirm(&mut self, question: &str) -> bool;
    /// Waiting on the model starts (`true`) or ends (`false`)
    fn thinking(&mut self, active: bool);
    fn tool_result(&mut self, tool: &str, output: &ToolOutput);
    fn clear_screen(&mut self);
}

pub struct Session<G, O> {
    pub(crate) gateway: G,
    pub(crate) operator: O,
    pub(crate) settings: Settings,
    pub(crate) config: Config,
    pub(crate) state_dir: PathBuf,
    pub(crate) store: MemoryStore,
    pub(crate) tools: ToolContext,
    pub(crate) messages: Vec<Message>,
}

impl<G: ChatGateway, O: Operator> Session<G, O> {
    /// Start a session rooted at `root`, picking up saved history when
    /// memory is enabled.
    pub async fn open(gateway: G, operator: O, settings: Settings, config: Config, root: &Path) -> Self {
        let state_dir = root.join(STATE_DIR);
        let store = MemoryStore::new(&state_dir);
        let tools = ToolContext {
            sandbox: Sandbox::new(root),
            command_timeout: settings.command_timeout,
        };

        let mut session = Self {
            gateway,
            operator,
            settings,
            config,
            state_dir,
            store,
            tools,
            messages: Vec::new(),
        };
        session.reset_conversation();
        if session.settings.memory_enabled {
            let saved = session.store.load().await;
            info!("Restored {} messages from {}", saved.len(), session.store.path().display());
            session.messages.extend(saved);
        }
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn prompt(&self) -> String {
        format!("lint-cli ({}) > ", self.settings.model)
    }

    /// Read and handle input until the operator quits or input ends.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let prompt = self.prompt();
            let line = match self.operator.read_line(&prompt) {
                InputEvent::Line(line) => line,
                InputEvent::Interrupted => {
                    self.operator.say("Exiting.");
                    break;
                }
                InputEvent::Eof => break,
            };

            match parse_input(&line) {
                Input::Empty => continue,
                Input::Command { name, args } => {
                    if self.handle_command(&name, &args).await == Flow::Exit {
                        break;
                    }
                }
                Input::Chat(text) => {
                    self.run_turn(&text).await;
                }
            }
        }
        Ok(())
    }

    /// Process one user message through to a final answer and return it.
    pub async fn run_turn(&mut self, text: &str) -> String {
        self.messages.push(Message::user(text));

        let max_rounds = self.settings.max_tool_rounds;
        let mut rounds = 0;
        let final_text = loop {
            let calls = match self.ask_model().await {
                GatewayReply::Text(content) => break content,
                GatewayReply::ToolCalls(calls) => calls,
            };

            if max_rounds > 0 && rounds >= max_rounds {
                warn!("Tool round limit of {} reached", max_rounds);
                break format!("Stopped after {} tool rounds without a final answer.", rounds);
            }
            rounds += 1;

            self.messages.push(Message::assistant_tool_calls(&calls));
            for call in &calls {
                let content = self.dispatch(call).await;
                self.messages.push(Message::tool(call.id.as_str(), content));
            }
        };

        if !final_text.trim().is_empty() {
            self.operator.say(final_text.trim());
            self.messages.push(Message::assistant(final_text.as_str()));
        }
        self.commit().await;
        final_text
    }

    async fn ask_model(&mut self) -> GatewayReply {
        self.operator.thinking(true);
        let reply = self
            .gateway
            .complete(
                &self.messages,
                &self.settings.model,
                self.settings.api_url.as_deref(),
            )
            .await;
        self.operator.thinking(false);
        reply.normalize()
    }

    /// Run one tool call and return the content of its tool message.
    async fn dispatch(&mut self, call: &ToolCall) -> String {
        let output = match ToolRequest::parse(&call.name, &call.parameters) {
            Ok(request) => self.authorize_and_execute(&request).await,
            Err(err) => {
                warn!("Rejected tool call {}: {}", call.id, err);
                ToolOutput::error(err)
            }
        };
        self.operator.tool_result(&call.name, &output);
        output.to_message_content()
    }

    async fn authorize_and_execute(&mut self, request: &ToolRequest) -> ToolOutput {
        let name = request.name();
        if request.is_mutating() {
            if let Some(summary) = request.confirmation_summary() {
                self.operator.say(&summary);
            }
            if !self.operator.confirm(CONFIRM_PROMPT) {
                info!("Operator declined {}", name);
                return ToolOutput::Text(format!("CANCELLED: {} aborted by user", name));
            }
        }

        let start = Instant::now();
        let output = request.execute(&self.tools).await;
        debug!(
            "Tool {} finished in {:?} (error: {})",
            name,
            start.elapsed(),
            output.is_error()
        );
        output
    }

    /// Trim history and persist it when memory is on.
    async fn commit(&mut self) {
        self.messages = trim_history(std::mem::take(&mut self.messages), MAX_HISTORY);
        if !self.settings.memory_enabled {
            return;
        }
        if let Err(err) = self.store.save(&self.messages).await {
            warn!("Failed to save memory: {:#}", err);
        }
    }

    fn system_message(&self) -> Message {
        Message::system(prompt::system_prompt(self.settings.system_prompt.as_deref()))
    }

    /// Drop the live conversation down to the system message.
    pub(crate) fn reset_conversation(&mut self) {
        self.messages = vec![self.system_message()];
    }

    /// Persist the current config, telling the operator if that fails.
    pub(crate) fn save_config(&mut self) {
        if let Err(err) = self.config.save(&self.state_dir) {
            warn!("Failed to save config: {:#}", err);
            self.operator.say(&format!("Failed to save config: {:#}", err));
        }
    }
}
