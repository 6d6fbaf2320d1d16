//! Slash commands typed at the prompt.
//!
//! These run directly against the session and never reach the model.

use crate::gateway::ChatGateway;
use crate::session::{Operator, Session, CONFIRM_PROMPT};
use crate::tools::{
    current_dir, list_files, run_command, search_text, ListFilesArgs, RunCommandArgs,
    SearchTextArgs,
};
use tracing::{info, warn};

pub const HELP: &str = "\
Commands:
  /help                        Show this help
  /exit                        Exit the CLI
  /ls [path]                   List files
  /pwd                         Show current directory
  /model [name]                Show or set model
  /api [url]                   Show or set API base or full chat URL
  /system [text|reset]         Show or set system prompt override
  /memory [on|off|clear|path]  Manage memory
  /set k=v [...]               Set model/api/memory in one command
  /search <pattern> [path]     Search text in files
  /run <command>               Run a shell command (confirm first)
  /clear                       Clear the screen";

/// One line of operator input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Command { name: String, args: String },
    Chat(String),
}

/// Whether the session keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// `/name args` and `:name args` are commands, as are bare `exit`, `quit`
/// and `ls`. Everything else is chat.
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    match trimmed {
        "exit" | "quit" => return command("exit", ""),
        "ls" => return command("ls", ""),
        _ => {}
    }

    match trimmed.strip_prefix('/').or_else(|| trimmed.strip_prefix(':')) {
        Some(raw) => {
            let (name, args) = raw.split_once(char::is_whitespace).unwrap_or((raw, ""));
            command(&name.to_lowercase(), args.trim())
        }
        None => Input::Chat(trimmed.to_string()),
    }
}

fn command(name: &str, args: &str) -> Input {
    Input::Command {
        name: name.to_string(),
        args: args.to_string(),
    }
}

impl<G: ChatGateway, O: Operator> Session<G, O> {
    pub async fn handle_command(&mut self, name: &str, args: &str) -> Flow {
        info!("Command /{} {}", name, args);
        match name {
            "help" => self.operator.say(HELP),
            "exit" | "quit" => return Flow::Exit,
            "clear" => self.operator.clear_screen(),
            "pwd" => {
                let output = current_dir();
                self.operator.say(&output.to_string());
            }
            "ls" => {
                let args = ListFilesArgs {
                    path: Some(if args.is_empty() { "." } else { args }.to_string()),
                    ..Default::default()
                };
                let output = list_files(&self.tools.sandbox, &args).await;
                self.operator.say(&output.to_string());
            }
            "model" => self.model_command(args),
            "api" => self.api_command(args),
            "system" => self.system_command(args),
            "memory" => self.memory_command(args).await,
            "set" => self.set_command(args),
            "search" => self.search_command(args).await,
            "run" => self.shell_command(args).await,
            _ => self
                .operator
                .say("Unknown command. Type /help for commands."),
        }
        Flow::Continue
    }

    fn model_command(&mut self, args: &str) {
        if args.is_empty() {
            let text = format!("Model: {}", self.settings.model);
            self.operator.say(&text);
            return;
        }
        self.set_model(args);
        self.save_config();
        let text = format!("Model set to: {}", self.settings.model);
        self.operator.say(&text);
    }

    fn api_command(&mut self, args: &str) {
        if args.is_empty() {
            let text = format!("API: {}", self.settings.api_url.as_deref().unwrap_or("default"));
            self.operator.say(&text);
            return;
        }
        self.set_api(args);
        self.save_config();
        let text = format!("API set to: {}", args);
        self.operator.say(&text);
    }

    fn system_command(&mut self, args: &str) {
        if args.is_empty() {
            let current = self
                .messages
                .first()
                .and_then(|m| m.content.clone())
                .unwrap_or_default();
            self.operator.say(&format!("System prompt: {}", current));
            return;
        }

        let reply = if args == "reset" {
            self.settings.system_prompt = None;
            self.config.system_prompt = None;
            "System prompt reset."
        } else {
            self.settings.system_prompt = Some(args.to_string());
            self.config.system_prompt = Some(args.to_string());
            "System prompt updated."
        };
        self.save_config();
        self.reset_conversation();
        self.operator.say(reply);
    }

    async fn memory_command(&mut self, args: &str) {
        match args.to_lowercase().as_str() {
            "" | "path" => {
                let text = format!(
                    "Memory: {}\nPath: {}",
                    on_off(self.settings.memory_enabled),
                    self.store.path().display()
                );
                self.operator.say(&text);
            }
            "on" | "off" => {
                self.set_memory(args.eq_ignore_ascii_case("on"));
                self.save_config();
                let text = if self.settings.memory_enabled {
                    "Memory enabled."
                } else {
                    "Memory disabled."
                };
                self.operator.say(text);
            }
            "clear" => {
                if !self.operator.confirm("Clear memory? (y/n): ") {
                    self.operator.say("Cancelled.");
                    return;
                }
                if let Err(err) = self.store.clear().await {
                    warn!("Failed to clear memory: {:#}", err);
                    self.operator.say(&format!("Failed to clear memory: {:#}", err));
                    return;
                }
                self.reset_conversation();
                self.operator.say("Memory cleared.");
            }
            _ => self.operator.say("Usage: /memory [on|off|clear|path]"),
        }
    }

    fn set_command(&mut self, args: &str) {
        if args.is_empty() {
            self.operator.say("Usage: /set model=... api=... memory=on|off");
            return;
        }

        let mut changed = false;
        for part in args.split_whitespace() {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.to_lowercase().as_str() {
                "model" => {
                    self.set_model(value);
                    changed = true;
                }
                "api" => {
                    self.set_api(value);
                    changed = true;
                }
                "memory" if value == "on" || value == "off" => {
                    self.set_memory(value == "on");
                    changed = true;
                }
                _ => {}
            }
        }

        if changed {
            self.save_config();
            self.operator.say("Settings updated.");
        } else {
            self.operator
                .say("No valid settings provided. Use model=, api=, memory=on|off.");
        }
    }

    async fn search_command(&mut self, args: &str) {
        let mut words = args.split_whitespace();
        let Some(pattern) = words.next() else {
            self.operator.say("Usage: /search <pattern> [path]");
            return;
        };
        let rest: Vec<&str> = words.collect();
        let args = SearchTextArgs {
            pattern: Some(pattern.to_string()),
            path: (!rest.is_empty()).then(|| rest.join(" ")),
            ..Default::default()
        };
        let output = search_text(&self.tools.sandbox, &args).await;
        self.operator.say(&output.to_string());
    }

    async fn shell_command(&mut self, args: &str) {
        if args.is_empty() {
            self.operator.say("Usage: /run <command>");
            return;
        }
        self.operator
            .say(&format!("The assistant wants to run:\n  {}", args));
        if !self.operator.confirm(CONFIRM_PROMPT) {
            self.operator.say("Cancelled.");
            return;
        }
        let request = RunCommandArgs {
            command: Some(args.to_string()),
            ..Default::default()
        };
        let output = run_command(&self.tools.sandbox, &request, self.tools.command_timeout).await;
        self.operator.say(&output.to_string());
    }

    fn set_model(&mut self, model: &str) {
        self.settings.model = model.to_string();
        self.config.model = Some(model.to_string());
    }

    fn set_api(&mut self, url: &str) {
        self.settings.api_url = Some(url.to_string());
        self.config.api_url = Some(url.to_string());
    }

    fn set_memory(&mut self, enabled: bool) {
        self.settings.memory_enabled = enabled;
        self.config.memory_enabled = Some(enabled);
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
