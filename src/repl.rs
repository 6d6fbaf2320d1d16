//! Terminal front end: line editing, confirmations and output.

use crate::config::Settings;
use crate::session::{InputEvent, Operator};
use crate::spinner::Spinner;
use crate::tools::ToolOutput;
use anyhow::Context;
use crossterm::{
    cursor::MoveTo,
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use tracing::{debug, warn};

pub struct TerminalOperator {
    editor: DefaultEditor,
    spinner: Option<Spinner>,
}

impl TerminalOperator {
    pub fn new() -> anyhow::Result<Self> {
        let editor = DefaultEditor::new().context("Failed to initialize readline editor")?;
        Ok(Self {
            editor,
            spinner: None,
        })
    }
}

impl Operator for TerminalOperator {
    fn read_line(&mut self, prompt: &str) -> InputEvent {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(err) = self.editor.add_history_entry(line.trim()) {
                        debug!("Failed to record input history: {}", err);
                    }
                }
                InputEvent::Line(line)
            }
            Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
            Err(ReadlineError::Eof) => InputEvent::Eof,
            Err(err) => {
                warn!("Failed to read input: {}", err);
                InputEvent::Eof
            }
        }
    }

    fn say(&mut self, text: &str) {
        println!("{}\n", text);
    }

    fn confirm(&mut self, question: &str) -> bool {
        match self.editor.readline(question) {
            Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    fn thinking(&mut self, active: bool) {
        if active {
            if self.spinner.is_none() {
                self.spinner = Some(Spinner::start("thinking..."));
            }
        } else if let Some(spinner) = self.spinner.take() {
            spinner.stop();
        }
    }

    fn tool_result(&mut self, tool: &str, output: &ToolOutput) {
        if let Err(err) = execute!(
            io::stdout(),
            SetForegroundColor(Color::Rgb { r: 140, g: 140, b: 140 }),
            Print(format!("[tool:{}]\n", tool)),
            ResetColor
        ) {
            debug!("Failed to print tool header: {}", err);
        }
        println!("{}\n", output);
    }

    fn clear_screen(&mut self) {
        let cleared = execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))
            .and_then(|_| io::stdout().flush());
        if let Err(err) = cleared {
            debug!("Failed to clear screen: {}", err);
        }
    }
}

/// Startup banner
pub fn print_banner(settings: &Settings) {
    println!("lint-cli");
    println!("Model: {}", settings.model);
    println!("API: {}", settings.api_url.as_deref().unwrap_or("default"));
    println!("Type /help for commands.\n");
}
