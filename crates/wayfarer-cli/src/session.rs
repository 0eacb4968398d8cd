pub mod session_file;

use anyhow::{Context, Result};
use cliclack::{input, spinner};
use console::style;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use wayfarer::models::event::Event;
use wayfarer::orchestrator::{Orchestrator, StopReason, UserInput};

use crate::render::render_event;
use session_file::persist_log;

/// What the user typed at the prompt
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Exit,
    Reset,
    /// Attach a file to the next message
    Attach(PathBuf),
    Message(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            return Command::Exit;
        }
        if line == "/reset" {
            return Command::Reset;
        }
        if let Some(path) = line.strip_prefix("/attach ") {
            let path = path.trim();
            if !path.is_empty() {
                return Command::Attach(PathBuf::from(path));
            }
        }
        if line.is_empty() {
            Command::Empty
        } else {
            Command::Message(line.to_string())
        }
    }
}

/// Mime type from the file extension, for the kinds of files a traveller would share
pub fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn read_attachment(path: &Path) -> Result<(&'static str, Vec<u8>)> {
    let data = std::fs::read(path)
        .with_context(|| format!("Could not read attachment {}", path.display()))?;
    Ok((mime_type_for(path), data))
}

pub struct Session {
    orchestrator: Orchestrator,
    session_file: Option<PathBuf>,
    pending_attachment: Option<PathBuf>,
}

impl Session {
    pub fn new(orchestrator: Orchestrator, session_file: Option<PathBuf>) -> Self {
        Session {
            orchestrator,
            session_file,
            pending_attachment: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.setup_session();

        loop {
            let line: String = input("Message:").placeholder("").multiline().interact()?;
            match Command::parse(&line) {
                Command::Exit => break,
                Command::Empty => continue,
                Command::Reset => {
                    self.orchestrator.reset();
                    self.persist();
                    println!("{}", style("Conversation cleared.").dim());
                }
                Command::Attach(path) => {
                    if path.is_file() {
                        println!(
                            "{}",
                            style(format!("{} will be sent with your next message.", path.display()))
                                .dim()
                        );
                        self.pending_attachment = Some(path);
                    } else {
                        println!("{}", style(format!("No such file: {}", path.display())).red());
                    }
                }
                Command::Message(text) => {
                    let attachment = self.pending_attachment.take();
                    match build_input(text, attachment.as_deref()) {
                        Ok(user_input) => self.process(user_input).await,
                        Err(e) => println!("{}", style(e).red()),
                    }
                }
            }
        }

        self.close_session();
        Ok(())
    }

    pub async fn headless_start(&mut self, message: String, attachment: Option<&Path>) -> Result<()> {
        let user_input = build_input(message, attachment)?;
        self.process(user_input).await;
        Ok(())
    }

    async fn process(&mut self, user_input: UserInput) {
        let cancel = CancellationToken::new();
        let spin = spinner();
        spin.start("awaiting reply");
        let mut spinning = true;

        {
            let mut events = self.orchestrator.run_with_cancel(user_input, cancel.clone());
            loop {
                tokio::select! {
                    event = events.next() => {
                        let Some(event) = event else { break };
                        if spinning {
                            spin.stop("");
                            spinning = false;
                        }
                        render_event(&event);
                        // more model work follows a tool result
                        if matches!(event, Event::ToolResult { .. }) {
                            spin.start("awaiting reply");
                            spinning = true;
                        }
                    }
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        // The run closes any pending tool calls and ends on its own
                        cancel.cancel();
                    }
                }
            }
        }
        if spinning {
            spin.stop("");
        }

        match self.orchestrator.last_stop() {
            Some(StopReason::Cancelled) => println!(
                "{}",
                style("Interrupted. The conversation keeps everything up to this point.").yellow()
            ),
            Some(StopReason::TurnLimit) => println!(
                "{}",
                style(format!(
                    "Stopped after {} model turns.",
                    self.orchestrator.config().max_turns
                ))
                .yellow()
            ),
            _ => {}
        }
        println!();
        self.persist();
    }

    fn persist(&self) {
        if let Some(path) = &self.session_file {
            persist_log(path, self.orchestrator.log())
                .unwrap_or_else(|e| eprintln!("Failed to persist messages: {}", e));
        }
    }

    fn setup_session(&self) {
        if let Some(path) = &self.session_file {
            println!(
                "{}",
                style(format!(
                    "Starting session with {} earlier messages. Recording to {}",
                    self.orchestrator.log().len(),
                    path.display()
                ))
                .dim()
            );
        }
        println!(
            "Wayfarer {}",
            style("- type \"exit\" to end the session, \"/attach <file>\" to share a file, \"/reset\" to start over").dim()
        );
        println!();
    }

    fn close_session(&self) {
        if let Some(path) = &self.session_file {
            println!(
                "{}",
                style(format!("Closing session. Recorded to {}", path.display())).dim()
            );
        }
    }
}

fn build_input(text: String, attachment: Option<&Path>) -> Result<UserInput> {
    let user_input = UserInput::new(text);
    match attachment {
        Some(path) => {
            let (mime_type, data) = read_attachment(path)?;
            Ok(user_input.with_attachment(mime_type, data))
        }
        None => Ok(user_input),
    }
}
