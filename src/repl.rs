//! Interactive evaluation session
//!
//! One loop owns the [`Session`] and multiplexes three sources with
//! `tokio::select!`: lines typed at the prompt, console events from the
//! selected tab, and the connection's disconnect signal. Commands are awaited
//! inline, so at most one remote round-trip is in flight at a time.

use crate::config::ConsoleConfig;
use crate::console_log::LogBuffer;
use crate::error::ConsoleError;
use crate::format::{format, Inspected, Palette};
use crate::launch;
use crate::prompt::prompt_for;
use crate::protocol::{ConsoleEvent, DebugClient, EventStream, Evaluation, RemoteTab, RemoteValue};
use crate::relay::relay_event;
use crossterm::style::Color;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const HELP: &str = "\
.go      Open the source of a logged error in the editor
.help    Print this help message
.quit    Exit the console
.switch  Switch to evaluating in another tab by index
.tabs    List currently open tabs
";

/// Whether the loop keeps reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// A line typed at the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Tabs,
    Switch(&'a str),
    Go(&'a str),
    Help,
    Quit,
    Unknown(&'a str),
    Eval(&'a str),
}

/// Dot-prefixed words are console commands; anything else is JavaScript.
fn parse_command(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }

    let Some(rest) = trimmed.strip_prefix('.') else {
        return Command::Eval(trimmed);
    };
    let (keyword, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(k, a)| (k, a.trim()));

    match keyword {
        "tabs" => Command::Tabs,
        "switch" => Command::Switch(arg),
        "go" => Command::Go(arg),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(keyword),
    }
}

/// State of one console: connection, selected tab and its log.
pub struct Session {
    client: Arc<dyn DebugClient>,
    tab: Arc<dyn RemoteTab>,
    prompt: String,
    /// The one live subscription; replaced whenever the tab changes
    events: Option<EventStream>,
    log: LogBuffer,
    config: ConsoleConfig,
    palette: Palette,
}

impl Session {
    /// Select the browser's current tab and start relaying its console.
    pub async fn start(
        client: Arc<dyn DebugClient>,
        config: ConsoleConfig,
    ) -> Result<Self, ConsoleError> {
        let tab = client.selected_tab().await?;
        let events = tab.subscribe().await?;
        let palette = Palette::new(config.color);

        tracing::info!(url = %tab.url(), "Selected tab");
        Ok(Self {
            client,
            prompt: prompt_for(tab.url()),
            tab,
            events: Some(events),
            log: LogBuffer::new(),
            config,
            palette,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn tab_url(&self) -> &str {
        self.tab.url()
    }

    #[cfg(test)]
    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    /// Evaluate in the selected tab, inspecting object results.
    pub async fn evaluate(&self, expression: &str) -> Result<Inspected, ConsoleError> {
        match self.tab.evaluate(expression).await? {
            Evaluation::Exception(message) => Ok(Inspected::Exception(message)),
            Evaluation::Value(RemoteValue::Object {
                class_name,
                object_id: Some(id),
            }) => {
                let properties = self.tab.properties(&id).await?;
                Ok(Inspected::Object {
                    class_name,
                    properties,
                })
            }
            Evaluation::Value(value) => Ok(Inspected::Value(value)),
        }
    }

    /// `[i] url` for every open tab
    pub async fn list_tabs(&self) -> Result<String, ConsoleError> {
        let tabs = self.client.list_tabs().await?;
        Ok(tabs
            .iter()
            .enumerate()
            .map(|(i, tab)| format!("[{i}] {}\n", tab.url))
            .collect())
    }

    /// Select the tab at `arg`. An unknown index leaves everything as it was.
    pub async fn switch_tab(&mut self, arg: &str) -> Result<String, ConsoleError> {
        let tabs = self.client.list_tabs().await?;
        let Some(info) = arg.parse::<usize>().ok().and_then(|i| tabs.get(i)) else {
            return Ok(format!("no tab at index {arg}"));
        };

        let tab = self.client.attach(info).await?;
        let events = tab.subscribe().await?;

        tracing::info!(url = %tab.url(), "Switched tab");
        self.prompt = prompt_for(tab.url());
        self.events = Some(events);
        self.tab = tab;
        Ok(self.palette.paint(self.tab.url(), Color::Yellow))
    }

    /// Open the source of error number `arg` in the configured editor.
    pub fn launch(&self, arg: &str) -> String {
        let Ok(number) = arg.parse::<usize>() else {
            return "Error number was not a number.".to_string();
        };
        let Some(entry) = self.log.get(number) else {
            return format!("no log entry # {number}");
        };
        let Some(command) = launch::editor_command(entry, &self.config.paths, &self.config.editor)
        else {
            return "Can't launch: no path match".to_string();
        };

        tracing::info!(%command, number, "Launching editor");
        match launch::spawn_editor(&command) {
            Ok(()) => format!("launching: {command}"),
            Err(e) => format!("Failed to launch editor: {e}"),
        }
    }

    /// Record a console event and return its display line.
    pub fn relay(&mut self, event: &ConsoleEvent) -> String {
        relay_event(event, &mut self.log, self.palette)
    }

    /// Next event from the active subscription; pending forever if none.
    async fn next_event(&mut self) -> Option<ConsoleEvent> {
        match &mut self.events {
            Some(events) => events.next().await,
            None => std::future::pending().await,
        }
    }
}

/// The session plus the terminal it writes to
pub struct Repl<W> {
    session: Session,
    out: W,
}

impl<W: Write> Repl<W> {
    pub fn new(session: Session, out: W) -> Self {
        Self { session, out }
    }

    #[cfg(test)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Read lines from `input` until `.quit`, end of input or disconnection.
    pub async fn run<R>(&mut self, input: R) -> Result<(), ConsoleError>
    where
        R: AsyncBufRead + Unpin,
    {
        let disconnected = self.session.client.disconnected();
        let mut lines = input.lines();

        let url = self.session.palette.paint(self.session.tab_url(), Color::Yellow);
        writeln!(self.out, "{url}")?;
        self.display_prompt()?;

        loop {
            tokio::select! {
                () = disconnected.cancelled() => {
                    writeln!(self.out)?;
                    return Err(ConsoleError::Disconnected);
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        writeln!(self.out)?;
                        return Ok(());
                    };
                    if self.handle_line(&line).await? == Flow::Quit {
                        return Ok(());
                    }
                    self.display_prompt()?;
                }
                event = self.session.next_event() => {
                    match event {
                        Some(event) => self.handle_event(&event)?,
                        None => {
                            tracing::warn!("Console subscription ended");
                            self.session.events = None;
                        }
                    }
                }
            }
        }
    }

    /// Execute one input line.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow, ConsoleError> {
        let output = match parse_command(line) {
            Command::Empty => return Ok(Flow::Continue),
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => HELP.trim_end().to_string(),
            Command::Tabs => self.session.list_tabs().await?.trim_end().to_string(),
            Command::Switch(arg) => self.session.switch_tab(arg).await?,
            Command::Go(arg) => self.session.launch(arg),
            Command::Unknown(keyword) => {
                tracing::debug!(keyword, "Unknown command");
                "Invalid REPL keyword".to_string()
            }
            Command::Eval(expression) => {
                let result = self.session.evaluate(expression).await?;
                format(&result, self.session.palette)
            }
        };

        if !output.is_empty() {
            writeln!(self.out, "{output}")?;
        }
        Ok(Flow::Continue)
    }

    /// Print a relayed event above a fresh prompt.
    pub fn handle_event(&mut self, event: &ConsoleEvent) -> Result<(), ConsoleError> {
        let line = self.session.relay(event);
        writeln!(self.out, "\r{line}")?;
        self.display_prompt()
    }

    fn display_prompt(&mut self) -> Result<(), ConsoleError> {
        write!(self.out, "{}", self.session.prompt())?;
        self.out.flush()?;
        Ok(())
    }
}
