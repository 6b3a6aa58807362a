//! Live console relay
//!
//! Turns events pushed by the selected tab into numbered log entries and the
//! single styled line printed above the prompt.

use crate::console_log::{LogBuffer, LogEntry};
use crate::format::{inspect, Palette};
use crate::protocol::{ConsoleEvent, ConsoleLevel, PageErrorKind, RemoteValue};
use crossterm::style::Color;

/// Record the event and return the line to print.
pub fn relay_event(event: &ConsoleEvent, log: &mut LogBuffer, palette: Palette) -> String {
    match event {
        ConsoleEvent::ApiCall {
            level,
            args,
            source,
            line,
            column,
        } => {
            let path = source_path(source);
            let text = args.iter().map(arg_text).collect::<Vec<_>>().join(" ");
            let number = log.push(LogEntry {
                message: text.clone(),
                line: *line,
                column: *column,
                path: path.clone(),
            });
            tracing::debug!(number, ?level, buffered = log.len(), "Console API call");

            let prefix = format!("Error # {number}: ");
            if *level == ConsoleLevel::Info && args.iter().any(RemoteValue::is_object) {
                let message =
                    format!("{prefix}Unknown error at {path}@{line} (that's all we know)");
                return palette.paint(&message, Color::Red);
            }

            let body = match level_color(*level) {
                Some(color) => palette.paint(&text, color),
                None => text,
            };
            format!("{prefix}{body}")
        }
        ConsoleEvent::PageError {
            message,
            kind,
            source,
            line,
            column,
        } => {
            let number = log.push(LogEntry {
                message: message.clone(),
                line: *line,
                column: *column,
                path: source_path(source),
            });
            tracing::debug!(number, ?kind, buffered = log.len(), "Page error");

            let text = format!("Error # {number}: {message}");
            match kind {
                PageErrorKind::Warning => palette.paint(&text, Color::Yellow),
                PageErrorKind::Error => palette.paint(&text, Color::Red),
                PageErrorKind::Exception => palette.paint(&text, Color::Cyan),
                PageErrorKind::Other => text,
            }
        }
    }
}

fn level_color(level: ConsoleLevel) -> Option<Color> {
    match level {
        ConsoleLevel::Error => Some(Color::Red),
        ConsoleLevel::Log => Some(Color::White),
        ConsoleLevel::Warning => Some(Color::Yellow),
        ConsoleLevel::Info => Some(Color::Green),
        ConsoleLevel::Other => None,
    }
}

/// Plain text of a console argument: strings as-is, objects by class name
fn arg_text(arg: &RemoteValue) -> String {
    match arg {
        RemoteValue::String(s) => s.clone(),
        RemoteValue::Object { class_name, .. } => class_name.clone(),
        other => inspect(other, Palette::plain()),
    }
}

/// Path component of a script URL; the raw string if it doesn't parse.
fn source_path(source: &str) -> String {
    url::Url::parse(source).map_or_else(|_| source.to_string(), |u| u.path().to_string())
}
