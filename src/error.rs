//! Console error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("{host}:{port}: browser isn't listening for debugger connections")]
    NotListening { host: String, port: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Browser has no open tabs")]
    NoTabs,

    #[error("Connection to the browser was closed")]
    Disconnected,

    #[error("Invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for ConsoleError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ConsoleError::Protocol(e.to_string())
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(e: reqwest::Error) -> Self {
        ConsoleError::Transport(e.to_string())
    }
}

impl ConsoleError {
    /// Classify a failed discovery request. Refused connections get their own
    /// variant so the user is told to start the browser with a debug port.
    pub fn from_discovery(e: &reqwest::Error, host: &str, port: u16) -> Self {
        if e.is_connect() {
            ConsoleError::NotListening {
                host: host.to_string(),
                port,
            }
        } else {
            ConsoleError::Transport(e.to_string())
        }
    }
}
