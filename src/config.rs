//! Console configuration
//!
//! Connection settings come from the command line (with env fallbacks); the
//! editor template and path mappings come from an optional JSON file. Both
//! are trusted input: `.go` builds a shell command out of them.

use crate::error::ConsoleError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9222;

/// How to invoke the editor for `.go`.
///
/// The command line is `<command> <path><line><N><column><M>`, so the
/// default produces `subl /src/app.js:10:4`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditorTemplate {
    pub command: String,
    /// Separator placed before the line number
    pub line: String,
    /// Separator placed before the column number
    pub column: String,
}

impl Default for EditorTemplate {
    fn default() -> Self {
        Self {
            command: "subl".to_string(),
            line: ":".to_string(),
            column: ":".to_string(),
        }
    }
}

/// Maps a URL path prefix served by the page to a local source directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathMapping {
    pub prefix: String,
    pub local: String,
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub editor: EditorTemplate,
    pub paths: Vec<PathMapping>,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub host: String,
    pub port: u16,
    pub color: bool,
    pub editor: EditorTemplate,
    pub paths: Vec<PathMapping>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            color: true,
            editor: EditorTemplate::default(),
            paths: Vec::new(),
        }
    }
}

impl ConsoleConfig {
    pub fn new(host: String, port: u16, color: bool, file: FileConfig) -> Self {
        Self {
            host,
            port,
            color,
            editor: file.editor,
            paths: file.paths,
        }
    }

    /// Base URL of the HTTP discovery endpoint
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Default config file location: `$HOME/.tabconsole/config.json`
pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tabconsole/config.json")
}

impl FileConfig {
    /// Load the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConsoleError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&raw).map_err(|e| ConsoleError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            path = %path.display(),
            mappings = config.paths.len(),
            editor = %config.editor.command,
            "Loaded config file"
        );
        Ok(config)
    }
}
