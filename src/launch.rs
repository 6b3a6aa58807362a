//! `.go` - open the source of a logged error in a local editor
//!
//! The entry's URL path is rewritten to a local file through the configured
//! prefix mappings, then the editor template is run through `sh -c`. The
//! editor command and mappings are trusted configuration; only the resolved
//! path is quoted.

use crate::config::{EditorTemplate, PathMapping};
use crate::console_log::LogEntry;
use std::borrow::Cow;
use std::process::Stdio;
use tokio::process::Command;

/// Rewrite the entry's (percent-decoded) path with the first mapping whose
/// prefix matches.
pub fn resolve_local_path(entry: &LogEntry, paths: &[PathMapping]) -> Option<String> {
    let path = urlencoding::decode(&entry.path).map_or_else(
        |e| {
            tracing::debug!(path = %entry.path, error = %e, "Path is not valid UTF-8 once decoded");
            entry.path.clone()
        },
        Cow::into_owned,
    );

    paths.iter().find_map(|mapping| {
        path.strip_prefix(&mapping.prefix)
            .map(|rest| format!("{}{rest}", mapping.local))
    })
}

/// Shell command opening `entry` in the editor, if some mapping matches.
pub fn editor_command(
    entry: &LogEntry,
    paths: &[PathMapping],
    editor: &EditorTemplate,
) -> Option<String> {
    let local = resolve_local_path(entry, paths)?;
    let quoted = match shlex::try_quote(&local) {
        Ok(q) => q.into_owned(),
        Err(e) => {
            tracing::warn!(path = %local, error = %e, "Path cannot be shell-quoted");
            return None;
        }
    };

    Some(format!(
        "{} {quoted}{}{}{}{}",
        editor.command, editor.line, entry.line, editor.column, entry.column
    ))
}

/// Start the editor without waiting for it. The exit status is logged.
pub fn spawn_editor(command: &str) -> std::io::Result<()> {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd.spawn()?;
    let command = command.to_string();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                tracing::debug!(%command, "Editor exited");
            }
            Ok(status) => {
                tracing::warn!(%command, code = ?status.code(), "Editor exited with failure");
            }
            Err(e) => {
                tracing::warn!(%command, error = %e, "Failed to wait for editor");
            }
        }
    });
    Ok(())
}
