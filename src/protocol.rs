//! Remote debugging protocol seam
//!
//! The console talks to the browser only through [`DebugClient`] and
//! [`RemoteTab`]. The production adapter lives in `cdp`; tests drive the
//! session with the scripted mocks in `testing`.

pub mod cdp;

#[cfg(test)]
pub mod testing;

use crate::error::ConsoleError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A value produced by the remote JavaScript runtime
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Undefined,
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    /// `NaN`, `Infinity`, `-0`, bigints: anything JSON can't carry
    Unserializable(String),
    Symbol(String),
    /// Accessor whose getter was left uncalled (not native code)
    Accessor,
    Object {
        class_name: String,
        /// Handle for follow-up inspection; absent for nested values
        object_id: Option<String>,
    },
}

impl RemoteValue {
    pub fn object(class_name: impl Into<String>) -> Self {
        RemoteValue::Object {
            class_name: class_name.into(),
            object_id: None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, RemoteValue::Object { .. })
    }

    /// Build a value from its JSON form. Objects and arrays only ever arrive
    /// this way from `returnByValue` results and are treated as plain objects.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RemoteValue::Null,
            serde_json::Value::Bool(b) => RemoteValue::Bool(*b),
            serde_json::Value::Number(n) => RemoteValue::Number(n.clone()),
            serde_json::Value::String(s) => RemoteValue::String(s.clone()),
            serde_json::Value::Array(_) => RemoteValue::object("Array"),
            serde_json::Value::Object(_) => RemoteValue::object("Object"),
        }
    }
}

/// Outcome of `Runtime.evaluate`
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Value(RemoteValue),
    /// The expression threw; carries the exception message
    Exception(String),
}

/// Properties fetched for an object result, in display order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectProperties {
    /// Values read through accessors on the prototype chain
    pub getters: Vec<(String, RemoteValue)>,
    pub own: Vec<(String, RemoteValue)>,
}

/// Severity of a `console.*` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    /// debug, dir, table, trace and the rest
    Other,
}

/// Flavour of an uncaught page error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageErrorKind {
    Warning,
    Error,
    Exception,
    Other,
}

/// Asynchronous output pushed by the selected tab
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    ApiCall {
        level: ConsoleLevel,
        args: Vec<RemoteValue>,
        source: String,
        line: u32,
        column: u32,
    },
    PageError {
        message: String,
        kind: PageErrorKind,
        source: String,
        line: u32,
        column: u32,
    },
}

/// Stream of console events for one tab. Dropping it detaches the listener.
pub type EventStream = BoxStream<'static, ConsoleEvent>;

/// One browser tab
#[async_trait]
pub trait RemoteTab: Send + Sync {
    /// URL the tab was showing when it was resolved
    fn url(&self) -> &str;

    /// Evaluate an expression in the tab's main frame
    async fn evaluate(&self, expression: &str) -> Result<Evaluation, ConsoleError>;

    /// Fetch getter values and own properties of an object result
    async fn properties(&self, object_id: &str) -> Result<ObjectProperties, ConsoleError>;

    /// Start listening for console API calls and page errors
    async fn subscribe(&self) -> Result<EventStream, ConsoleError>;
}

/// A tab as listed by the discovery endpoint, before attaching to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: String,
    pub url: String,
}

/// Connection to the debugging endpoint
#[async_trait]
pub trait DebugClient: Send + Sync {
    /// All page tabs, most recently focused first
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, ConsoleError>;

    /// Attach to a listed tab
    async fn attach(&self, tab: &TabInfo) -> Result<Arc<dyn RemoteTab>, ConsoleError>;

    /// Cancelled once the connection is gone
    fn disconnected(&self) -> CancellationToken;

    /// The tab the user is currently looking at
    async fn selected_tab(&self) -> Result<Arc<dyn RemoteTab>, ConsoleError> {
        let tabs = self.list_tabs().await?;
        let first = tabs.first().ok_or(ConsoleError::NoTabs)?;
        self.attach(first).await
    }
}
