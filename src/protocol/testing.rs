//! Scripted protocol mocks
//!
//! These let the session be driven end to end without a browser.

use super::{
    ConsoleEvent, DebugClient, EventStream, Evaluation, ObjectProperties, RemoteTab, TabInfo,
};
use crate::error::ConsoleError;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Tab
// ============================================================================

/// Tab that answers evaluations from a script and lets tests push events
pub struct MockTab {
    url: String,
    results: HashMap<String, Evaluation>,
    properties: HashMap<String, ObjectProperties>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConsoleEvent>>>,
    /// Expressions evaluated, in order
    pub evaluated: Mutex<Vec<String>>,
    /// Object ids inspected, in order
    pub inspected: Mutex<Vec<String>>,
}

impl MockTab {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            results: HashMap::new(),
            properties: HashMap::new(),
            subscribers: Mutex::new(Vec::new()),
            evaluated: Mutex::new(Vec::new()),
            inspected: Mutex::new(Vec::new()),
        }
    }

    /// Answer `expression` with `result`
    pub fn with_result(mut self, expression: &str, result: Evaluation) -> Self {
        self.results.insert(expression.to_string(), result);
        self
    }

    /// Answer inspection of `object_id` with `properties`
    pub fn with_properties(mut self, object_id: &str, properties: ObjectProperties) -> Self {
        self.properties.insert(object_id.to_string(), properties);
        self
    }

    /// Push an event to every live subscription; returns how many got it
    pub fn emit(&self, event: &ConsoleEvent) -> usize {
        let subscribers = self.subscribers.lock().unwrap();
        subscribers
            .iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Subscriptions whose stream has not been dropped
    pub fn live_subscriptions(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

#[async_trait]
impl RemoteTab for MockTab {
    fn url(&self) -> &str {
        &self.url
    }

    async fn evaluate(&self, expression: &str) -> Result<Evaluation, ConsoleError> {
        self.evaluated.lock().unwrap().push(expression.to_string());
        self.results
            .get(expression)
            .cloned()
            .ok_or_else(|| ConsoleError::Protocol(format!("No scripted result for {expression}")))
    }

    async fn properties(&self, object_id: &str) -> Result<ObjectProperties, ConsoleError> {
        self.inspected.lock().unwrap().push(object_id.to_string());
        self.properties
            .get(object_id)
            .cloned()
            .ok_or_else(|| ConsoleError::Protocol(format!("Unknown object {object_id}")))
    }

    async fn subscribe(&self) -> Result<EventStream, ConsoleError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

// ============================================================================
// Mock Client
// ============================================================================

/// Client over a fixed list of tabs; the first one is "selected"
pub struct MockClient {
    tabs: Vec<Arc<MockTab>>,
    closed: CancellationToken,
}

impl MockClient {
    pub fn new(tabs: Vec<Arc<MockTab>>) -> Self {
        Self {
            tabs,
            closed: CancellationToken::new(),
        }
    }

    /// Simulate the browser going away
    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl DebugClient for MockClient {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, ConsoleError> {
        Ok(self
            .tabs
            .iter()
            .enumerate()
            .map(|(i, tab)| TabInfo {
                id: format!("tab-{i}"),
                url: tab.url().to_string(),
            })
            .collect())
    }

    async fn attach(&self, tab: &TabInfo) -> Result<Arc<dyn RemoteTab>, ConsoleError> {
        let index: usize = tab
            .id
            .strip_prefix("tab-")
            .and_then(|i| i.parse().ok())
            .ok_or_else(|| ConsoleError::Protocol(format!("Unknown target {}", tab.id)))?;
        let tab = self
            .tabs
            .get(index)
            .ok_or_else(|| ConsoleError::Protocol(format!("Unknown target {index}")))?;
        Ok(Arc::clone(tab) as Arc<dyn RemoteTab>)
    }

    fn disconnected(&self) -> CancellationToken {
        self.closed.clone()
    }
}
