//! Chrome `DevTools` Protocol adapter
//!
//! Tabs are discovered through the HTTP endpoints (`/json/version`,
//! `/json/list`); evaluation, inspection and console events go over the
//! browser WebSocket via chromiumoxide.

use super::{
    ConsoleEvent, ConsoleLevel, DebugClient, EventStream, Evaluation, ObjectProperties,
    PageErrorKind, RemoteTab, RemoteValue, TabInfo,
};
use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use async_trait::async_trait;
use chromiumoxide::{
    cdp::browser_protocol::{
        log::{self as cdp_log, EventEntryAdded, LogEntryLevel},
        target::TargetId,
    },
    cdp::js_protocol::runtime::{
        CallArgument, CallFunctionOnParams, ConsoleApiCalledType, EvaluateParams,
        EventConsoleApiCalled, EventExceptionThrown, ExceptionDetails, GetPropertiesParams,
        PropertyDescriptor, RemoteObject, RemoteObjectId, RemoteObjectSubtype, RemoteObjectType,
    },
    error::CdpError,
    Browser, Page,
};
use futures::{future, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Attempts at resolving a freshly discovered target to a page
const ATTACH_ATTEMPTS: u32 = 10;

const ATTACH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accessors reported per object
const MAX_GETTERS: usize = 100;

/// Lists every accessor on the object and its prototype chain (below
/// `Object.prototype`) that isn't shadowed nearer the object. Only
/// native getters are called; others are reported as `accessor` without
/// running them. Getters that throw are skipped.
const GETTER_VALUES_JS: &str = r"function (max) {
  const isNative = (f) => {
    try {
      return /\{\s*\[native code\]\s*\}\s*$/.test(Function.prototype.toString.call(f));
    } catch (e) {
      return false;
    }
  };
  const seen = new Set();
  const out = [];
  const describe = (v) => {
    if (v === undefined) return { type: 'undefined' };
    if (v === null) return { type: 'value', value: null };
    const t = typeof v;
    if (t === 'object' || t === 'function') {
      const ctor = v.constructor;
      return { type: 'object', className: (ctor && ctor.name) || 'Object' };
    }
    if (t === 'symbol') return { type: 'symbol', value: String(v) };
    if (t === 'bigint') return { type: 'unserializable', value: v + 'n' };
    if (t === 'number' && Object.is(v, -0)) return { type: 'unserializable', value: '-0' };
    if (t === 'number' && !isFinite(v)) return { type: 'unserializable', value: String(v) };
    return { type: 'value', value: v };
  };
  for (let proto = this;
       proto && proto !== Object.prototype;
       proto = Object.getPrototypeOf(proto)) {
    for (const name of Object.getOwnPropertyNames(proto)) {
      if (seen.has(name)) continue;
      const desc = Object.getOwnPropertyDescriptor(proto, name);
      if (!desc) continue;
      seen.add(name);
      if (typeof desc.get !== 'function') continue;
      if (!isNative(desc.get)) {
        out.push([name, { type: 'accessor' }]);
      } else {
        try { out.push([name, describe(desc.get.call(this))]); } catch (e) {}
      }
      if (out.length >= max) return out;
    }
  }
  return out;
}";

/// `/json/version` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    #[serde(rename = "Browser", default)]
    browser: String,
    web_socket_debugger_url: String,
}

/// `/json/list` entry
#[derive(Debug, Deserialize)]
struct TargetListing {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

/// Getter value as described by `GETTER_VALUES_JS`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum GetterValue {
    Undefined,
    Value { value: serde_json::Value },
    Unserializable { value: String },
    Symbol { value: String },
    Accessor,
    Object {
        #[serde(rename = "className")]
        class_name: String,
    },
}

impl From<GetterValue> for RemoteValue {
    fn from(value: GetterValue) -> Self {
        match value {
            GetterValue::Undefined => RemoteValue::Undefined,
            GetterValue::Value { value } => RemoteValue::from_json(&value),
            GetterValue::Unserializable { value } => RemoteValue::Unserializable(value),
            GetterValue::Symbol { value } => RemoteValue::Symbol(value),
            GetterValue::Accessor => RemoteValue::Accessor,
            GetterValue::Object { class_name } => RemoteValue::object(class_name),
        }
    }
}

/// Connection to a browser's remote debugging port
pub struct CdpClient {
    browser: Mutex<Browser>,
    http: reqwest::Client,
    base_url: String,
    closed: CancellationToken,
    handler_task: JoinHandle<()>,
}

impl CdpClient {
    pub async fn connect(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let http = reqwest::Client::new();
        let base_url = config.http_base();

        let version: VersionInfo = http
            .get(format!("{base_url}/json/version"))
            .send()
            .await
            .map_err(|e| ConsoleError::from_discovery(&e, &config.host, config.port))?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(
            browser = %version.browser,
            ws_url = %version.web_socket_debugger_url,
            "Connecting to browser"
        );

        let (browser, mut handler) = Browser::connect(version.web_socket_debugger_url).await?;

        let closed = CancellationToken::new();
        let token = closed.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                match event {
                    Ok(()) => {}
                    Err(CdpError::Ws(e)) => {
                        tracing::warn!("CDP connection lost: {e}");
                        break;
                    }
                    Err(e) => tracing::warn!("CDP handler error: {e}"),
                }
            }
            tracing::debug!("CDP handler finished");
            token.cancel();
        });

        Ok(Self {
            browser: Mutex::new(browser),
            http,
            base_url,
            closed,
            handler_task,
        })
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl DebugClient for CdpClient {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, ConsoleError> {
        let targets: Vec<TargetListing> = self
            .http
            .get(format!("{}/json/list", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(targets
            .into_iter()
            .filter(|t| t.kind == "page")
            .map(|t| TabInfo { id: t.id, url: t.url })
            .collect())
    }

    async fn attach(&self, tab: &TabInfo) -> Result<Arc<dyn RemoteTab>, ConsoleError> {
        let target_id = TargetId::new(tab.id.clone());
        let mut browser = self.browser.lock().await;

        // Targets opened before we connected are unknown to the handler until fetched
        browser.fetch_targets().await?;

        let mut attempt = 1;
        let page = loop {
            match browser.get_page(target_id.clone()).await {
                Ok(page) => break page,
                Err(e) if attempt < ATTACH_ATTEMPTS => {
                    tracing::debug!(target = %tab.id, attempt, error = %e, "Page not ready yet");
                    attempt += 1;
                    tokio::time::sleep(ATTACH_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(target = %tab.id, url = %tab.url, "Attached to tab");
        Ok(Arc::new(CdpTab {
            page,
            url: tab.url.clone(),
        }))
    }

    fn disconnected(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// A tab attached over CDP
pub struct CdpTab {
    page: Page,
    url: String,
}

#[async_trait]
impl RemoteTab for CdpTab {
    fn url(&self) -> &str {
        &self.url
    }

    async fn evaluate(&self, expression: &str) -> Result<Evaluation, ConsoleError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .include_command_line_api(true)
            .build()
            .map_err(ConsoleError::Protocol)?;

        let response = self.page.execute(params).await?;
        if let Some(details) = &response.result.exception_details {
            return Ok(Evaluation::Exception(exception_message(details)));
        }
        Ok(Evaluation::Value(remote_value(&response.result.result)))
    }

    async fn properties(&self, object_id: &str) -> Result<ObjectProperties, ConsoleError> {
        let object_id = RemoteObjectId::new(object_id.to_string());

        let own_params = GetPropertiesParams::builder()
            .object_id(object_id.clone())
            .own_properties(true)
            .build()
            .map_err(ConsoleError::Protocol)?;
        let own_response = self.page.execute(own_params).await?;
        let own = own_data_properties(&own_response.result.result);

        let getter_params = CallFunctionOnParams::builder()
            .function_declaration(GETTER_VALUES_JS)
            .object_id(object_id)
            .argument(
                CallArgument::builder()
                    .value(serde_json::json!(MAX_GETTERS))
                    .build(),
            )
            .return_by_value(true)
            .build()
            .map_err(ConsoleError::Protocol)?;
        let getter_response = self.page.execute(getter_params).await?;

        let getters = match (
            &getter_response.result.exception_details,
            &getter_response.result.result.value,
        ) {
            (None, Some(value)) => {
                serde_json::from_value::<Vec<(String, GetterValue)>>(value.clone())
                    .map_err(|e| ConsoleError::Protocol(format!("Bad getter values: {e}")))?
                    .into_iter()
                    .map(|(name, value)| (name, value.into()))
                    .collect()
            }
            (Some(details), _) => {
                tracing::warn!(error = %exception_message(details), "Reading getters failed");
                Vec::new()
            }
            (None, None) => Vec::new(),
        };

        Ok(ObjectProperties { getters, own })
    }

    async fn subscribe(&self) -> Result<EventStream, ConsoleError> {
        let console = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await?
            .map(|event| console_event(&event));
        let exceptions = self
            .page
            .event_listener::<EventExceptionThrown>()
            .await?
            .map(|event| exception_event(&event.exception_details));
        let entries = self
            .page
            .event_listener::<EventEntryAdded>()
            .await?
            .filter_map(|event| future::ready(log_entry_event(&event)));

        // Runtime is enabled by chromiumoxide on attach; the Log domain is not
        self.page.execute(cdp_log::EnableParams::default()).await?;

        Ok(futures::stream::select_all([
            console.boxed(),
            exceptions.boxed(),
            entries.boxed(),
        ])
        .boxed())
    }
}

/// Own properties that hold a value. Accessors are reported by
/// `GETTER_VALUES_JS` instead.
pub(crate) fn own_data_properties(
    descriptors: &[PropertyDescriptor],
) -> Vec<(String, RemoteValue)> {
    descriptors
        .iter()
        .filter(|p| p.name != "__proto__")
        .filter_map(|p| p.value.as_ref().map(|v| (p.name.clone(), remote_value(v))))
        .collect()
}

/// CDP positions are zero-based; editors and humans count from one
fn one_based(n: i64) -> u32 {
    u32::try_from(n.saturating_add(1)).unwrap_or(0)
}

pub(crate) fn remote_value(obj: &RemoteObject) -> RemoteValue {
    match obj.r#type {
        RemoteObjectType::Undefined => RemoteValue::Undefined,
        RemoteObjectType::Object | RemoteObjectType::Function => {
            if matches!(obj.subtype, Some(RemoteObjectSubtype::Null)) {
                return RemoteValue::Null;
            }
            RemoteValue::Object {
                class_name: obj
                    .class_name
                    .clone()
                    .unwrap_or_else(|| "Object".to_string()),
                object_id: obj.object_id.as_ref().map(|id| id.inner().clone()),
            }
        }
        RemoteObjectType::Symbol => RemoteValue::Symbol(
            obj.description
                .clone()
                .unwrap_or_else(|| "Symbol()".to_string()),
        ),
        _ => {
            if let Some(unser) = &obj.unserializable_value {
                RemoteValue::Unserializable(unser.inner().clone())
            } else if let Some(value) = &obj.value {
                RemoteValue::from_json(value)
            } else {
                RemoteValue::Undefined
            }
        }
    }
}

/// First line of the thrown value's description, else the exception text
pub(crate) fn exception_message(details: &ExceptionDetails) -> String {
    details
        .exception
        .as_ref()
        .and_then(|e| e.description.as_deref())
        .and_then(|d| d.lines().next())
        .map_or_else(|| details.text.clone(), str::to_string)
}

pub(crate) fn console_event(event: &EventConsoleApiCalled) -> ConsoleEvent {
    let level = match event.r#type {
        ConsoleApiCalledType::Log => ConsoleLevel::Log,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Error => ConsoleLevel::Error,
        _ => ConsoleLevel::Other,
    };

    let frame = event
        .stack_trace
        .as_ref()
        .and_then(|trace| trace.call_frames.first());

    ConsoleEvent::ApiCall {
        level,
        args: event.args.iter().map(remote_value).collect(),
        source: frame.map(|f| f.url.clone()).unwrap_or_default(),
        line: frame.map_or(0, |f| one_based(f.line_number)),
        column: frame.map_or(0, |f| one_based(f.column_number)),
    }
}

pub(crate) fn exception_event(details: &ExceptionDetails) -> ConsoleEvent {
    ConsoleEvent::PageError {
        message: exception_message(details),
        kind: PageErrorKind::Exception,
        source: details.url.clone().unwrap_or_default(),
        line: one_based(details.line_number),
        column: one_based(details.column_number),
    }
}

/// Browser-side warnings and errors; other levels are not relayed
pub(crate) fn log_entry_event(event: &EventEntryAdded) -> Option<ConsoleEvent> {
    let entry = &event.entry;
    let kind = match entry.level {
        LogEntryLevel::Warning => PageErrorKind::Warning,
        LogEntryLevel::Error => PageErrorKind::Error,
        _ => return None,
    };

    Some(ConsoleEvent::PageError {
        message: entry.text.clone(),
        kind,
        source: entry.url.clone().unwrap_or_default(),
        line: entry.line_number.map_or(0, one_based),
        column: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(v: serde_json::Value) -> RemoteObject {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_primitive_values() {
        assert_eq!(
            remote_value(&remote(json!({"type": "number", "value": 2, "description": "2"}))),
            RemoteValue::Number(2.into())
        );
        assert_eq!(
            remote_value(&remote(json!({"type": "string", "value": "hi"}))),
            RemoteValue::String("hi".into())
        );
        assert_eq!(
            remote_value(&remote(json!({"type": "undefined"}))),
            RemoteValue::Undefined
        );
        assert_eq!(
            remote_value(&remote(json!({"type": "object", "subtype": "null", "value": null}))),
            RemoteValue::Null
        );
    }

    #[test]
    fn test_unserializable_number() {
        let value = remote_value(&remote(json!({
            "type": "number",
            "unserializableValue": "NaN",
            "description": "NaN"
        })));
        assert_eq!(value, RemoteValue::Unserializable("NaN".into()));
    }

    #[test]
    fn test_object_keeps_class_and_id() {
        let value = remote_value(&remote(json!({
            "type": "object",
            "className": "HTMLDocument",
            "description": "#document",
            "objectId": "42.1.7"
        })));
        assert_eq!(
            value,
            RemoteValue::Object {
                class_name: "HTMLDocument".into(),
                object_id: Some("42.1.7".into()),
            }
        );
    }

    #[test]
    fn test_function_is_object() {
        let value = remote_value(&remote(json!({
            "type": "function",
            "className": "Function",
            "description": "function f() {}",
            "objectId": "1"
        })));
        assert!(value.is_object());
    }

    #[test]
    fn test_exception_message_prefers_description() {
        let details: ExceptionDetails = serde_json::from_value(json!({
            "exceptionId": 1,
            "text": "Uncaught",
            "lineNumber": 0,
            "columnNumber": 0,
            "exception": {
                "type": "object",
                "className": "ReferenceError",
                "description": "ReferenceError: x is not defined\n    at <anonymous>:1:1"
            }
        }))
        .unwrap();
        assert_eq!(exception_message(&details), "ReferenceError: x is not defined");
    }

    #[test]
    fn test_exception_message_falls_back_to_text() {
        let details: ExceptionDetails = serde_json::from_value(json!({
            "exceptionId": 1,
            "text": "SyntaxError: Unexpected token ')'",
            "lineNumber": 0,
            "columnNumber": 3
        }))
        .unwrap();
        assert_eq!(exception_message(&details), "SyntaxError: Unexpected token ')'");
    }

    #[test]
    fn test_console_event_from_cdp() {
        let event: EventConsoleApiCalled = serde_json::from_value(json!({
            "type": "error",
            "args": [{"type": "string", "value": "x is not defined"}],
            "executionContextId": 1,
            "timestamp": 0.0,
            "stackTrace": {
                "callFrames": [{
                    "functionName": "",
                    "scriptId": "5",
                    "url": "http://localhost/app.js",
                    "lineNumber": 9,
                    "columnNumber": 2
                }]
            }
        }))
        .unwrap();

        assert_eq!(
            console_event(&event),
            ConsoleEvent::ApiCall {
                level: ConsoleLevel::Error,
                args: vec![RemoteValue::String("x is not defined".into())],
                source: "http://localhost/app.js".into(),
                line: 10,
                column: 3,
            }
        );
    }

    #[test]
    fn test_log_entry_levels() {
        let entry = |level: &str| -> EventEntryAdded {
            serde_json::from_value(json!({
                "entry": {
                    "source": "network",
                    "level": level,
                    "text": "Failed to load resource",
                    "timestamp": 0.0,
                    "url": "http://localhost/missing.png",
                    "lineNumber": 4
                }
            }))
            .unwrap()
        };

        assert!(log_entry_event(&entry("info")).is_none());
        match log_entry_event(&entry("error")) {
            Some(ConsoleEvent::PageError { kind, line, .. }) => {
                assert_eq!(kind, PageErrorKind::Error);
                assert_eq!(line, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_own_properties_skip_accessors() {
        let descriptors: Vec<PropertyDescriptor> = serde_json::from_value(json!([
            {"name": "a", "configurable": true, "enumerable": true,
             "get": {"type": "function", "className": "Function", "objectId": "g1"}},
            {"name": "b", "configurable": true, "enumerable": true, "writable": true,
             "value": {"type": "number", "value": 2, "description": "2"}},
            {"name": "__proto__", "configurable": true, "enumerable": false,
             "value": {"type": "object", "className": "Object", "objectId": "p1"}}
        ]))
        .unwrap();

        assert_eq!(
            own_data_properties(&descriptors),
            vec![("b".to_string(), RemoteValue::Number(2.into()))]
        );
    }

    /// Run `body` (a JS function body with `walk` in scope) under node and
    /// return what it prints. `None` when node isn't installed.
    fn run_getter_walker(body: &str) -> Option<serde_json::Value> {
        let script = format!(
            "const walk = {GETTER_VALUES_JS};\nconsole.log(JSON.stringify((() => {{ {body} }})()));"
        );
        let output = match std::process::Command::new("node").arg("-e").arg(&script).output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => panic!("failed to run node: {e}"),
        };
        assert!(
            output.status.success(),
            "node failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        Some(serde_json::from_slice(&output.stdout).unwrap())
    }

    fn walked(raw: serde_json::Value) -> Vec<(String, RemoteValue)> {
        let parsed: Vec<(String, GetterValue)> = serde_json::from_value(raw).unwrap();
        parsed.into_iter().map(|(n, v)| (n, v.into())).collect()
    }

    #[test]
    fn test_walker_reports_own_accessors() {
        let Some(raw) = run_getter_walker(
            "const o = { get a() { return 1; }, get b() { return 2; }, c: 3 };
             return walk.call(o, 100);",
        ) else {
            eprintln!("Skipping test: node not available");
            return;
        };

        assert_eq!(
            walked(raw),
            vec![
                ("a".to_string(), RemoteValue::Accessor),
                ("b".to_string(), RemoteValue::Accessor),
            ]
        );
    }

    #[test]
    fn test_walker_calls_native_getters() {
        let Some(raw) = run_getter_walker("return walk.call(new Map([[1, 2]]), 100);") else {
            eprintln!("Skipping test: node not available");
            return;
        };

        assert!(walked(raw).contains(&("size".to_string(), RemoteValue::Number(1.into()))));
    }

    #[test]
    fn test_walker_leaves_user_getters_uncalled() {
        let Some(raw) = run_getter_walker(
            "class Counter {
               constructor() { this.n = 0; }
               get tick() { this.n += 1; return this.n; }
             }
             const c = new Counter();
             const first = walk.call(c, 100);
             walk.call(c, 100);
             return [first, c.n];",
        ) else {
            eprintln!("Skipping test: node not available");
            return;
        };

        assert_eq!(raw[1], json!(0));
        assert_eq!(
            walked(raw[0].clone()),
            vec![("tick".to_string(), RemoteValue::Accessor)]
        );
    }

    #[test]
    fn test_walker_own_data_shadows_prototype_getter() {
        let Some(raw) = run_getter_walker(
            "const m = new Map();
             Object.defineProperty(m, 'size', { value: 7 });
             return walk.call(m, 100);",
        ) else {
            eprintln!("Skipping test: node not available");
            return;
        };

        assert!(walked(raw).iter().all(|(name, _)| name != "size"));
    }

    #[test]
    fn test_getter_values_parse() {
        let raw = json!([
            ["title", {"type": "value", "value": "Home"}],
            ["body", {"type": "object", "className": "HTMLBodyElement"}],
            ["missing", {"type": "undefined"}],
            ["ratio", {"type": "unserializable", "value": "Infinity"}],
            ["tick", {"type": "accessor"}]
        ]);
        let parsed: Vec<(String, GetterValue)> = serde_json::from_value(raw).unwrap();
        let values: Vec<RemoteValue> = parsed.into_iter().map(|(_, v)| v.into()).collect();
        assert_eq!(
            values,
            vec![
                RemoteValue::String("Home".into()),
                RemoteValue::object("HTMLBodyElement"),
                RemoteValue::Undefined,
                RemoteValue::Unserializable("Infinity".into()),
                RemoteValue::Accessor,
            ]
        );
    }
}
