//! Ships the hook's warnings and errors to the server's plugin log.
//!
//! [`UploadLayer`] buffers WARN and ERROR events during the invocation. `handle`
//! flushes the buffer once, after the event has been processed. An upload that
//! fails is dropped.

use std::fmt;
use std::sync::{Arc, Mutex};

use overlap_core::types::{LogEntry, LogError, LogLevel};
use overlap_core::{Config, OverlapApi, Transport};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Entries waiting to be uploaded. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogBuffer {
    fn push(&self, entry: LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn take(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

pub struct UploadLayer {
    buffer: LogBuffer,
}

impl UploadLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

/// Fields recorded on a span, kept in its extensions.
struct SpanFields(Map<String, Value>);

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}

impl<S> Layer<S> for UploadLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(collector.fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = match *metadata.level() {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            _ => return,
        };

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let mut fields = collector.fields;

        let mut entry = LogEntry::new(level, collector.message.unwrap_or_default());
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(SpanFields(span_fields)) = extensions.get::<SpanFields>() {
                    if let Some(hook) = span_fields.get("event").and_then(Value::as_str) {
                        entry.hook = Some(hook.to_string());
                    }
                    if let Some(id) = span_fields
                        .get("session_id")
                        .and_then(Value::as_str)
                        .filter(|id| !id.is_empty())
                    {
                        entry.session_id = Some(id.to_string());
                    }
                }
            }
        }

        if let Some(error) = fields.remove("error") {
            entry.error = Some(LogError {
                error_type: metadata.target().to_string(),
                message: text_of(error),
                traceback: fields.remove("chain").map(text_of),
            });
        }
        if !fields.is_empty() {
            entry.data = Some(fields);
        }

        self.buffer.push(entry);
    }
}

fn text_of(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Sends everything buffered so far. Skipped when the plugin is not configured.
pub fn flush<T: Transport>(api: &OverlapApi<T>, config: &Config, buffer: &LogBuffer) {
    let entries = buffer.take();
    if entries.is_empty() || !config.is_configured() {
        return;
    }
    match api.send_logs(&entries) {
        Ok(received) => tracing::debug!(received, "Uploaded hook logs"),
        Err(err) => tracing::debug!(error = %err, dropped = entries.len(), "Log upload failed"),
    }
}
