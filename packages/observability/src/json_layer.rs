//! JSONL event layer.
//!
//! One flat object per event:
//!
//! ```text
//! {"ts":"2025-03-02T08:14:07.412Z","level":"warn","service":"waypost",
//!  "target":"waypost_outbox::report","msg":"Send failed","id":42,"error":"HTTP 503: "}
//! ```
//!
//! Event fields sit next to the fixed keys so `jq 'select(.id == 42)'` works
//! without digging. A field whose name clashes with a fixed key is written as
//! `field.<name>`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const RESERVED: [&str; 5] = ["ts", "level", "service", "target", "msg"];

#[derive(Debug, Serialize)]
pub(crate) struct LogLine<'a> {
    ts: String,
    level: &'static str,
    service: &'a str,
    target: &'a str,
    msg: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Default)]
struct Fields {
    msg: String,
    values: Map<String, Value>,
}

impl Fields {
    fn put(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.msg = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else if RESERVED.contains(&name) {
            self.values.insert(format!("field.{}", name), value);
        } else {
            self.values.insert(name.to_string(), value);
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    // Non-finite coordinates become null.
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

/// Writes every event it sees as one JSON line.
pub(crate) struct JsonLayer<W> {
    service: String,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub(crate) fn new(service: String, make_writer: W) -> Self {
        Self {
            service,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);

        let metadata = event.metadata();
        let line = LogLine {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: level_name(metadata.level()),
            service: &self.service,
            target: metadata.target(),
            msg: fields.msg,
            fields: fields.values,
        };

        if let Ok(json) = serde_json::to_string(&line) {
            let _ = writeln!(self.make_writer.make_writer(), "{}", json);
        }
    }
}

fn level_name(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    }
}
