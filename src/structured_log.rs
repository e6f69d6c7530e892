//! JSON-lines backend for the `log` facade, plus explicit lifecycle events.
//!
//! Every line on stderr is one object with `timestampMs`, `level` and
//! `event`. Records coming through `log!` macros use the event `"log"` and
//! carry `target` and `message`; binaries emit named events with `details`.

use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Default, Serialize)]
pub struct LogContext {
    #[serde(rename = "runId", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u64>,
}

#[derive(Debug, Serialize)]
struct LogLine<'a> {
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
    level: &'static str,
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    context: &'a LogContext,
    #[serde(skip_serializing_if = "Value::is_null")]
    details: Value,
}

pub struct StructuredLogger {
    level: LevelFilter,
}

impl StructuredLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

impl Log for StructuredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let context = LogContext::default();
        let line = LogLine {
            timestamp_ms: now_ms(),
            level: level_name(record.level()),
            event: "log",
            target: Some(record.target()),
            message: Some(record.args().to_string()),
            context: &context,
            details: Value::Null,
        };
        write_line(&line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs the logger process-wide. Fails if a logger is already set.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(StructuredLogger::new(level)))?;
    log::set_max_level(level);
    Ok(())
}

/// Accepts `off`, `error`, `warn`, `info`, `debug`, `trace` in any case.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse().ok()
}

/// Emits a named lifecycle event, honouring the installed max level.
pub fn emit_event(level: Level, event: &str, context: &LogContext, details: Value) {
    if level > log::max_level() {
        return;
    }
    write_line(&LogLine {
        timestamp_ms: now_ms(),
        level: level_name(level),
        event,
        target: None,
        message: None,
        context,
        details,
    });
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "trace",
    }
}

fn write_line(line: &LogLine) {
    if let Ok(text) = serde_json::to_string(line) {
        eprintln!("{text}");
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
