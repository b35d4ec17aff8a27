//! A single-line stderr logger, not a logging facade crate. Nothing in this codebase's
//! lineage reaches for `log`/`tracing` even in its server components; the per-job event log
//! is the durable audit trail, and this helper is only the human-operator-facing echo of it.

use crate::config::{LogFormat, LogLevel};

fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Error => 0,
        LogLevel::Warn => 1,
        LogLevel::Info => 2,
        LogLevel::Debug => 3,
    }
}

fn level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    }
}

/// Emits one line to stderr if `level` is at or below the configured verbosity.
pub fn log_line(
    configured: LogLevel,
    format: LogFormat,
    level: LogLevel,
    component: &str,
    message: &str,
    fields: &[(&str, &str)],
) {
    if level_rank(level) > level_rank(configured) {
        return;
    }

    let ts = now_rfc3339();
    match format {
        LogFormat::Pretty => {
            let mut line = format!("[{ts}] {} {component}: {message}", level_label(level));
            for (key, value) in fields {
                line.push(' ');
                line.push_str(key);
                line.push('=');
                line.push_str(value);
            }
            eprintln!("{line}");
        }
        LogFormat::Json => {
            let mut obj = serde_json::Map::new();
            obj.insert("ts".to_string(), serde_json::Value::String(ts));
            obj.insert(
                "level".to_string(),
                serde_json::Value::String(level_label(level).to_string()),
            );
            obj.insert(
                "component".to_string(),
                serde_json::Value::String(component.to_string()),
            );
            obj.insert(
                "message".to_string(),
                serde_json::Value::String(message.to_string()),
            );
            for (key, value) in fields {
                obj.insert((*key).to_string(), serde_json::Value::String((*value).to_string()));
            }
            eprintln!("{}", serde_json::Value::Object(obj));
        }
    }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
