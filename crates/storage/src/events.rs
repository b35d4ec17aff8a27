//! Append-only event log. Never rewritten; every state transition and successful tool
//! outcome produces at least one event record before the transition is considered durable
//! (I5).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value, json};

use crate::error::StoreError;
use crate::paths::events_path;

pub fn append_event(
    job_dir: &Path,
    event: &str,
    extra: impl IntoIterator<Item = (&'static str, Value)>,
) -> Result<(), StoreError> {
    std::fs::create_dir_all(job_dir)?;
    let mut row = Map::new();
    row.insert("ts".to_string(), json!(review_core::diagnostics::now_rfc3339()));
    row.insert("event".to_string(), json!(event));
    for (key, value) in extra {
        row.insert(key.to_string(), value);
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(events_path(job_dir))?;
    writeln!(file, "{}", Value::Object(row))?;
    Ok(())
}

pub fn read_events(job_dir: &Path) -> Result<Vec<Value>, StoreError> {
    let path = events_path(job_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(line)?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_events_are_readable_in_order() {
        let dir = std::env::temp_dir().join(format!("review_store_events_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        append_event(&dir, "created", []).unwrap();
        append_event(&dir, "worker_spawned", [("pid", json!(42))]).unwrap();

        let events = read_events(&dir).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "created");
        assert_eq!(events[1]["pid"], 42);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
