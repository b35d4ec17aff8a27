//! Polymorphic tool return values replaced with an explicit sum type (see the design notes on
//! why a dynamic per-tool response shape doesn't translate directly): every tool handler
//! returns one of these four variants, which the dispatch boundary serializes to the
//! structured JSON shape the agent framework expects.

use serde_json::{Map, Value, json};

#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ok(Value),
    Partial(Value),
    Error {
        reason: &'static str,
        message: String,
        retry_required: bool,
        retry_tool: Option<&'static str>,
        next_steps: Vec<String>,
    },
    NotAvailable { message: String },
}

impl ToolOutcome {
    pub fn ok(payload: Value) -> Self {
        ToolOutcome::Ok(payload)
    }

    pub fn partial(payload: Value) -> Self {
        ToolOutcome::Partial(payload)
    }

    pub fn error(reason: &'static str, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            reason,
            message: message.into(),
            retry_required: true,
            retry_tool: None,
            next_steps: Vec::new(),
        }
    }

    pub fn with_retry_tool(mut self, tool: &'static str) -> Self {
        if let ToolOutcome::Error { retry_tool, .. } = &mut self {
            *retry_tool = Some(tool);
        }
        self
    }

    pub fn with_next_steps(mut self, steps: Vec<String>) -> Self {
        if let ToolOutcome::Error { next_steps, .. } = &mut self {
            *next_steps = steps;
        }
        self
    }

    /// Serializes to the flat JSON object returned over the wire to the agent framework.
    pub fn into_value(self) -> Value {
        match self {
            ToolOutcome::Ok(mut payload) => {
                ensure_object(&mut payload);
                merge_field(&mut payload, "status", json!("ok"));
                payload
            }
            ToolOutcome::Partial(mut payload) => {
                ensure_object(&mut payload);
                merge_field(&mut payload, "status", json!("partial"));
                payload
            }
            ToolOutcome::Error {
                reason,
                message,
                retry_required,
                retry_tool,
                next_steps,
            } => {
                json!({
                    "status": "error",
                    "reason": reason,
                    "message": message,
                    "retry_required": retry_required,
                    "retry_tool": retry_tool,
                    "next_steps": next_steps,
                })
            }
            ToolOutcome::NotAvailable { message } => {
                json!({ "status": "not_available", "message": message })
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok(_))
    }
}

fn ensure_object(value: &mut Value) {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
}

fn merge_field(value: &mut Value, key: &str, field_value: Value) {
    if let Value::Object(map) = value {
        map.insert(key.to_string(), field_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_outcome_carries_retry_hints() {
        let outcome = ToolOutcome::error("empty_query", "query is required")
            .with_retry_tool("pdf_search")
            .with_next_steps(vec!["provide a non-empty query".to_string()]);
        let value = outcome.into_value();
        assert_eq!(value["status"], "error");
        assert_eq!(value["retry_tool"], "pdf_search");
        assert_eq!(value["retry_required"], true);
    }

    #[test]
    fn ok_outcome_sets_status_field() {
        let outcome = ToolOutcome::ok(json!({"annotation_id": "abc"}));
        let value = outcome.into_value();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["annotation_id"], "abc");
    }
}
