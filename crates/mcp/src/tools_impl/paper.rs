use serde_json::{Value, json};

use review_core::ToolOutcome;

use crate::paper_search::normalize_question_list;
use crate::runtime::ToolRuntime;

pub fn paper_search(runtime: &mut ToolRuntime, query: Option<&str>, question_list_raw: Option<&Value>) -> ToolOutcome {
    let question_list = question_list_raw.map(normalize_question_list).unwrap_or_default();

    let result = match runtime.paper_search.search(query, &question_list) {
        Ok(payload) => payload,
        Err(message) => {
            runtime.record_event("paper_search_request_failed", [("message", json!(message.clone()))]);
            return ToolOutcome::error("paper_search_request_failed", message).with_retry_tool("paper_search");
        }
    };

    let success = result.get("success").and_then(Value::as_bool).unwrap_or(false);
    let count = result.get("count").and_then(Value::as_u64).unwrap_or(0);

    let mut signatures: Vec<String> = Vec::new();
    if let Some(q) = query {
        signatures.push(q.to_string());
    }
    signatures.extend(question_list.iter().cloned());
    if let Some(questions) = result.get("questions").and_then(Value::as_array) {
        for q in questions {
            if let Some(s) = q.as_str() {
                signatures.push(s.to_string());
            }
        }
    }
    if let Some(question_results) = result.get("question_results").and_then(Value::as_array) {
        for entry in question_results {
            if let Some(s) = entry.get("question").and_then(Value::as_str) {
                signatures.push(s.to_string());
            }
        }
    }

    let record = runtime.sync_job_record(|job| {
        job.usage.paper_search.record_call(success, count);
        for signature in &signatures {
            job.usage.paper_search.record_signature(signature);
        }
    });
    runtime.record_event("paper_search_called", [("success", json!(success)), ("count", json!(count))]);

    let (total_calls, can_start_pdf_annotate) = match record {
        Ok(job) => (
            job.usage.paper_search.total_calls,
            job.usage.paper_search.total_calls >= runtime.settings.min_paper_search_calls_for_pdf_annotate,
        ),
        Err(_) => (0, false),
    };

    let next_action = if can_start_pdf_annotate { "start_pdf_annotate" } else { "continue_paper_search" };

    let mut payload = result;
    if let Value::Object(map) = &mut payload {
        map.insert("usage_total_calls".to_string(), json!(total_calls));
        map.insert("can_start_pdf_annotate".to_string(), json!(can_start_pdf_annotate));
        map.insert("next_action".to_string(), json!(next_action));
    }

    ToolOutcome::ok(payload)
}

pub fn read_paper(runtime: &ToolRuntime, items: &[Value]) -> ToolOutcome {
    if items.is_empty() {
        return ToolOutcome::error("empty_items", "items must be non-empty").with_retry_tool("read_paper");
    }
    match runtime.paper_search.read_papers(items) {
        Ok(payload) => ToolOutcome::ok(payload),
        Err(message) => ToolOutcome::error("paper_search_request_failed", message).with_retry_tool("read_paper"),
    }
}

/// This deployment has no interactive channel; always `not_available`, useful only for audit.
pub fn question_prompt(_runtime: &ToolRuntime, question: &str) -> ToolOutcome {
    ToolOutcome::NotAvailable {
        message: format!("no interactive channel is available to answer: {question}"),
    }
}
