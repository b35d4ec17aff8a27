use serde_json::{Value, json};

use review_core::annotation::{AnnotationItem, ObjectType, Severity};
use review_core::diagnostics::now_rfc3339;
use review_core::ToolOutcome;

use crate::runtime::ToolRuntime;

pub fn pdf_search(runtime: &ToolRuntime, query: &str, top_k: u32) -> ToolOutcome {
    if query.trim().is_empty() {
        return ToolOutcome::error("empty_query", "query is required").with_retry_tool("pdf_search");
    }

    let hits = runtime.page_index.search(query, top_k as usize);
    let results: Vec<Value> = hits
        .into_iter()
        .map(|(page, line, score, text)| json!({ "page": page, "line": line, "score": score, "text": text }))
        .collect();

    ToolOutcome::ok(json!({ "query": query, "count": results.len(), "results": results }))
}

pub fn pdf_read_lines(runtime: &ToolRuntime, page: u32, start_line: u32, end_line: u32) -> ToolOutcome {
    match runtime.page_index.read_lines(page, start_line, end_line) {
        None => ToolOutcome::error("page_not_found", format!("page {page} was not found")).with_retry_tool("pdf_jump"),
        Some(lines) => ToolOutcome::ok(json!({ "page": page, "lines": lines, "line_count": lines.len() })),
    }
}

pub fn pdf_jump(runtime: &ToolRuntime, page: u32) -> ToolOutcome {
    match runtime.page_index.jump(page, 8) {
        None => ToolOutcome::error("page_not_found", format!("page {page} was not found")).with_retry_tool("pdf_search"),
        Some((line_count, preview)) => {
            ToolOutcome::ok(json!({ "page": page, "line_count": line_count, "preview_lines": preview }))
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn pdf_annotate(
    runtime: &mut ToolRuntime,
    page: u32,
    start_line: u32,
    end_line: u32,
    comment: &str,
    summary: Option<&str>,
    object_type: ObjectType,
    severity: Option<Severity>,
) -> ToolOutcome {
    if runtime.settings.enable_final_gates {
        let calls = runtime
            .load_job_record()
            .map(|r| r.usage.paper_search.total_calls)
            .unwrap_or(0);
        if calls < runtime.settings.min_paper_search_calls_for_pdf_annotate {
            return ToolOutcome::error(
                "paper_search_calls_not_met",
                format!(
                    "need {} paper_search calls before annotating, have {calls}",
                    runtime.settings.min_paper_search_calls_for_pdf_annotate
                ),
            )
            .with_retry_tool("paper_search")
            .with_next_steps(vec!["call paper_search with a distinct query, then retry pdf_annotate".to_string()]);
        }
    }

    let Some(lines) = runtime.page_index.read_lines(page, start_line, end_line) else {
        return ToolOutcome::error("page_not_found", format!("page {page} was not found")).with_retry_tool("pdf_jump");
    };
    if lines.is_empty() {
        return ToolOutcome::error("empty_span", "start_line/end_line resolved to an empty span")
            .with_retry_tool("pdf_read_lines");
    }
    if comment.trim().is_empty() {
        return ToolOutcome::error("comment_required", "comment must be non-empty").with_retry_tool("pdf_annotate");
    }

    let annotation = AnnotationItem {
        id: format!("ann_{}", runtime.annotations.len() + 1),
        page,
        start_line,
        end_line,
        text: lines.join("\n"),
        comment: comment.to_string(),
        summary: summary.map(str::to_string),
        object_type,
        severity,
        created_at: now_rfc3339(),
    };
    runtime.annotations.push(annotation.clone());
    if let Err(e) = runtime.persist_annotations() {
        runtime.annotations.pop();
        return ToolOutcome::error("io_error", e);
    }
    runtime.record_event("annotation_added", [("annotation_id", json!(annotation.id))]);
    let _ = runtime.sync_job_record(|_| {});

    let count = runtime.annotations.len() as u64;
    let min_for_final = runtime.settings.min_annotations_for_final;
    let message = if count < min_for_final {
        format!("{count}/{min_for_final} annotations recorded; keep reviewing the paper")
    } else {
        format!("{count} annotations recorded; minimum for final report reached")
    };

    ToolOutcome::ok(json!({
        "annotation_id": annotation.id,
        "annotation_count": count,
        "recommended_min": 12,
        "recommended_max": 25,
        "min_annotations_for_final": min_for_final,
        "message": message,
    }))
}
