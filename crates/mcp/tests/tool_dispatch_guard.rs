use std::path::PathBuf;

use review_core::{JobId, JobRecord, Settings};
use review_mcp::dispatch::dispatch;
use review_mcp::runtime::ToolRuntime;
use review_store::{JobStore, write_text_atomic};
use serde_json::json;

fn temp_data_dir() -> PathBuf {
    std::env::temp_dir().join(format!("review_mcp_dispatch_test_{}", JobId::new()))
}

fn setup(settings: Settings) -> (ToolRuntime, PathBuf) {
    let data_dir = temp_data_dir();
    let job_id = JobId::new();
    let store = JobStore::new(data_dir.clone());
    let job_dir = store.job_dir(job_id);

    let markdown = "## Page 1\nThe experiments show strong results.\nRelated work is thin.\n";
    write_text_atomic(&review_store::parsed_markdown_path(&job_dir), markdown).unwrap();

    let record = JobRecord::new(job_id, "Paper".to_string(), "paper.pdf".to_string(), "2026-07-28T00:00:00Z");
    store.save(&record).unwrap();

    let runtime = ToolRuntime::load(job_id, data_dir.clone(), settings).unwrap();
    (runtime, data_dir)
}

fn gated_settings() -> Settings {
    let mut settings = Settings::default();
    settings.enable_final_gates = true;
    settings.min_paper_search_calls_for_pdf_annotate = 1;
    settings.min_paper_search_calls_for_final = 1;
    settings.min_distinct_paper_queries_for_final = 1;
    settings.min_annotations_for_final = 1;
    settings.min_english_words_for_final = 0;
    settings.min_chinese_chars_for_final = 0;
    settings
}

#[test]
fn pdf_annotate_is_blocked_until_paper_search_gate_is_satisfied() {
    let (mut runtime, data_dir) = setup(gated_settings());

    let blocked = dispatch(
        &mut runtime,
        "pdf_annotate",
        &json!({ "page": 1, "start_line": 1, "end_line": 1, "comment": "needs a citation" }),
    );
    assert_eq!(blocked["status"], "error");
    assert_eq!(blocked["reason"], "paper_search_calls_not_met");

    // Simulate a completed paper_search call directly on the job record rather than going
    // through the network-backed adapter, keeping this test hermetic.
    runtime
        .sync_job_record(|job| {
            job.usage.paper_search.record_call(true, 2);
            job.usage.paper_search.record_signature("transformer attention");
        })
        .unwrap();

    let allowed = dispatch(
        &mut runtime,
        "pdf_annotate",
        &json!({ "page": 1, "start_line": 1, "end_line": 1, "comment": "needs a citation" }),
    );
    assert_eq!(allowed["status"], "ok", "unexpected response: {allowed}");
    assert_eq!(allowed["annotation_count"], 1);

    let _ = std::fs::remove_dir_all(&data_dir);
}

#[test]
fn final_markdown_write_reports_missing_sections_before_commit_gates_run() {
    let (mut runtime, data_dir) = setup(gated_settings());

    let partial = dispatch(
        &mut runtime,
        "review_final_markdown_write",
        &json!({ "section_id": "summary", "section_content": "A concise summary of the paper." }),
    );
    assert_eq!(partial["status"], "partial");
    assert_eq!(partial["missing_sections"].as_array().unwrap().contains(&json!("strengths")), true);

    let _ = std::fs::remove_dir_all(&data_dir);
}

#[test]
fn unknown_tool_name_returns_error_status() {
    let (mut runtime, data_dir) = setup(Settings::default());
    let response = dispatch(&mut runtime, "not_a_real_tool", &json!({}));
    assert_eq!(response["status"], "error");
    assert_eq!(response["reason"], "unknown_tool");
    let _ = std::fs::remove_dir_all(&data_dir);
}
