use std::path::PathBuf;

use review_core::sections::REQUIRED_SECTIONS;
use review_core::{JobId, JobRecord, Settings};
use review_mcp::dispatch::dispatch;
use review_mcp::runtime::ToolRuntime;
use review_store::JobStore;
use serde_json::json;

fn temp_data_dir() -> PathBuf {
    std::env::temp_dir().join(format!("review_mcp_section_test_{}", JobId::new()))
}

fn setup() -> (ToolRuntime, PathBuf) {
    let data_dir = temp_data_dir();
    let job_id = JobId::new();
    let store = JobStore::new(data_dir.clone());
    store.job_dir(job_id);

    let record = JobRecord::new(job_id, "Paper".to_string(), "paper.pdf".to_string(), "2026-07-28T00:00:00Z");
    store.save(&record).unwrap();

    let runtime = ToolRuntime::load(job_id, data_dir.clone(), Settings::default()).unwrap();
    (runtime, data_dir)
}

#[test]
fn writing_every_required_section_one_at_a_time_commits_the_final_report() {
    let (mut runtime, data_dir) = setup();

    for (index, spec) in REQUIRED_SECTIONS.iter().enumerate() {
        let content = format!(
            "This section discusses {} in enough words to clear the length floor comfortably.",
            spec.title
        );
        let response = dispatch(
            &mut runtime,
            "review_final_markdown_write",
            &json!({ "section_id": spec.id, "section_content": content }),
        );

        let is_last = index == REQUIRED_SECTIONS.len() - 1;
        if is_last {
            assert_eq!(response["status"], "ok", "final write failed: {response}");
            assert_eq!(response["task_completed"], true);
        } else {
            assert_eq!(response["status"], "partial", "unexpected response at {}: {response}", spec.id);
            assert!(!response["missing_sections"].as_array().unwrap().contains(&json!(spec.id)));
        }
    }

    let final_markdown_path = review_store::final_report_markdown_path(&runtime.job_dir);
    assert!(final_markdown_path.exists());
    let persisted = std::fs::read_to_string(&final_markdown_path).unwrap();
    for spec in REQUIRED_SECTIONS {
        assert!(persisted.contains(&format!("## {}", spec.title)), "missing heading for {}", spec.id);
    }

    let record = runtime.load_job_record().unwrap();
    assert!(record.final_report_ready);
    assert_eq!(record.artifacts.final_markdown_path.as_deref(), Some("final_report.md"));

    let _ = std::fs::remove_dir_all(&data_dir);
}

#[test]
fn re_writing_after_commit_is_idempotent_and_does_not_touch_the_persisted_report() {
    let (mut runtime, data_dir) = setup();

    for spec in REQUIRED_SECTIONS {
        let content = format!("Discussion of {} with sufficient detail to pass validation.", spec.title);
        dispatch(&mut runtime, "review_final_markdown_write", &json!({ "section_id": spec.id, "section_content": content }));
    }
    assert!(!runtime.final_markdown_text.is_empty());
    let persisted_before = runtime.final_markdown_text.clone();

    let after_commit = dispatch(
        &mut runtime,
        "review_final_markdown_write",
        &json!({ "section_id": "summary", "section_content": "an attempted overwrite" }),
    );
    assert_eq!(after_commit["status"], "ok");
    assert_eq!(after_commit["final_report_persisted"], true);
    assert_eq!(runtime.final_markdown_text, persisted_before);

    let _ = std::fs::remove_dir_all(&data_dir);
}
