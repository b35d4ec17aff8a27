use std::path::{Path, PathBuf};

use review_core::JobId;

pub fn jobs_root(data_dir: &Path) -> PathBuf {
    data_dir.join("jobs")
}

pub fn job_dir(data_dir: &Path, job_id: JobId) -> PathBuf {
    jobs_root(data_dir).join(job_id.to_string())
}

pub fn state_path(job_dir: &Path) -> PathBuf {
    job_dir.join("job.json")
}

pub fn events_path(job_dir: &Path) -> PathBuf {
    job_dir.join("events.jsonl")
}

pub fn source_pdf_path(job_dir: &Path) -> PathBuf {
    job_dir.join("source.pdf")
}

pub fn parsed_markdown_path(job_dir: &Path) -> PathBuf {
    job_dir.join("mineru_full.md")
}

pub fn content_list_path(job_dir: &Path) -> PathBuf {
    job_dir.join("mineru_content_list.json")
}

pub fn annotations_path(job_dir: &Path) -> PathBuf {
    job_dir.join("annotations.json")
}

pub fn section_drafts_path(job_dir: &Path) -> PathBuf {
    job_dir.join("section_drafts.json")
}

pub fn final_report_markdown_path(job_dir: &Path) -> PathBuf {
    job_dir.join("final_report.md")
}

pub fn final_report_pdf_path(job_dir: &Path) -> PathBuf {
    job_dir.join("final_report.pdf")
}

pub fn agent_prompt_path(job_dir: &Path) -> PathBuf {
    job_dir.join("agent_prompt.txt")
}

pub fn parse_result_raw_path(job_dir: &Path) -> PathBuf {
    job_dir.join("mineru_result_raw.json")
}

pub fn worker_stdout_path(job_dir: &Path) -> PathBuf {
    job_dir.join("worker.stdout.log")
}

pub fn worker_stderr_path(job_dir: &Path) -> PathBuf {
    job_dir.join("worker.stderr.log")
}
