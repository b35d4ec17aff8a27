#![forbid(unsafe_code)]

mod bin_detect;
mod controller;
mod executors;
mod mcp_config;
mod parse_adapter;
mod prompt;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::Duration;

use review_core::diagnostics::now_rfc3339;
use review_core::{JobId, JobRecord, Settings};
use review_store::{JobStore, append_event};
use serde_json::{Value, json};

fn usage() -> &'static str {
    "review_runner — long-running paper review orchestrator\n\n\
USAGE:\n\
  review_runner submit --pdf PATH [--title TITLE] [--wait-seconds N]\n\
  review_runner status --job-id ID\n\
  review_runner result --job-id ID [--format md|pdf|all]\n\
  review_runner watch --job-id ID [--interval S] [--timeout S]\n\n\
All commands print UTF-8 JSON to stdout, except `result --format md` which prints the raw\n\
final report markdown. Exit code 0 on success (including `not_ready`), 2 on argument or\n\
lookup errors.\n"
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn arg_error(message: impl AsRef<str>) -> ! {
    eprintln!("{}\n\n{}", message.as_ref(), usage());
    std::process::exit(2);
}

fn parse_job_id(raw: &str) -> JobId {
    JobId::parse(raw).unwrap_or_else(|e| arg_error(e.to_string()))
}

fn print_json(value: &Value) {
    println!("{value}");
}

fn job_status_json(record: &JobRecord) -> Value {
    json!({
        "job_id": record.id.to_string(),
        "status": record.status.as_str(),
        "title": record.title,
        "message": record.message,
        "error": record.error,
        "final_report_ready": record.final_report_ready,
        "pdf_ready": record.pdf_ready,
        "annotation_count": record.annotation_count,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "usage": {
            "paper_search_calls": record.usage.paper_search.total_calls,
            "paper_search_distinct_queries": record.usage.paper_search.distinct_queries,
            "tool_calls": record.usage.tool.total_calls,
        },
        "artifacts": {
            "parsed_markdown": record.artifacts.parsed_markdown_path,
            "final_markdown": record.artifacts.final_markdown_path,
            "report_pdf": record.artifacts.report_pdf_path,
        },
    })
}

fn load_or_exit(store: &JobStore, job_id: JobId) -> JobRecord {
    match store.load(job_id) {
        Ok(Some(record)) => record,
        Ok(None) => arg_error(format!("no such job: {job_id}")),
        Err(e) => arg_error(e.to_string()),
    }
}

fn cmd_submit(args: &[String], settings: &Settings) {
    let mut pdf_path: Option<PathBuf> = None;
    let mut title: Option<String> = None;
    let mut wait_seconds: u64 = settings.submit_default_wait_seconds;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--pdf" => {
                i += 1;
                pdf_path = Some(PathBuf::from(args.get(i).unwrap_or_else(|| arg_error("--pdf requires PATH"))));
            }
            "--title" => {
                i += 1;
                title = Some(args.get(i).unwrap_or_else(|| arg_error("--title requires TITLE")).clone());
            }
            "--wait-seconds" => {
                i += 1;
                wait_seconds = args
                    .get(i)
                    .unwrap_or_else(|| arg_error("--wait-seconds requires N"))
                    .parse()
                    .unwrap_or_else(|_| arg_error("--wait-seconds must be an integer"));
            }
            other => arg_error(format!("unknown submit argument: {other}")),
        }
        i += 1;
    }

    let pdf_path = pdf_path.unwrap_or_else(|| arg_error("--pdf is required"));
    let bytes = std::fs::read(&pdf_path).unwrap_or_else(|e| arg_error(format!("cannot read {}: {e}", pdf_path.display())));
    if bytes.len() as u64 > settings.max_pdf_bytes {
        arg_error(format!("pdf exceeds max_pdf_bytes ({} > {})", bytes.len(), settings.max_pdf_bytes));
    }

    let title = title.unwrap_or_else(|| {
        pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    });
    let source_name = pdf_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "source.pdf".to_string());

    let store = JobStore::new(settings.data_dir.clone());
    store.ensure_jobs_root().unwrap_or_else(|e| arg_error(e.to_string()));

    let job_id = JobId::new();
    let now = now_rfc3339();
    let record = JobRecord::new(job_id, title, source_name, &now);
    store.save(&record).unwrap_or_else(|e| arg_error(e.to_string()));

    let dir = store.job_dir(job_id);
    review_store::write_bytes_atomic(&review_store::source_pdf_path(&dir), &bytes).unwrap_or_else(|e| arg_error(e.to_string()));
    let _ = append_event(&dir, "created", [("title", json!(record.title))]);

    spawn_worker(&dir, job_id, settings);

    if wait_seconds > 0 {
        let deadline = std::time::Instant::now() + Duration::from_secs(wait_seconds);
        let poll = Duration::from_secs_f64(settings.submit_poll_interval_seconds.max(0.2));
        loop {
            let record = load_or_exit(&store, job_id);
            if record.status.is_terminal() || std::time::Instant::now() >= deadline {
                print_json(&job_status_json(&record));
                return;
            }
            sleep(poll);
        }
    }

    print_json(&job_status_json(&load_or_exit(&store, job_id)));
}

/// Re-invokes this same binary with the internal `_run-job` subcommand as a background
/// worker, its stdout/stderr appended to the job's worker log files. The submitting process
/// never waits on it; a crashed or killed worker leaves the job mid-state for the next
/// `_run-job` invocation (or a supervisor) to resume.
fn spawn_worker(dir: &std::path::Path, job_id: JobId, settings: &Settings) {
    let exe = std::env::current_exe().unwrap_or_else(|e| arg_error(format!("cannot resolve own executable: {e}")));
    let stdout_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(review_store::worker_stdout_path(dir))
        .unwrap_or_else(|e| arg_error(e.to_string()));
    let stderr_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(review_store::worker_stderr_path(dir))
        .unwrap_or_else(|e| arg_error(e.to_string()));

    let child = Command::new(exe)
        .arg("_run-job")
        .arg("--job-id")
        .arg(job_id.to_string())
        .env("DATA_DIR", settings.data_dir.to_string_lossy().to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()
        .unwrap_or_else(|e| arg_error(format!("failed to spawn worker: {e}")));

    let _ = append_event(dir, "worker_spawned", [("pid", json!(child.id()))]);
}

fn cmd_status(args: &[String], settings: &Settings) {
    let job_id = required_job_id(args);
    let store = JobStore::new(settings.data_dir.clone());
    print_json(&job_status_json(&load_or_exit(&store, job_id)));
}

fn cmd_run_job(args: &[String], settings: &Settings) {
    let job_id = required_job_id(args);
    let store = JobStore::new(settings.data_dir.clone());
    if let Err(e) = controller::run(&store, job_id, settings) {
        eprintln!("review_runner: job {job_id} ended with an unrecoverable controller error: {e}");
        std::process::exit(1);
    }
}

fn cmd_result(args: &[String], settings: &Settings) {
    let mut job_id: Option<JobId> = None;
    let mut format = "md".to_string();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--job-id" => {
                i += 1;
                job_id = Some(parse_job_id(args.get(i).unwrap_or_else(|| arg_error("--job-id requires ID"))));
            }
            "--format" => {
                i += 1;
                format = args.get(i).unwrap_or_else(|| arg_error("--format requires md|pdf|all")).clone();
            }
            other => arg_error(format!("unknown result argument: {other}")),
        }
        i += 1;
    }
    let job_id = job_id.unwrap_or_else(|| arg_error("--job-id is required"));
    let store = JobStore::new(settings.data_dir.clone());
    let record = load_or_exit(&store, job_id);

    match format.as_str() {
        "md" => {
            let Some(path) = record.artifacts.final_markdown_path.as_deref() else {
                print_json(&json!({ "status": "not_ready" }));
                return;
            };
            match std::fs::read_to_string(path) {
                Ok(text) => print!("{text}"),
                Err(_) => print_json(&json!({ "status": "not_ready" })),
            }
        }
        "pdf" => {
            if let Some(path) = record.artifacts.report_pdf_path.as_deref() {
                print_json(&json!({ "status": "ready", "pdf_path": path }));
            } else {
                print_json(&json!({ "status": "not_ready" }));
            }
        }
        "all" => {
            let markdown = record
                .artifacts
                .final_markdown_path
                .as_deref()
                .and_then(|p| std::fs::read_to_string(p).ok());
            print_json(&json!({
                "status": if record.final_report_ready { "ready" } else { "not_ready" },
                "markdown": markdown,
                "pdf_path": record.artifacts.report_pdf_path,
                "job": job_status_json(&record),
            }));
        }
        other => arg_error(format!("unknown --format: {other} (expected md|pdf|all)")),
    }
}

fn cmd_watch(args: &[String], settings: &Settings) {
    let mut job_id: Option<JobId> = None;
    let mut interval_seconds: f64 = 2.0;
    let mut timeout_seconds: u64 = 3600;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--job-id" => {
                i += 1;
                job_id = Some(parse_job_id(args.get(i).unwrap_or_else(|| arg_error("--job-id requires ID"))));
            }
            "--interval" => {
                i += 1;
                interval_seconds = args
                    .get(i)
                    .unwrap_or_else(|| arg_error("--interval requires SECONDS"))
                    .parse()
                    .unwrap_or_else(|_| arg_error("--interval must be a number"));
            }
            "--timeout" => {
                i += 1;
                timeout_seconds = args
                    .get(i)
                    .unwrap_or_else(|| arg_error("--timeout requires SECONDS"))
                    .parse()
                    .unwrap_or_else(|_| arg_error("--timeout must be an integer"));
            }
            other => arg_error(format!("unknown watch argument: {other}")),
        }
        i += 1;
    }
    let job_id = job_id.unwrap_or_else(|| arg_error("--job-id is required"));
    let store = JobStore::new(settings.data_dir.clone());
    let deadline = std::time::Instant::now() + Duration::from_secs(timeout_seconds);
    let poll = Duration::from_secs_f64(interval_seconds.max(0.2));

    loop {
        let record = load_or_exit(&store, job_id);
        if record.status.is_terminal() {
            print_json(&job_status_json(&record));
            return;
        }
        if std::time::Instant::now() >= deadline {
            print_json(&json!({ "status": "not_ready", "job": job_status_json(&record) }));
            return;
        }
        sleep(poll);
    }
}

fn required_job_id(args: &[String]) -> JobId {
    let mut i = 0usize;
    while i < args.len() {
        if args[i] == "--job-id" {
            i += 1;
            return parse_job_id(args.get(i).unwrap_or_else(|| arg_error("--job-id requires ID")));
        }
        i += 1;
    }
    arg_error("--job-id is required")
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }

    let settings = Settings::from_env();
    let (command, rest) = args.split_first().expect("checked non-empty above");

    match command.as_str() {
        "submit" => cmd_submit(rest, &settings),
        "status" => cmd_status(rest, &settings),
        "result" => cmd_result(rest, &settings),
        "watch" => cmd_watch(rest, &settings),
        "_run-job" => cmd_run_job(rest, &settings),
        other => arg_error(format!("unknown command: {other}")),
    }
}
