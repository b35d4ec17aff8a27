#![forbid(unsafe_code)]

pub mod atomic;
pub mod error;
pub mod events;
pub mod paths;
pub mod state;

pub use atomic::{read_json, write_bytes_atomic, write_json_atomic, write_text_atomic};
pub use error::StoreError;
pub use events::{append_event, read_events};
pub use paths::{
    agent_prompt_path, annotations_path, content_list_path, events_path, final_report_markdown_path,
    final_report_pdf_path, job_dir, jobs_root, parse_result_raw_path, parsed_markdown_path,
    section_drafts_path, source_pdf_path, state_path, worker_stderr_path, worker_stdout_path,
};
pub use state::JobStore;
