use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::JobId;
use crate::status::JobStatus;
use crate::usage::UsageSnapshot;

/// Role -> on-disk path, for every artifact the job may produce. A path is only ever present
/// once the file it names exists on disk (I6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pdf_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_markdown_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_list_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_markdown_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_pdf_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_prompt_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub title: String,
    pub source_pdf_name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub usage: UsageSnapshot,
    #[serde(default)]
    pub annotation_count: u64,
    #[serde(default)]
    pub final_report_ready: bool,
    #[serde(default)]
    pub pdf_ready: bool,
    #[serde(default)]
    pub artifacts: JobArtifacts,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl JobRecord {
    pub fn new(id: JobId, title: String, source_pdf_name: String, now: &str) -> Self {
        JobRecord {
            id,
            status: JobStatus::Queued,
            title,
            source_pdf_name,
            message: String::new(),
            error: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
            usage: UsageSnapshot::default(),
            annotation_count: 0,
            final_report_ready: false,
            pdf_ready: false,
            artifacts: JobArtifacts::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Any of the persist-marker signals used by crash recovery to decide whether a job that
    /// threw after apparent success should still be completed rather than failed.
    pub fn has_persist_marker(&self) -> bool {
        self.final_report_ready
            || self.artifacts.final_markdown_path.is_some()
            || self.metadata.contains_key("final_report_source")
    }

    pub fn transition_to(&mut self, next: JobStatus, now: &str) -> Result<(), String> {
        if !self.status.can_advance_to(next) {
            return Err(format!(
                "illegal transition {} -> {}",
                self.status, next
            ));
        }
        self.status = next;
        self.updated_at = now.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_queued_without_persist_marker() {
        let job = JobRecord::new(JobId::new(), "Title".to_string(), "paper.pdf".to_string(), "now");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.has_persist_marker());
    }

    #[test]
    fn persist_marker_recognizes_any_of_the_three_signals() {
        let mut job = JobRecord::new(JobId::new(), "T".to_string(), "p.pdf".to_string(), "now");
        assert!(!job.has_persist_marker());
        job.final_report_ready = true;
        assert!(job.has_persist_marker());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut job = JobRecord::new(JobId::new(), "T".to_string(), "p.pdf".to_string(), "now");
        job.transition_to(JobStatus::AgentRunning, "t1").unwrap();
        assert!(job.transition_to(JobStatus::PdfParsing, "t2").is_err());
    }
}
