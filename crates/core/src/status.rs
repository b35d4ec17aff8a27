use serde::{Deserialize, Serialize};

/// Position of a job in the lifecycle state graph (`queued` -> ... -> `completed`/`failed`).
///
/// Only `Completed` and `Failed` are terminal; `status` otherwise advances monotonically
/// through the remaining variants in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    PdfUploading,
    PdfParsing,
    AgentRunning,
    FinalPersisting,
    PdfExporting,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::PdfUploading => "pdf_uploading",
            JobStatus::PdfParsing => "pdf_parsing",
            JobStatus::AgentRunning => "agent_running",
            JobStatus::FinalPersisting => "final_persisting",
            JobStatus::PdfExporting => "pdf_exporting",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Ordinal used to check that a transition only ever moves forward (or to `Failed`).
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::PdfUploading => 1,
            JobStatus::PdfParsing => 2,
            JobStatus::AgentRunning => 3,
            JobStatus::FinalPersisting => 4,
            JobStatus::PdfExporting => 5,
            JobStatus::Completed => 6,
            JobStatus::Failed => 7,
        }
    }

    /// Whether moving from `self` to `next` respects the monotonic state graph (I1).
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Failed || next.rank() > self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(JobStatus::Queued.can_advance_to(JobStatus::PdfUploading));
        assert!(JobStatus::PdfParsing.can_advance_to(JobStatus::AgentRunning));
    }

    #[test]
    fn backward_transitions_are_rejected() {
        assert!(!JobStatus::AgentRunning.can_advance_to(JobStatus::PdfParsing));
    }

    #[test]
    fn any_non_terminal_state_can_fail() {
        assert!(JobStatus::PdfUploading.can_advance_to(JobStatus::Failed));
        assert!(JobStatus::AgentRunning.can_advance_to(JobStatus::Failed));
    }

    #[test]
    fn terminal_states_never_advance() {
        assert!(!JobStatus::Completed.can_advance_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_advance_to(JobStatus::Completed));
    }
}
