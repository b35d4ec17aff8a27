use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, universally-unique identifier for a review job.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(token: &str) -> Result<Self, JobIdError> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(JobIdError::Empty);
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|_| JobIdError::Malformed(trimmed.to_string()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobIdError {
    Empty,
    Malformed(String),
}

impl fmt::Display for JobIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobIdError::Empty => write!(f, "job_id is required"),
            JobIdError::Malformed(token) => write!(f, "invalid job_id: {token}"),
        }
    }
}

impl std::error::Error for JobIdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let id = JobId::new();
        let parsed = JobId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert_eq!(JobId::parse("").unwrap_err(), JobIdError::Empty);
        assert!(matches!(
            JobId::parse("not-a-uuid"),
            Err(JobIdError::Malformed(_))
        ));
    }
}
