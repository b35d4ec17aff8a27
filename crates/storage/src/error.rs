use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidJobId(review_core::JobIdError),
    JobNotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {err}"),
            StoreError::Json(err) => write!(f, "json error: {err}"),
            StoreError::InvalidJobId(err) => write!(f, "{err}"),
            StoreError::JobNotFound(id) => write!(f, "job not found: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}

impl From<review_core::JobIdError> for StoreError {
    fn from(err: review_core::JobIdError) -> Self {
        StoreError::InvalidJobId(err)
    }
}
