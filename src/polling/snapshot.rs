use crate::domain::{PollingDataset, SchemaError};
use crate::pikvm::ApiError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Why a cycle produced no dataset.
#[derive(Error, Clone, PartialEq, Debug)]
pub enum CycleError {
    #[error("authentication failed")]
    Unauthorized,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("connection failed, {0}")]
    Transport(String),
    #[error("malformed response, {0}")]
    Malformed(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl CycleError {
    /// Transient errors are retried within the cycle; the others cannot be fixed by retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, CycleError::Status(_) | CycleError::Transport(_))
    }
}

impl From<ApiError> for CycleError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized => CycleError::Unauthorized,
            ApiError::Status(status) => CycleError::Status(status.as_u16()),
            ApiError::Transport(e) => CycleError::Transport(e.to_string()),
            ApiError::Decode(e) => CycleError::Malformed(e.to_string()),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum PollStatus {
    /// No cycle has completed yet.
    Pending,
    Fresh,
    /// The last cycle ran out of attempts on transient errors.
    Stale,
    Failed(CycleError),
}

/// What subscribers see after every cycle. The dataset is the last successful one and is kept
/// when a later cycle fails.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub dataset: Option<Arc<PollingDataset>>,
    pub status: PollStatus,
    pub last_success: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn pending() -> Self {
        Snapshot {
            dataset: None,
            status: PollStatus::Pending,
            last_success: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.status == PollStatus::Fresh
    }

    /// The dataset, but only when the last cycle refreshed it.
    pub fn fresh_dataset(&self) -> Option<&PollingDataset> {
        self.dataset.as_deref().filter(|_| self.is_fresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use rstest::rstest;

    #[rstest]
    #[case(ApiError::Unauthorized, CycleError::Unauthorized, false)]
    #[case(ApiError::Status(StatusCode::SERVICE_UNAVAILABLE), CycleError::Status(503), true)]
    fn api_errors_map_to_cycle_errors(#[case] error: ApiError, #[case] expected: CycleError, #[case] transient: bool) {
        let error = CycleError::from(error);

        assert_eq!(error, expected);
        assert_eq!(error.is_transient(), transient);
    }

    #[test]
    fn schema_errors_are_not_transient() {
        assert!(!CycleError::Schema(SchemaError::MissingResult("msd")).is_transient());
        assert!(!CycleError::Malformed("expected value".to_string()).is_transient());
    }

    #[test]
    fn stale_snapshots_hide_the_dataset() {
        let snapshot = Snapshot {
            dataset: Some(Arc::new(PollingDataset::default())),
            status: PollStatus::Stale,
            last_success: Some(Utc::now()),
        };

        assert!(snapshot.fresh_dataset().is_none());
        assert!(snapshot.dataset.is_some());
    }
}
