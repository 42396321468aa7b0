//! Dispatch payload.

use chrono::{DateTime, Utc};
use reel_models::JobId;
use serde::{Deserialize, Serialize};

/// Request for a worker to run one job's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchJob {
    pub job_id: JobId,
    /// 1 for the first run, incremented by each user retry
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn first_attempt() -> u32 {
    1
}

impl DispatchJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            attempt: 1,
            created_at: Utc::now(),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
        self
    }

    /// Key used to reject the same dispatch being queued twice.
    pub fn idempotency_key(&self) -> String {
        format!("dispatch:{}:{}", self.job_id, self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_varies_by_attempt() {
        let id = JobId::from_string("abc");
        let first = DispatchJob::new(id.clone());
        let retry = DispatchJob::new(id).with_attempt(2);
        assert_eq!(first.idempotency_key(), "dispatch:abc:1");
        assert_ne!(first.idempotency_key(), retry.idempotency_key());
    }

    #[test]
    fn test_attempt_defaults_to_one() {
        let job: DispatchJob = serde_json::from_str(r#"{"job_id":"abc"}"#).unwrap();
        assert_eq!(job.attempt, 1);
    }
}
