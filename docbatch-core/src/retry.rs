//! Bounded retries around a single [`UploadClient`].
//!
//! Every failure is retried the same way, whether the repository rejected the
//! document or the network dropped. The attempt ceiling is the only bound.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::contract::{OutcomeStatus, UploadClient, UploadOutcome, UploadTask};

/// 1 initial attempt + 3 retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Turns an [`UploadTask`] into exactly one terminal [`UploadOutcome`].
#[derive(Clone)]
pub struct RetryingUploader {
    client: Arc<dyn UploadClient>,
    policy: RetryPolicy,
}

impl RetryingUploader {
    pub fn new(client: Arc<dyn UploadClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn upload(&self, task: UploadTask) -> UploadOutcome {
        let name = task.file_name();
        let mut attempt = 0;
        let mut last_failure = None;

        while attempt < self.policy.max_attempts {
            if attempt > 0 && !self.policy.delay.is_zero() {
                tokio::time::sleep(self.policy.delay).await;
            }
            attempt += 1;

            match self.client.upload(&task.document, &task.record).await {
                Ok(receipt) => {
                    info!(document = %name, attempt, status = receipt.status, "Upload accepted");
                    return UploadOutcome {
                        status: OutcomeStatus::Succeeded,
                        record: task.record,
                        document: task.document,
                        batch_folder: task.batch_folder,
                        attempts: attempt,
                        last_failure: None,
                    };
                }
                Err(failure) => {
                    warn!(
                        document = %name,
                        attempt,
                        attempts_left = self.policy.max_attempts - attempt,
                        error = %failure,
                        "Upload attempt failed"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        error!(document = %name, attempts = attempt, "Upload failed after all attempts");
        UploadOutcome {
            status: OutcomeStatus::FailedAfterRetries,
            record: task.record,
            document: task.document,
            batch_folder: task.batch_folder,
            attempts: attempt,
            last_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockUploadClient, UploadReceipt};
    use crate::error::UploadFailure;
    use crate::metadata::MetadataRecord;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn task() -> UploadTask {
        UploadTask {
            document: PathBuf::from("/batch/Documents/A.pdf"),
            record: MetadataRecord {
                document_id: "A".into(),
                ..Default::default()
            },
            batch_folder: PathBuf::from("/batch"),
        }
    }

    #[tokio::test]
    async fn first_attempt_success_is_terminal() {
        let mut client = MockUploadClient::new();
        client
            .expect_upload()
            .times(1)
            .returning(|_, _| Ok(UploadReceipt { status: 201 }));

        let uploader = RetryingUploader::new(Arc::new(client), RetryPolicy::default());
        let outcome = uploader.upload(task()).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.last_failure.is_none());
    }

    #[tokio::test]
    async fn persistent_failure_stops_at_four_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let mut client = MockUploadClient::new();
        client.expect_upload().returning(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(UploadFailure::Status {
                code: 500,
                body: "boom".into(),
            })
        });

        let uploader = RetryingUploader::new(Arc::new(client), RetryPolicy::default());
        let outcome = uploader.upload(task()).await;

        assert_eq!(outcome.status, OutcomeStatus::FailedAfterRetries);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(
            outcome.last_failure,
            Some(UploadFailure::Status { code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn success_on_last_attempt_counts_as_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let mut client = MockUploadClient::new();
        client.expect_upload().returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(UploadFailure::Transport("connection reset".into()))
            } else {
                Ok(UploadReceipt { status: 200 })
            }
        });

        let uploader = RetryingUploader::new(Arc::new(client), RetryPolicy::default());
        let outcome = uploader.upload(task()).await;

        assert_eq!(outcome.status, OutcomeStatus::Succeeded);
        assert_eq!(outcome.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_applied_between_attempts_only() {
        let mut client = MockUploadClient::new();
        client
            .expect_upload()
            .times(2)
            .returning(|_, _| Err(UploadFailure::Timeout));

        let policy = RetryPolicy::new(2, Duration::from_secs(5));
        let uploader = RetryingUploader::new(Arc::new(client), policy);

        let started = tokio::time::Instant::now();
        let outcome = uploader.upload(task()).await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
