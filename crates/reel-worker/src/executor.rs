//! Queue-driven job executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reel_queue::{DispatchJob, JobQueue};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::Pipeline;
use crate::retry::FailureTracker;

/// What happened to one queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Acknowledged; the job reached a terminal state or was skipped.
    Acked,
    /// Left pending for redelivery.
    Retrying,
    /// Moved to the dead-letter stream.
    DeadLettered,
}

/// Pulls dispatch messages off the queue and runs them one at a time.
pub struct JobExecutor {
    pipeline: Arc<Pipeline>,
    queue: Arc<JobQueue>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(pipeline: Arc<Pipeline>, queue: JobQueue) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            pipeline,
            queue: Arc::new(queue),
            shutdown,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume until [`shutdown`](Self::shutdown) is signalled.
    ///
    /// A job in flight when the signal arrives runs to completion first.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(consumer = %self.consumer_name, "Starting job executor");
        self.queue.init().await?;

        let config = self.pipeline.config();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(5);
        // Claim on the first pass to pick up work left by a previous instance
        let mut last_claim: Option<Instant> = None;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let claim_due = last_claim.map_or(true, |t| t.elapsed() >= config.claim_interval);
            let batch = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                batch = self.next_batch(claim_due) => batch,
            };
            if claim_due {
                last_claim = Some(Instant::now());
            }

            match batch {
                Ok(messages) => {
                    failures.record_success();
                    for (message_id, job) in messages {
                        self.execute_job(&message_id, &job).await;
                    }
                }
                Err(e) => {
                    if failures.record_failure() {
                        error!("Error consuming jobs: {}", e);
                    }
                    let delay = failures.backoff(Duration::from_secs(1), Duration::from_secs(60));
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(consumer = %self.consumer_name, "Job executor stopped");
        Ok(())
    }

    async fn next_batch(&self, claim: bool) -> WorkerResult<Vec<(String, DispatchJob)>> {
        if claim {
            let claimed = self.queue.claim_pending(&self.consumer_name, 1).await?;
            if !claimed.is_empty() {
                info!("Claimed {} pending message(s)", claimed.len());
                return Ok(claimed);
            }
        }

        let block_ms = self.pipeline.config().poll_block.as_millis() as u64;
        Ok(self.queue.consume(&self.consumer_name, block_ms, 1).await?)
    }

    /// Run one message and settle it on the queue.
    pub async fn execute_job(&self, message_id: &str, message: &DispatchJob) -> Outcome {
        let job_id = &message.job_id;
        info!(job_id = %job_id, attempt = message.attempt, "Executing job");

        let result = self.run_message(message).await;

        let outcome = match result {
            Ok(()) => {
                info!(job_id = %job_id, "Job finished");
                Outcome::Acked
            }
            Err(WorkerError::AlreadyFinished(status)) => {
                debug!(job_id = %job_id, %status, "Job already finished, dropping message");
                Outcome::Acked
            }
            Err(e) if !e.is_retryable() => {
                warn!(job_id = %job_id, "Job failed: {}", e);
                Outcome::Acked
            }
            Err(e) => self.retry_or_dead_letter(message_id, message, &e).await,
        };

        if outcome == Outcome::Acked {
            if let Err(e) = self.queue.ack(message_id).await {
                error!(job_id = %job_id, "Failed to ack message: {}", e);
            }
        }
        outcome
    }

    async fn run_message(&self, message: &DispatchJob) -> WorkerResult<()> {
        let job_id = &message.job_id;
        let Some(job) = self.pipeline.jobs().get(job_id).await? else {
            info!(job_id = %job_id, "Job no longer exists, dropping message");
            return Ok(());
        };

        if job.attempt() > message.attempt {
            info!(
                job_id = %job_id,
                message_attempt = message.attempt,
                job_attempt = job.attempt(),
                "Message superseded by a retry, dropping"
            );
            return Ok(());
        }

        let timeout = self.pipeline.config().job_timeout;
        match tokio::time::timeout(timeout, self.pipeline.run(job_id)).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("Pipeline timed out after {}s", timeout.as_secs());
                error!(job_id = %job_id, "{}", message);
                self.pipeline.jobs().fail(job_id, &message).await?;
                Err(WorkerError::job_failed(message))
            }
        }
    }

    async fn retry_or_dead_letter(
        &self,
        message_id: &str,
        message: &DispatchJob,
        error: &WorkerError,
    ) -> Outcome {
        let job_id = &message.job_id;
        let retries = match self.queue.increment_retry(message_id).await {
            Ok(n) => n,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to bump retry count: {}", e);
                u32::MAX
            }
        };
        let max = self.queue.max_retries();

        if retries < max {
            info!(job_id = %job_id, retries, max, "Job will be redelivered: {}", error);
            return Outcome::Retrying;
        }

        warn!(job_id = %job_id, max, "Job exceeded max retries, moving to DLQ");
        if let Err(e) = self.queue.dlq(message_id, message, &error.to_string()).await {
            error!(job_id = %job_id, "Failed to move message to DLQ: {}", e);
        }
        let reason = format!("Gave up after {} attempts: {}", max, error);
        if let Err(e) = self.pipeline.jobs().fail(job_id, &reason).await {
            error!(job_id = %job_id, "Failed to mark job failed: {}", e);
        }
        Outcome::DeadLettered
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
