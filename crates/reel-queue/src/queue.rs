//! Job queue using Redis Streams.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{QueueError, QueueResult};
use crate::job::DispatchJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Prefix for dedup and retry counter keys
    pub key_prefix: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Idle time after which another worker may claim a message
    pub visibility_timeout: Duration,
    /// How long a dispatch is remembered for deduplication
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "reel:jobs".to_string(),
            consumer_group: "reel:workers".to_string(),
            dlq_stream_name: "reel:dlq".to_string(),
            key_prefix: "reel".to_string(),
            max_retries: 2,
            visibility_timeout: Duration::from_secs(1800),
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let env_or = |name: &str, default: String| std::env::var(name).unwrap_or(default);
        let num = |name: &str| -> Option<u64> { std::env::var(name).ok().and_then(|s| s.parse().ok()) };

        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            stream_name: env_or("QUEUE_STREAM", defaults.stream_name),
            consumer_group: env_or("QUEUE_CONSUMER_GROUP", defaults.consumer_group),
            dlq_stream_name: env_or("QUEUE_DLQ_STREAM", defaults.dlq_stream_name),
            key_prefix: defaults.key_prefix,
            max_retries: num("QUEUE_MAX_RETRIES")
                .map(|n| n as u32)
                .unwrap_or(defaults.max_retries),
            visibility_timeout: num("QUEUE_VISIBILITY_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
            dedup_ttl: defaults.dedup_ttl,
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn dedup_key(&self, job: &DispatchJob) -> String {
        format!("{}:dedup:{}", self.config.key_prefix, job.idempotency_key())
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.config.key_prefix, message_id)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Add a job to the stream, rejecting a repeat of the same dispatch.
    pub async fn enqueue(&self, job: &DispatchJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();

        // SET NX claims the key atomically, so two racing API calls cannot both enqueue
        let claimed: Option<String> = redis::cmd("SET")
            .arg(self.dedup_key(job))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            warn!("Duplicate dispatch rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        info!(job_id = %job.job_id, attempt = job.attempt, "Enqueued job with message ID {}", message_id);
        Ok(message_id)
    }

    /// Acknowledge a message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        let _: () = conn.del(self.retry_key(message_id)).await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, message_id: &str, job: &DispatchJob, error: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(message_id).await?;

        warn!(job_id = %job.job_id, "Moved job to DLQ: {}", error);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    /// Read new messages for this consumer, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, DispatchJob)>> {
        let mut conn = self.connection().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut jobs = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(job) = self.decode_entry(&entry).await {
                    debug!(job_id = %job.job_id, "Consumed job from stream");
                    jobs.push((entry.id, job));
                }
            }
        }

        Ok(jobs)
    }

    /// Claim messages left pending by crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, DispatchJob)>> {
        let mut conn = self.connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        // XAUTOCLAIM replies [next-cursor, entries] (plus deleted ids on Redis 7)
        let reply: Vec<redis::Value> = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.visibility_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        let claimed: redis::streams::StreamRangeReply = match reply.get(1) {
            Some(entries) => redis::from_redis_value(entries)?,
            None => return Ok(Vec::new()),
        };

        let mut jobs = Vec::new();
        for entry in claimed.ids {
            if let Some(job) = self.decode_entry(&entry).await {
                info!(job_id = %job.job_id, "Claimed pending job from stream");
                jobs.push((entry.id, job));
            }
        }

        Ok(jobs)
    }

    /// Parse a stream entry, acking it away if the payload is malformed.
    async fn decode_entry(&self, entry: &redis::streams::StreamId) -> Option<DispatchJob> {
        let payload = match entry.map.get("job") {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            Some(redis::Value::SimpleString(s)) => s.clone(),
            _ => {
                warn!(message_id = %entry.id, "Stream entry has no job payload");
                self.ack(&entry.id).await.ok();
                return None;
            }
        };

        match serde_json::from_str::<DispatchJob>(&payload) {
            Ok(job) => Some(job),
            Err(e) => {
                warn!(message_id = %entry.id, "Failed to parse job payload: {}", e);
                self.ack(&entry.id).await.ok();
                None
            }
        }
    }

    /// Current retry count for a message.
    pub async fn retry_count(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;
        let count: Option<u32> = conn.get(self.retry_key(message_id)).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment the retry count for a message, returning the new value.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.connection().await?;

        let key = self.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Ping Redis.
    pub async fn check_connectivity(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for JobQueue {
    async fn dispatch(&self, job: &DispatchJob) -> QueueResult<String> {
        self.enqueue(job).await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::JobId;

    #[test]
    fn test_keys() {
        let queue = JobQueue::new(QueueConfig::default()).unwrap();
        let job = DispatchJob::new(JobId::from_string("abc")).with_attempt(3);
        assert_eq!(queue.dedup_key(&job), "reel:dedup:dispatch:abc:3");
        assert_eq!(queue.retry_key("1-0"), "reel:retry:1-0");
    }
}
