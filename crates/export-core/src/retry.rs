//! Batch delivery with bounded retry on "unknown topic" failures.

use crate::config::RetryPolicy;
use crate::error::{ExportError, Result};
use crate::event::{ExportEvent, ExportObserver};
use crate::sink::{DeliveryError, Message, MessageSink, TopicReadiness};
use tracing::{debug, warn};

/// Deliver `batch` to `topic`, making at most `policy.max_retries + 1` attempts.
///
/// Only [`DeliveryError::UnknownTopic`] is retried: between attempts the
/// topic's readiness is awaited and the policy's linear backoff is slept.
/// Any other failure is returned immediately.
pub async fn deliver_with_retry(
    sink: &dyn MessageSink,
    readiness: &dyn TopicReadiness,
    observer: &dyn ExportObserver,
    topic: &str,
    batch: &[Message],
    policy: &RetryPolicy,
) -> Result<()> {
    let mut attempt: u32 = 0;
    loop {
        match sink.write(batch).await {
            Ok(()) => {
                if attempt > 0 {
                    debug!(topic, attempt, "Batch delivered after retry");
                }
                return Ok(());
            }
            Err(DeliveryError::UnknownTopic(msg)) if attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.base_backoff * attempt;
                observer.on_event(&ExportEvent::DeliveryRetry {
                    topic: topic.to_string(),
                    attempt,
                    backoff_ms: backoff.as_millis() as u64,
                    error: msg,
                });
                if let Err(e) = readiness.wait_ready(topic, policy.ready_timeout).await {
                    warn!(topic, attempt, "Topic still not ready before retry: {e}");
                }
                tokio::time::sleep(backoff).await;
            }
            Err(DeliveryError::UnknownTopic(msg)) => {
                warn!(
                    topic,
                    attempts = attempt + 1,
                    "Giving up on batch, topic unknown: {msg}"
                );
                return Err(ExportError::NotReady {
                    topic: topic.to_string(),
                });
            }
            Err(DeliveryError::Other(msg)) => return Err(ExportError::Delivery(msg)),
        }
    }
}
