//! The enqueue half of the queue: admission control, quota reservation, and
//! the FIFO channel feeding the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use atelier_core::Request;
use atelier_novelai::{GeneratedImage, GenerationBackend};
use atelier_store::{AccessStore, Denial, ReserveOutcome, StoreError};
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::events::{JobEvent, EVENT_CAPACITY};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Dispatch pacing configuration.
///
/// The randomized pause between consecutive backend calls is a deliberate
/// throttle against the upstream's rate limiting; shipping builds keep the
/// 3–5 second default, tests shrink it.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl QueueConfig {
    /// Panics if `min_delay > max_delay`; misconfiguration should fail at
    /// startup, not at dispatch time.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        assert!(
            min_delay <= max_delay,
            "min_delay must not exceed max_delay"
        );
        Self {
            min_delay,
            max_delay,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_secs(5))
    }
}

// ---------------------------------------------------------------------------
// Job and outcome types
// ---------------------------------------------------------------------------

/// A reserved job travelling from `enqueue` to the dispatcher.
///
/// Created at enqueue, consumed exactly once, never re-enqueued.
pub(crate) struct QueueJob {
    pub id: Uuid,
    pub request: Request,
    pub enqueued_at: DateTime<Utc>,
    pub outcome_tx: oneshot::Sender<JobOutcome>,
}

/// Terminal result of a job, delivered through the ticket's oneshot.
#[derive(Debug)]
pub enum JobOutcome {
    /// Backend success. Quota stays decremented.
    Completed(GeneratedImage),
    /// Backend failure (already refunded). The string is the requester-
    /// facing failure description.
    Failed(String),
}

/// Returned by a successful `enqueue`: the job id plus a receiver for the
/// terminal outcome. Dropping the receiver does not cancel the job.
#[derive(Debug)]
pub struct Ticket {
    pub job_id: Uuid,
    pub outcome: oneshot::Receiver<JobOutcome>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a request never made it into the FIFO.
///
/// Denials are not store failures: nothing was reserved and nothing needs
/// refunding. The API layer decides which of these are reported and which
/// stay silent (group-origin denials).
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("User is not whitelisted")]
    NotWhitelisted,

    #[error("Daily quota exhausted")]
    QuotaExhausted,

    #[error("Group is not allowed")]
    GroupNotAllowed,

    #[error("Queue is shut down")]
    Closed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// GenerationQueue
// ---------------------------------------------------------------------------

/// Shared handle for enqueueing jobs and observing their lifecycle.
///
/// Cheap to clone; all clones feed the same dispatcher.
#[derive(Clone)]
pub struct GenerationQueue {
    store: Arc<AccessStore>,
    tx: mpsc::UnboundedSender<QueueJob>,
    events: broadcast::Sender<JobEvent>,
}

impl GenerationQueue {
    /// Build the queue and its dispatcher. The caller spawns
    /// [`Dispatcher::run`] on its runtime of choice.
    pub fn new(
        store: Arc<AccessStore>,
        backend: Arc<dyn GenerationBackend>,
        config: QueueConfig,
    ) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let queue = Self {
            store: Arc::clone(&store),
            tx,
            events: events.clone(),
        };
        let dispatcher = Dispatcher::new(store, backend, rx, events, config);
        (queue, dispatcher)
    }

    /// Admit and enqueue a validated request.
    ///
    /// Runs the whitelist checks and the atomic quota reservation; on any
    /// denial the request is rejected immediately and nothing is queued. On
    /// success the job is appended to the FIFO and a [`Ticket`] is returned
    /// without waiting for dispatch.
    pub async fn enqueue(&self, request: Request) -> Result<Ticket, EnqueueError> {
        let platform = request.requester.platform.clone();
        let user_id = request.requester.user_id.clone();

        if let atelier_core::request::Origin::Group { group_id } = &request.origin {
            if !self.store.is_group_allowed(&platform, group_id).await {
                return Err(EnqueueError::GroupNotAllowed);
            }
        }
        if !self.store.is_user_allowed(&platform, &user_id).await {
            return Err(EnqueueError::NotWhitelisted);
        }

        match self.store.reserve(&platform, &user_id).await? {
            ReserveOutcome::Denied(Denial::NotWhitelisted) => {
                return Err(EnqueueError::NotWhitelisted)
            }
            ReserveOutcome::Denied(Denial::QuotaExhausted) => {
                return Err(EnqueueError::QuotaExhausted)
            }
            ReserveOutcome::Granted { remaining } => {
                tracing::debug!(platform, user_id, remaining, "Admission granted");
            }
        }

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let job = QueueJob {
            id: Uuid::new_v4(),
            request,
            enqueued_at: Utc::now(),
            outcome_tx,
        };
        let job_id = job.id;

        if self.tx.send(job).is_err() {
            // Dispatcher already gone: give the reservation back rather than
            // leaking it into tomorrow's quota.
            self.store.refund(&platform, &user_id).await?;
            return Err(EnqueueError::Closed);
        }

        let _ = self.events.send(JobEvent::Enqueued {
            job_id,
            platform,
            user_id,
        });

        Ok(Ticket {
            job_id,
            outcome: outcome_rx,
        })
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_window_is_three_to_five_seconds() {
        let config = QueueConfig::default();
        assert_eq!(config.min_delay, Duration::from_secs(3));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[test]
    #[should_panic(expected = "min_delay")]
    fn inverted_delay_window_panics_at_construction() {
        QueueConfig::new(Duration::from_secs(5), Duration::from_secs(3));
    }
}
