//! Job lifecycle events, published on a `tokio::sync::broadcast` channel.
//!
//! Observers (logging, future WebSocket notifiers) subscribe through
//! [`crate::queue::GenerationQueue::subscribe`]; publishing never blocks and
//! events are dropped silently when nobody listens.

use uuid::Uuid;

/// Lifecycle notifications for queued jobs.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Admission succeeded and the job entered the FIFO.
    Enqueued {
        job_id: Uuid,
        platform: String,
        user_id: String,
    },
    /// The dispatcher picked the job up and the backend call began.
    Started { job_id: Uuid },
    /// The backend returned an image; quota stays spent.
    Completed { job_id: Uuid, seed: u64, model: String },
    /// The backend call failed; the requester's quota was refunded.
    Failed { job_id: Uuid, error: String },
}

/// Buffer capacity for the job-event broadcast channel. Slow subscribers
/// past this many events observe `RecvError::Lagged`.
pub const EVENT_CAPACITY: usize = 1024;
