//! Admission-controlled serial execution queue.
//!
//! [`queue::GenerationQueue`] accepts validated requests from any number of
//! concurrent callers, runs admission control (whitelist + quota reservation)
//! at enqueue time, and hands granted jobs to the single
//! [`dispatcher::Dispatcher`] task, which talks to the generation backend one
//! job at a time with a randomized inter-dispatch delay.
//!
//! Quota accounting is exactly-once: a unit is reserved when a job is
//! admitted and refunded only if that job later fails before producing
//! output. Every reserved job ends in exactly one of completed or
//! refunded-and-failed, including across shutdown.

pub mod dispatcher;
pub mod events;
pub mod queue;

pub use dispatcher::Dispatcher;
pub use events::JobEvent;
pub use queue::{EnqueueError, GenerationQueue, JobOutcome, QueueConfig, Ticket};
