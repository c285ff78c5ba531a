//! In-memory job registry.
//!
//! The queue delivers each job's terminal outcome through a oneshot ticket;
//! the registry parks those outcomes so the chat adapter can poll
//! `GET /jobs/{id}` and fetch the finished image. Bounded: once the capacity
//! is reached, the oldest finished entries are evicted first-in-first-out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use atelier_novelai::GeneratedImage;
use atelier_queue::{JobOutcome, Ticket};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Maximum number of jobs retained (queued + finished).
const REGISTRY_CAPACITY: usize = 256;

/// Where a job stands, as reported to pollers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Completed { seed: u64, model: String },
    Failed { error: String },
}

struct JobEntry {
    status: JobStatus,
    /// Present only for completed jobs; fetched via `GET /jobs/{id}/image`.
    image: Option<Vec<u8>>,
}

/// Shared, bounded map of job id → status/result.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<Uuid, JobEntry>,
    order: VecDeque<Uuid>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly enqueued job and spawn a task that waits for its
    /// outcome ticket.
    pub fn track(&self, ticket: Ticket) {
        let job_id = ticket.job_id;
        let registry = self.clone();

        tokio::spawn(async move {
            registry.insert(job_id, JobEntry {
                status: JobStatus::Queued,
                image: None,
            })
            .await;

            let entry = match ticket.outcome.await {
                Ok(JobOutcome::Completed(image)) => completed_entry(image),
                Ok(JobOutcome::Failed(error)) => JobEntry {
                    status: JobStatus::Failed { error },
                    image: None,
                },
                // Dispatcher dropped without resolving; should not happen
                // outside hard crashes.
                Err(_) => JobEntry {
                    status: JobStatus::Failed {
                        error: "Dispatcher terminated unexpectedly".to_string(),
                    },
                    image: None,
                },
            };
            registry.insert(job_id, entry).await;
        });
    }

    /// Current status of a job, if still retained.
    pub async fn status(&self, job_id: Uuid) -> Option<JobStatus> {
        let inner = self.inner.lock().await;
        inner.entries.get(&job_id).map(|e| e.status.clone())
    }

    /// Finished image bytes for a completed job, if still retained.
    pub async fn image(&self, job_id: Uuid) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        inner.entries.get(&job_id).and_then(|e| e.image.clone())
    }

    async fn insert(&self, job_id: Uuid, entry: JobEntry) {
        let mut inner = self.inner.lock().await;
        if inner.entries.insert(job_id, entry).is_none() {
            inner.order.push_back(job_id);
        }
        while inner.order.len() > REGISTRY_CAPACITY {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
    }
}

fn completed_entry(image: GeneratedImage) -> JobEntry {
    JobEntry {
        status: JobStatus::Completed {
            seed: image.seed,
            model: image.model.clone(),
        },
        image: Some(image.bytes),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
