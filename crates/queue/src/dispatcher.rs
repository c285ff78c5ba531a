//! The single serial consumer of the job FIFO.
//!
//! Exactly one backend call is in flight at any time. Between consecutive
//! dispatches (never before the first) the dispatcher sleeps a uniformly
//! random duration inside the configured window, a deliberate throttle
//! against the backend's own rate limiting, preserved to avoid upstream
//! bans. On backend failure the job's quota reservation is refunded before
//! the next job is taken; the dispatcher itself never dies on a failure.

use std::sync::Arc;
use std::time::Duration;

use atelier_novelai::GenerationBackend;
use atelier_store::AccessStore;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::events::JobEvent;
use crate::queue::{JobOutcome, QueueConfig, QueueJob};

/// Serial job dispatcher. Constructed by
/// [`GenerationQueue::new`](crate::queue::GenerationQueue::new); the owner
/// spawns [`run`](Self::run) once.
pub struct Dispatcher {
    store: Arc<AccessStore>,
    backend: Arc<dyn GenerationBackend>,
    rx: mpsc::UnboundedReceiver<QueueJob>,
    events: broadcast::Sender<JobEvent>,
    config: QueueConfig,
}

impl Dispatcher {
    pub(crate) fn new(
        store: Arc<AccessStore>,
        backend: Arc<dyn GenerationBackend>,
        rx: mpsc::UnboundedReceiver<QueueJob>,
        events: broadcast::Sender<JobEvent>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            backend,
            rx,
            events,
            config,
        }
    }

    /// Run until the cancellation token fires, then drain.
    ///
    /// Draining refunds and fails every job that was reserved but not yet
    /// dispatched, so no reservation is ever silently dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            min_delay_ms = self.config.min_delay.as_millis() as u64,
            max_delay_ms = self.config.max_delay.as_millis() as u64,
            "Generation dispatcher started"
        );

        let mut first = true;
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break, // all queue handles dropped
                },
            };

            if !first {
                let delay = self.random_delay();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        // Shutdown raced the throttle pause; this job was
                        // reserved and must not vanish.
                        self.drain_job(job).await;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            first = false;

            self.process(job).await;
        }

        tracing::info!("Generation dispatcher shutting down");
        self.rx.close();
        while let Some(job) = self.rx.recv().await {
            self.drain_job(job).await;
        }
    }

    /// One dispatch cycle: exactly one blocking backend call.
    async fn process(&self, job: QueueJob) {
        let queued_for = chrono::Utc::now() - job.enqueued_at;
        tracing::info!(
            job_id = %job.id,
            user_id = %job.request.requester.user_id,
            model = %job.request.model,
            queued_ms = queued_for.num_milliseconds(),
            "Dispatching job"
        );
        let _ = self.events.send(JobEvent::Started { job_id: job.id });

        match self.backend.generate(&job.request).await {
            Ok(image) => {
                let _ = self.events.send(JobEvent::Completed {
                    job_id: job.id,
                    seed: image.seed,
                    model: image.model.clone(),
                });
                let _ = job.outcome_tx.send(JobOutcome::Completed(image));
            }
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "Backend call failed");
                self.refund(&job).await;
                let _ = self.events.send(JobEvent::Failed {
                    job_id: job.id,
                    error: err.to_string(),
                });
                let _ = job.outcome_tx.send(JobOutcome::Failed(err.to_string()));
            }
        }
    }

    /// Fail a never-dispatched job during shutdown: refund, notify, event.
    async fn drain_job(&self, job: QueueJob) {
        tracing::info!(job_id = %job.id, "Refunding undispatched job at shutdown");
        self.refund(&job).await;
        let reason = "Service shutting down before the job was dispatched".to_string();
        let _ = self.events.send(JobEvent::Failed {
            job_id: job.id,
            error: reason.clone(),
        });
        let _ = job.outcome_tx.send(JobOutcome::Failed(reason));
    }

    async fn refund(&self, job: &QueueJob) {
        let requester = &job.request.requester;
        if let Err(e) = self
            .store
            .refund(&requester.platform, &requester.user_id)
            .await
        {
            // The reservation is lost until the next daily reset; log loudly
            // but keep dispatching.
            tracing::error!(job_id = %job.id, error = %e, "Quota refund failed");
        }
    }

    fn random_delay(&self) -> Duration {
        let min = self.config.min_delay.as_millis() as u64;
        let max = self.config.max_delay.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}
