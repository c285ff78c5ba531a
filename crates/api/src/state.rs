use std::sync::Arc;

use atelier_core::validate::Policy;
use atelier_queue::GenerationQueue;
use atelier_store::AccessStore;

use crate::config::ServerConfig;
use crate::registry::JobRegistry;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Whitelist/quota store.
    pub store: Arc<AccessStore>,
    /// Enqueue handle for the serial generation queue.
    pub queue: GenerationQueue,
    /// Validation policy derived from configuration.
    pub policy: Arc<Policy>,
    /// Job status/result registry for pollers.
    pub jobs: JobRegistry,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
