//! Generation-backend boundary: the [`GenerationBackend`] trait the queue
//! dispatches through, the NovelAI HTTP client implementing it, and the
//! canonical-request → wire-payload translation.
//!
//! The queue only ever sees the trait object, so tests and alternative
//! deployments can substitute a stub backend without touching dispatch
//! logic.

pub mod client;
pub mod payload;

pub use client::NovelAiClient;

use async_trait::async_trait;
use atelier_core::Request;

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// A successfully generated image plus the metadata the requester is told.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Raw response body (a ZIP archive whose first entry is the PNG, as
    /// served by the upstream endpoint). Persisting/unpacking is the
    /// caller's concern.
    pub bytes: Vec<u8>,
    pub seed: u64,
    pub model: String,
}

/// Failures of a single backend call.
///
/// Every variant refunds the requester's quota; none of them stops the
/// dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport-level failure: connect, TLS, or timeout.
    #[error("Backend request failed: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("Backend returned error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Client-side configuration problem (bad proxy URL, empty token).
    #[error("Backend client configuration error: {0}")]
    Config(String),
}

/// The one opaque blocking call the queue serializes.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Execute a validated request. Exactly one call is in flight at a time;
    /// any timeout policy lives inside the implementation.
    async fn generate(&self, request: &Request) -> Result<GeneratedImage, BackendError>;
}
