//! Domain core for the atelier image-generation service.
//!
//! Pure logic with zero internal dependencies: the command tokenizer, the
//! field validator/normalizer that produces a canonical [`request::Request`],
//! the character-zone resolver, and the model/sampler/preset catalogs.
//!
//! Nothing in this crate performs I/O; admission control, persistence, and
//! backend dispatch live in the `atelier-store`, `atelier-queue`, and
//! `atelier-novelai` crates.

pub mod characters;
pub mod error;
pub mod presets;
pub mod request;
pub mod tokenizer;
pub mod validate;

pub use error::RequestError;
pub use request::Request;
