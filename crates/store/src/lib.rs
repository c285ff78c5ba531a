//! Durable whitelist and daily-quota store.
//!
//! State is a single JSON snapshot per deployment, keyed by platform and
//! user/group id, guarded by one async mutex and persisted atomically
//! (temp file + rename) on every mutation. The store exclusively owns
//! [`records::QuotaRecord`]/[`records::GroupRecord`] mutation; callers only
//! ever see copies.

pub mod access;
pub mod records;

pub use access::{AccessStore, Denial, ReserveOutcome, StoreError};
pub use records::{GroupRecord, QuotaRecord};
