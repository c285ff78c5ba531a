//! The [`AccessStore`]: admission checks, quota reservation, and the
//! administrative mutators.
//!
//! All state lives behind one `tokio::sync::Mutex`, which is what makes
//! `reserve` atomic against concurrent reservations for the same user: two
//! callers racing for the last unit of quota serialize on the lock and the
//! second one sees `remaining == 0`. Every mutation persists the snapshot
//! before the lock is released (temp file + rename, so a crash mid-write
//! never leaves a torn file).

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::records::{GroupRecord, QuotaRecord, Snapshot};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Store-level failures. Admission denials are not errors; see
/// [`ReserveOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Whitelist I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot on disk did not parse. `reload` surfaces this without
    /// touching the in-memory state.
    #[error("Corrupt whitelist snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Daily limit must be greater than zero")]
    InvalidLimit,
}

/// Why a reservation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotWhitelisted,
    QuotaExhausted,
}

/// Result of a `reserve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// One unit of quota was taken; `remaining` is the post-decrement count.
    Granted { remaining: u32 },
    Denied(Denial),
}

// ---------------------------------------------------------------------------
// AccessStore
// ---------------------------------------------------------------------------

/// Durable whitelist/quota store backed by a JSON snapshot file.
#[derive(Debug)]
pub struct AccessStore {
    path: PathBuf,
    default_daily_limit: u32,
    inner: Mutex<Snapshot>,
}

impl AccessStore {
    /// Open the store at `path`, creating an empty snapshot if the file does
    /// not exist yet. A corrupt existing snapshot is an error; failing fast
    /// at startup beats silently discarding quota state.
    pub async fn open(path: impl Into<PathBuf>, default_daily_limit: u32) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = Snapshot::default();
                write_snapshot(&path, &empty).await?;
                empty
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            default_daily_limit,
            inner: Mutex::new(snapshot),
        })
    }

    /// Path of the snapshot file this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- admission checks ---------------------------------------------------

    /// Presence test only; an empty store denies everyone.
    pub async fn is_user_allowed(&self, platform: &str, user_id: &str) -> bool {
        let snap = self.inner.lock().await;
        snap.platform(platform)
            .is_some_and(|p| p.users.contains_key(user_id))
    }

    /// Presence test only; an empty store denies every group.
    pub async fn is_group_allowed(&self, platform: &str, group_id: &str) -> bool {
        let snap = self.inner.lock().await;
        snap.platform(platform)
            .is_some_and(|p| p.groups.contains_key(group_id))
    }

    // -- quota --------------------------------------------------------------

    /// Atomically check-and-reserve one unit of today's quota.
    ///
    /// Applies the lazy date rollover first, then decrements `remaining` if
    /// positive. Holding the store lock across the whole operation rules out
    /// the lost-update race between concurrent reservations.
    pub async fn reserve(&self, platform: &str, user_id: &str) -> Result<ReserveOutcome, StoreError> {
        self.reserve_on(platform, user_id, today()).await
    }

    /// `reserve` with an explicit "today", so rollover behavior is testable
    /// without waiting for midnight.
    pub async fn reserve_on(
        &self,
        platform: &str,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<ReserveOutcome, StoreError> {
        let mut snap = self.inner.lock().await;
        let Some(record) = snap.platform_mut(platform).users.get_mut(user_id) else {
            return Ok(ReserveOutcome::Denied(Denial::NotWhitelisted));
        };

        let rolled = record.last_reset != today;
        record.roll_over(today);
        if record.remaining == 0 {
            // Persist the rollover even on denial so the reset happens
            // exactly once per day.
            if rolled {
                write_snapshot(&self.path, &snap).await?;
            }
            return Ok(ReserveOutcome::Denied(Denial::QuotaExhausted));
        }

        record.remaining -= 1;
        record.last_used_at = Some(Utc::now());
        let remaining = record.remaining;
        write_snapshot(&self.path, &snap).await?;

        tracing::debug!(platform, user_id, remaining, "Quota reserved");
        Ok(ReserveOutcome::Granted { remaining })
    }

    /// Return one unit of quota, capped at the daily limit.
    ///
    /// Called only when a reserved job fails before producing output, never
    /// on success. A user removed from the whitelist mid-flight is a no-op.
    pub async fn refund(&self, platform: &str, user_id: &str) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        let Some(record) = snap.platform_mut(platform).users.get_mut(user_id) else {
            tracing::warn!(platform, user_id, "Refund for unknown user ignored");
            return Ok(());
        };

        record.remaining = (record.remaining + 1).min(record.daily_limit);
        let remaining = record.remaining;
        write_snapshot(&self.path, &snap).await?;

        tracing::debug!(platform, user_id, remaining, "Quota refunded");
        Ok(())
    }

    /// Current record for a user, with today's rollover applied.
    pub async fn user_info(&self, platform: &str, user_id: &str) -> Result<Option<QuotaRecord>, StoreError> {
        let mut snap = self.inner.lock().await;
        let Some(record) = snap.platform_mut(platform).users.get_mut(user_id) else {
            return Ok(None);
        };
        record.roll_over(today());
        let copy = record.clone();
        write_snapshot(&self.path, &snap).await?;
        Ok(Some(copy))
    }

    // -- administrative mutators ---------------------------------------------

    /// Add a user, or re-add to refresh: the record is replaced with a full
    /// allowance at `limit` (or the configured default).
    pub async fn add_user(
        &self,
        platform: &str,
        user_id: &str,
        limit: Option<u32>,
        nickname: Option<String>,
    ) -> Result<QuotaRecord, StoreError> {
        let limit = limit.unwrap_or(self.default_daily_limit);
        if limit == 0 {
            return Err(StoreError::InvalidLimit);
        }

        let record = QuotaRecord::new(limit, today(), nickname);
        let mut snap = self.inner.lock().await;
        snap.platform_mut(platform)
            .users
            .insert(user_id.to_string(), record.clone());
        write_snapshot(&self.path, &snap).await?;

        tracing::info!(platform, user_id, limit, "User whitelisted");
        Ok(record)
    }

    /// Remove a user. Returns whether the user was present.
    pub async fn remove_user(&self, platform: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut snap = self.inner.lock().await;
        let removed = snap.platform_mut(platform).users.remove(user_id).is_some();
        if removed {
            write_snapshot(&self.path, &snap).await?;
            tracing::info!(platform, user_id, "User removed from whitelist");
        }
        Ok(removed)
    }

    /// Set a user's daily limit, creating the record if absent. For an
    /// existing user, `remaining` is clamped down to the new limit but never
    /// topped up (today's spend is not forgiven).
    pub async fn set_limit(
        &self,
        platform: &str,
        user_id: &str,
        limit: u32,
        nickname: Option<String>,
    ) -> Result<QuotaRecord, StoreError> {
        if limit == 0 {
            return Err(StoreError::InvalidLimit);
        }

        let mut snap = self.inner.lock().await;
        let users = &mut snap.platform_mut(platform).users;
        let record = match users.get_mut(user_id) {
            Some(record) => {
                record.daily_limit = limit;
                record.remaining = record.remaining.min(limit);
                if nickname.is_some() {
                    record.nickname = nickname;
                }
                record.clone()
            }
            None => {
                let record = QuotaRecord::new(limit, today(), nickname);
                users.insert(user_id.to_string(), record.clone());
                record
            }
        };
        write_snapshot(&self.path, &snap).await?;

        tracing::info!(platform, user_id, limit, "Daily limit updated");
        Ok(record)
    }

    /// Allow a group. Re-adding updates the display name.
    pub async fn add_group(
        &self,
        platform: &str,
        group_id: &str,
        name: Option<String>,
    ) -> Result<GroupRecord, StoreError> {
        let record = GroupRecord { name };
        let mut snap = self.inner.lock().await;
        snap.platform_mut(platform)
            .groups
            .insert(group_id.to_string(), record.clone());
        write_snapshot(&self.path, &snap).await?;

        tracing::info!(platform, group_id, "Group whitelisted");
        Ok(record)
    }

    /// Disallow a group. Returns whether the group was present.
    pub async fn remove_group(&self, platform: &str, group_id: &str) -> Result<bool, StoreError> {
        let mut snap = self.inner.lock().await;
        let removed = snap.platform_mut(platform).groups.remove(group_id).is_some();
        if removed {
            write_snapshot(&self.path, &snap).await?;
            tracing::info!(platform, group_id, "Group removed from whitelist");
        }
        Ok(removed)
    }

    /// Re-read the snapshot from disk, atomically with respect to in-flight
    /// reservations: the lock is held across read-and-swap, and a snapshot
    /// that fails to parse leaves the in-memory state untouched.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let mut snap = self.inner.lock().await;
        let bytes = tokio::fs::read(&self.path).await?;
        let fresh: Snapshot = serde_json::from_slice(&bytes)?;
        *snap = fresh;
        tracing::info!(path = %self.path.display(), "Whitelist snapshot reloaded");
        Ok(())
    }
}

/// Today's calendar date in the deployment's local timezone.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Persist a snapshot atomically: write a sibling temp file, then rename
/// over the target.
async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
