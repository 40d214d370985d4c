//! Membership record types.
//!
//! A `PendingEntry` lives between a user joining and the first resolution
//! (verdict or deadline). A `VerifiedRecord` survives resolution and is only
//! ever overwritten by a later positive verdict.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// A user waiting for a verdict before the verification deadline.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub user_id: i64,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    /// Distinguishes this join from earlier joins of the same user, so a stale
    /// deadline cannot claim a newer entry.
    pub ticket: u64,
    pub created_at: Instant,
}

impl PendingEntry {
    pub fn new(user_id: i64, username: impl Into<String>, ticket: u64) -> Self {
        Self {
            user_id,
            username: username.into(),
            joined_at: Utc::now(),
            ticket,
            created_at: Instant::now(),
        }
    }
}

/// A user who passed verification at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedRecord {
    pub user_id: i64,
    pub username: String,
    pub verified_at: DateTime<Utc>,
    pub nft_count: u64,
    pub wallet_address: String,
}
