//! In-memory membership registry.
//!
//! The registry is the single owner of pending and verified state. Every
//! resolution of a pending entry goes through one atomic claim, so when a
//! deadline and a verdict race for the same user exactly one of them wins.

use crate::pending::{PendingEntry, VerifiedRecord};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-user resolution slot.
#[derive(Debug, Clone)]
enum Slot {
    Pending(PendingEntry),
    /// The deadline claimed the entry and is evicting the user.
    Expiring { ticket: u64 },
}

/// Result of registering a join.
#[derive(Debug)]
pub struct Inserted {
    pub ticket: u64,
    /// The entry this join replaced, if the user was still pending.
    pub replaced: Option<PendingEntry>,
}

/// What a verdict found when it tried to claim a user.
#[derive(Debug)]
pub enum VerdictClaim {
    /// The user was pending; the verdict now owns the resolution.
    Claimed(PendingEntry),
    /// Nothing pending: a re-verification or a repeated callback.
    NotPending,
    /// The deadline already claimed this user and is evicting them.
    ExpiryInFlight,
}

pub struct MembershipRegistry {
    slots: DashMap<i64, Slot>,
    verified: DashMap<i64, VerifiedRecord>,
    next_ticket: AtomicU64,
}

impl Default for MembershipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            verified: DashMap::new(),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Create or replace the pending entry for a user.
    pub fn insert_pending(&self, user_id: i64, username: &str) -> Inserted {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = PendingEntry::new(user_id, username, ticket);
        let replaced = match self.slots.insert(user_id, Slot::Pending(entry)) {
            Some(Slot::Pending(previous)) => Some(previous),
            _ => None,
        };
        log::debug!(
            "Pending entry for user {} registered with ticket {} (replaced: {})",
            user_id,
            ticket,
            replaced.is_some()
        );
        Inserted { ticket, replaced }
    }

    /// Whether the user is waiting for a verdict.
    #[cfg(test)]
    pub fn is_pending(&self, user_id: i64) -> bool {
        matches!(self.slots.get(&user_id).as_deref(), Some(Slot::Pending(_)))
    }

    #[cfg(test)]
    pub fn is_expiring(&self, user_id: i64) -> bool {
        matches!(self.slots.get(&user_id).as_deref(), Some(Slot::Expiring { .. }))
    }

    #[cfg(test)]
    /// Remove a pending entry. Returns true only for the caller that removed it.
    pub fn remove_pending(&self, user_id: i64) -> bool {
        self.take_pending(user_id).is_some()
    }

    #[cfg(test)]
    /// Remove a pending entry and hand it to the caller that removed it.
    pub fn take_pending(&self, user_id: i64) -> Option<PendingEntry> {
        self.slots
            .remove_if(&user_id, |_, slot| matches!(slot, Slot::Pending(_)))
            .and_then(|(_, slot)| match slot {
                Slot::Pending(entry) => Some(entry),
                Slot::Expiring { .. } => None,
            })
    }

    /// Claim a user on behalf of an incoming verdict.
    pub fn claim_for_verdict(&self, user_id: i64) -> VerdictClaim {
        match self.slots.entry(user_id) {
            Entry::Occupied(occupied) => {
                if !matches!(occupied.get(), Slot::Pending(_)) {
                    return VerdictClaim::ExpiryInFlight;
                }
                match occupied.remove() {
                    Slot::Pending(entry) => VerdictClaim::Claimed(entry),
                    Slot::Expiring { .. } => VerdictClaim::ExpiryInFlight,
                }
            }
            Entry::Vacant(_) => VerdictClaim::NotPending,
        }
    }

    /// Claim a user on behalf of the deadline armed with `ticket`.
    ///
    /// Succeeds only while that exact join is still pending; the slot then
    /// stays marked as expiring until [`finish_expiry`](Self::finish_expiry).
    pub fn claim_expiry(&self, user_id: i64, ticket: u64) -> Option<PendingEntry> {
        match self.slots.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                let owns = matches!(occupied.get(), Slot::Pending(entry) if entry.ticket == ticket);
                if !owns {
                    return None;
                }
                match occupied.insert(Slot::Expiring { ticket }) {
                    Slot::Pending(entry) => Some(entry),
                    Slot::Expiring { .. } => None,
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Clear the expiring marker left by [`claim_expiry`](Self::claim_expiry).
    pub fn finish_expiry(&self, user_id: i64, ticket: u64) {
        self.slots.remove_if(&user_id, |_, slot| {
            matches!(slot, Slot::Expiring { ticket: t } if *t == ticket)
        });
    }

    /// Number of users currently waiting for a verdict.
    pub fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Pending(_)))
            .count()
    }

    /// Upsert the verified record for a user.
    pub fn set_verified(&self, record: VerifiedRecord) {
        self.verified.insert(record.user_id, record);
    }

    /// Record a positive verdict observed now.
    pub fn mark_verified(&self, user_id: i64, username: &str, nft_count: u64, wallet_address: &str) {
        self.set_verified(VerifiedRecord {
            user_id,
            username: username.to_string(),
            verified_at: Utc::now(),
            nft_count,
            wallet_address: wallet_address.to_string(),
        });
    }

    /// Latest verified record for a user, if any.
    pub fn get_verified(&self, user_id: i64) -> Option<VerifiedRecord> {
        self.verified.get(&user_id).map(|record| record.value().clone())
    }
}
