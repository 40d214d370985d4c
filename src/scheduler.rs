//! Verification deadlines.
//!
//! Each join arms one deferred task. When it wakes it tries to claim the
//! exact join it was armed for; only the claimant evicts, audits and
//! notifies. Early resolution aborts the sleeping task, but correctness never
//! depends on the abort: a stale task simply loses the claim.

use crate::audit_log::{AuditEntry, AuditLog, AuditReason};
use crate::gateway::Gateway;
use crate::notifier::AdminNotifier;
use crate::registry::MembershipRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Outcome of a fired deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The deadline won the claim and removed the user.
    Removed,
    /// The user was already resolved; nothing happened.
    AlreadyResolved,
}

struct ArmedTimer {
    ticket: u64,
    handle: AbortHandle,
}

pub struct TimeoutScheduler {
    chat_id: i64,
    window: Duration,
    registry: Arc<MembershipRegistry>,
    audit: Arc<AuditLog>,
    gateway: Gateway,
    notifier: Arc<AdminNotifier>,
    timers: DashMap<i64, ArmedTimer>,
}

impl TimeoutScheduler {
    pub fn new(
        chat_id: i64,
        window: Duration,
        registry: Arc<MembershipRegistry>,
        audit: Arc<AuditLog>,
        gateway: Gateway,
        notifier: Arc<AdminNotifier>,
    ) -> Self {
        Self {
            chat_id,
            window,
            registry,
            audit,
            gateway,
            notifier,
            timers: DashMap::new(),
        }
    }

    /// Length of the verification window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the deadline for the join identified by `ticket`.
    pub fn arm(self: &Arc<Self>, user_id: i64, ticket: u64) {
        let scheduler = Arc::clone(self);
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            scheduler.expire(user_id, ticket).await;
        });
        log::info!("Verification deadline armed for user {} ({:?})", user_id, window);

        // a superseded deadline still wakes, but its ticket no longer matches
        self.timers.insert(
            user_id,
            ArmedTimer {
                ticket,
                handle: task.abort_handle(),
            },
        );
    }

    /// Abort the sleeping deadline of a join that was resolved early.
    ///
    /// Callers must only cancel a ticket whose pending entry they removed
    /// themselves, so the task cannot be past its claim.
    pub fn cancel(&self, user_id: i64, ticket: u64) {
        if let Some((_, timer)) = self.timers.remove_if(&user_id, |_, t| t.ticket == ticket) {
            timer.handle.abort();
            log::debug!("Verification deadline for user {} cancelled", user_id);
        }
    }

    /// Number of sleeping deadlines.
    #[cfg(test)]
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Deadline body: claim, evict, audit, notify.
    pub async fn expire(&self, user_id: i64, ticket: u64) -> Expiry {
        self.timers.remove_if(&user_id, |_, t| t.ticket == ticket);

        let Some(entry) = self.registry.claim_expiry(user_id, ticket) else {
            log::debug!("Deadline for user {} fired after resolution; no-op", user_id);
            return Expiry::AlreadyResolved;
        };

        log::info!(
            "Verification window expired for @{} (ID: {}), joined {} ({:?} ago)",
            entry.username,
            entry.user_id,
            entry.joined_at.to_rfc3339(),
            entry.created_at.elapsed()
        );

        if !self.gateway.evict(self.chat_id, user_id).await {
            log::warn!("Eviction of user {} after timeout did not complete", user_id);
        }

        let record = AuditEntry::removed(user_id, &entry.username, AuditReason::Timeout, None);
        if let Err(e) = self.audit.record(record).await {
            log::error!("Failed to record timeout removal of user {}: {:#}", user_id, e);
        }

        self.registry.finish_expiry(user_id, ticket);
        self.notifier.verification_timeout(user_id, &entry.username);
        Expiry::Removed
    }
}
