//! Reconciles an external verdict with the membership registry.
//!
//! A verdict first claims the user, which neutralizes a sleeping deadline.
//! It then acts on the latest verdict even when nothing was pending, so
//! repeated callbacks and re-verifications are honoured. The only verdict that
//! is dropped is one that arrives while the deadline is already evicting the
//! same join: that resolution belongs to the deadline.

use crate::audit_log::{AuditEntry, AuditLog, AuditReason};
use crate::gateway::{Gateway, TextFormat};
use crate::message_utils;
use crate::notifier::AdminNotifier;
use crate::registry::{MembershipRegistry, VerdictClaim};
use crate::scheduler::TimeoutScheduler;
use anyhow::{Context, Result};
use std::sync::Arc;

const NO_NFT_REASON: &str = "No NFTs found";

/// The external verifier's decision about one user.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub user_id: i64,
    pub username: String,
    pub has_nft: bool,
    pub nft_count: u64,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Granted,
    Evicted,
    /// The deadline had already claimed this join and is removing the user.
    SupersededByTimeout,
}

impl Resolution {
    pub fn message(self) -> &'static str {
        match self {
            Resolution::Granted | Resolution::Evicted => "Verification processed",
            Resolution::SupersededByTimeout => "Verification window already expired",
        }
    }
}

pub struct CallbackHandler {
    chat_id: i64,
    registry: Arc<MembershipRegistry>,
    scheduler: Arc<TimeoutScheduler>,
    audit: Arc<AuditLog>,
    gateway: Gateway,
    notifier: Arc<AdminNotifier>,
}

impl CallbackHandler {
    pub fn new(
        chat_id: i64,
        registry: Arc<MembershipRegistry>,
        scheduler: Arc<TimeoutScheduler>,
        audit: Arc<AuditLog>,
        gateway: Gateway,
        notifier: Arc<AdminNotifier>,
    ) -> Self {
        Self {
            chat_id,
            registry,
            scheduler,
            audit,
            gateway,
            notifier,
        }
    }

    pub async fn handle(&self, verdict: &Verdict) -> Result<Resolution> {
        log::info!(
            "Verification callback for @{} (ID: {}): has_nft={}, nft_count={}",
            verdict.username,
            verdict.user_id,
            verdict.has_nft,
            verdict.nft_count
        );

        match self.registry.claim_for_verdict(verdict.user_id) {
            VerdictClaim::Claimed(entry) => {
                log::info!("Removing @{} from pending verification (callback received)", entry.username);
                self.scheduler.cancel(verdict.user_id, entry.ticket);
            }
            VerdictClaim::NotPending => {
                log::info!("User {} was not pending; applying verdict as re-verification", verdict.user_id);
            }
            VerdictClaim::ExpiryInFlight => {
                log::warn!(
                    "Verdict for user {} arrived while the timeout removal was in progress; ignoring",
                    verdict.user_id
                );
                return Ok(Resolution::SupersededByTimeout);
            }
        }

        if verdict.has_nft {
            self.grant(verdict).await
        } else {
            self.reject(verdict).await
        }
    }

    async fn grant(&self, verdict: &Verdict) -> Result<Resolution> {
        let user_id = verdict.user_id;

        if self.gateway.unban(self.chat_id, user_id).await {
            log::info!("Lifted any ban on @{} (ID: {})", verdict.username, user_id);
        }
        if let Some(status) = self.gateway.member_status(self.chat_id, user_id).await {
            log::info!("Membership of @{} before grant: {:?}", verdict.username, status);
        }
        if let Some(link) = self.gateway.create_invite_link(self.chat_id).await {
            log::debug!("Created invite link {} for @{}", link, verdict.username);
        }

        let text = message_utils::verification_success(&verdict.username);
        if !self.gateway.send(self.chat_id, &text, TextFormat::Html).await {
            log::warn!("Success announcement for @{} was not delivered", verdict.username);
        }

        self.registry.mark_verified(
            user_id,
            &verdict.username,
            verdict.nft_count,
            &verdict.wallet_address,
        );
        let recorded = self
            .audit
            .record(AuditEntry::verified(
                user_id,
                &verdict.username,
                verdict.nft_count,
                &verdict.wallet_address,
            ))
            .await;
        log::info!("User @{} (ID: {}) verified - access granted", verdict.username, user_id);

        self.notifier.verification_success(
            user_id,
            &verdict.username,
            verdict.nft_count,
            Some(&verdict.wallet_address),
        );
        recorded.context("failed to record verification")?;
        Ok(Resolution::Granted)
    }

    async fn reject(&self, verdict: &Verdict) -> Result<Resolution> {
        let user_id = verdict.user_id;

        let text = message_utils::verification_failed(&verdict.username);
        if !self.gateway.send(self.chat_id, &text, TextFormat::Html).await {
            log::warn!("Failure announcement for @{} was not delivered", verdict.username);
        }

        if self.gateway.evict(self.chat_id, user_id).await {
            log::info!("Removed @{} (ID: {}) - no required NFT", verdict.username, user_id);
        } else {
            log::warn!("Could not remove @{} (ID: {}); may not be in group", verdict.username, user_id);
        }

        let recorded = self
            .audit
            .record(AuditEntry::removed(
                user_id,
                &verdict.username,
                AuditReason::NoNft,
                Some(&verdict.wallet_address),
            ))
            .await;

        self.notifier.verification_failed(
            user_id,
            &verdict.username,
            NO_NFT_REASON,
            Some(&verdict.wallet_address),
        );
        recorded.context("failed to record removal")?;
        Ok(Resolution::Evicted)
    }
}
