//! Best-effort admin notifications.
//!
//! Notifications are spawned and never awaited by the caller; a failure is a
//! log line, not an error.

use crate::gateway::{Gateway, TextFormat};
use crate::message_utils;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct AdminNotifier {
    gateway: Gateway,
    target: Option<i64>,
    enabled: AtomicBool,
    window: Duration,
}

impl AdminNotifier {
    pub fn new(gateway: Gateway, target: Option<i64>, enabled: bool, window: Duration) -> Self {
        Self {
            gateway,
            target,
            enabled: AtomicBool::new(enabled),
            window,
        }
    }

    /// Configured admin chat, if any.
    pub fn target(&self) -> Option<i64> {
        self.target
    }

    /// Whether notifications are currently switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        log::info!("Admin notifications {}", if enabled { "enabled" } else { "disabled" });
    }

    fn active_target(&self) -> Option<i64> {
        if !self.is_enabled() {
            return None;
        }
        self.target
    }

    /// Send a notification in the background.
    fn dispatch(&self, kind: &'static str, text: String) {
        let Some(target) = self.active_target() else {
            log::debug!("Admin notification '{}' skipped (disabled or no target)", kind);
            return;
        };
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            if gateway.send(target, &text, TextFormat::Html).await {
                log::info!("Admin notified: {}", kind);
            } else {
                log::warn!("Admin notification '{}' was not delivered", kind);
            }
        });
    }

    /// Send a notification and wait for the outcome.
    pub async fn send_now(&self, text: &str) -> bool {
        match self.active_target() {
            Some(target) => self.gateway.send(target, text, TextFormat::Html).await,
            None => false,
        }
    }

    pub fn user_joined(&self, user_id: i64, username: &str) {
        self.dispatch(
            "user joined",
            message_utils::admin_user_joined(user_id, username, self.window),
        );
    }

    pub fn verification_success(&self, user_id: i64, username: &str, nft_count: u64, wallet: Option<&str>) {
        self.dispatch(
            "verification success",
            message_utils::admin_verification_success(user_id, username, nft_count, wallet),
        );
    }

    pub fn verification_failed(&self, user_id: i64, username: &str, reason: &str, wallet: Option<&str>) {
        self.dispatch(
            "verification failed",
            message_utils::admin_verification_failed(user_id, username, reason, wallet),
        );
    }

    pub fn verification_timeout(&self, user_id: i64, username: &str) {
        let reason = message_utils::timeout_reason(self.window);
        self.verification_failed(user_id, username, &reason, None);
    }
}
