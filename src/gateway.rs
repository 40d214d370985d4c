//! Group membership gateway.
//!
//! `GroupGateway` is the seam to the chat platform. `Gateway` wraps it with a
//! bound on every call and turns failures into log lines: membership actions
//! are best-effort and rely on the platform treating repeated bans/unbans as
//! no-ops.

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How a message body should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
    /// HTML without link previews.
    HtmlNoPreview,
}

/// A member's standing in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn is_admin(self) -> bool {
        matches!(self, MemberStatus::Creator | MemberStatus::Administrator)
    }
}

#[async_trait]
pub trait GroupGateway: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str, format: TextFormat) -> Result<()>;
    async fn ban_member(&self, chat_id: i64, user_id: i64) -> Result<()>;
    /// Lift a ban. Must not remove a member who is not banned.
    async fn unban_member(&self, chat_id: i64, user_id: i64) -> Result<()>;
    async fn member_status(&self, chat_id: i64, user_id: i64) -> Result<MemberStatus>;
    async fn create_invite_link(&self, chat_id: i64) -> Result<String>;
}

/// Bounded, best-effort access to a [`GroupGateway`].
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<dyn GroupGateway>,
    call_timeout: Duration,
}

impl Gateway {
    pub fn new(inner: Arc<dyn GroupGateway>, call_timeout: Duration) -> Self {
        Self { inner, call_timeout }
    }

    /// Run a gateway call with the configured bound; failures are logged.
    async fn attempt<T, F>(&self, ctx: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::warn!("Gateway call failed ({}): {:#}", ctx, e);
                None
            }
            Err(_) => {
                log::warn!("Gateway call timed out ({}) after {:?}", ctx, self.call_timeout);
                None
            }
        }
    }

    pub async fn send(&self, chat_id: i64, text: &str, format: TextFormat) -> bool {
        self.attempt("send_message", self.inner.send_message(chat_id, text, format))
            .await
            .is_some()
    }

    pub async fn ban(&self, chat_id: i64, user_id: i64) -> bool {
        self.attempt("ban_chat_member", self.inner.ban_member(chat_id, user_id))
            .await
            .is_some()
    }

    pub async fn unban(&self, chat_id: i64, user_id: i64) -> bool {
        self.attempt("unban_chat_member", self.inner.unban_member(chat_id, user_id))
            .await
            .is_some()
    }

    pub async fn member_status(&self, chat_id: i64, user_id: i64) -> Option<MemberStatus> {
        self.attempt("get_chat_member", self.inner.member_status(chat_id, user_id))
            .await
    }

    pub async fn create_invite_link(&self, chat_id: i64) -> Option<String> {
        self.attempt("create_chat_invite_link", self.inner.create_invite_link(chat_id))
            .await
    }

    /// Remove a user while leaving them free to rejoin: ban, then lift the ban.
    pub async fn evict(&self, chat_id: i64, user_id: i64) -> bool {
        if !self.ban(chat_id, user_id).await {
            return false;
        }
        self.unban(chat_id, user_id).await
    }
}

#[cfg(test)]
pub mod testing {
    //! In-memory gateway that records every call.

    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Send { chat_id: i64, text: String, format: TextFormat },
        Ban { chat_id: i64, user_id: i64 },
        Unban { chat_id: i64, user_id: i64 },
        MemberStatus { chat_id: i64, user_id: i64 },
        CreateInvite { chat_id: i64 },
    }

    #[derive(Default)]
    pub struct RecordingGateway {
        calls: Mutex<Vec<Call>>,
        statuses: Mutex<HashMap<i64, MemberStatus>>,
        /// Number of upcoming sends that fail.
        failing_sends: AtomicUsize,
        fail_bans: AtomicBool,
        ban_delay: Mutex<Option<Duration>>,
    }

    impl RecordingGateway {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn gateway(self: &Arc<Self>) -> Gateway {
            Gateway::new(self.clone(), Duration::from_secs(5))
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn sent_texts(&self, chat_id: i64) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Send { chat_id: c, text, .. } if c == chat_id => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.lock().iter().filter(|c| pred(c)).count()
        }

        pub fn bans_of(&self, user_id: i64) -> usize {
            self.count(|c| matches!(c, Call::Ban { user_id: u, .. } if *u == user_id))
        }

        pub fn unbans_of(&self, user_id: i64) -> usize {
            self.count(|c| matches!(c, Call::Unban { user_id: u, .. } if *u == user_id))
        }

        pub fn set_status(&self, user_id: i64, status: MemberStatus) {
            self.statuses.lock().insert(user_id, status);
        }

        pub fn fail_next_sends(&self, n: usize) {
            self.failing_sends.store(n, Ordering::SeqCst);
        }

        pub fn fail_bans(&self) {
            self.fail_bans.store(true, Ordering::SeqCst);
        }

        pub fn delay_bans(&self, delay: Duration) {
            *self.ban_delay.lock() = Some(delay);
        }
    }

    #[async_trait]
    impl GroupGateway for RecordingGateway {
        async fn send_message(&self, chat_id: i64, text: &str, format: TextFormat) -> Result<()> {
            self.calls.lock().push(Call::Send {
                chat_id,
                text: text.to_string(),
                format,
            });
            let failing = self
                .failing_sends
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(anyhow!("send rejected"));
            }
            Ok(())
        }

        async fn ban_member(&self, chat_id: i64, user_id: i64) -> Result<()> {
            self.calls.lock().push(Call::Ban { chat_id, user_id });
            let delay = *self.ban_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_bans.load(Ordering::SeqCst) {
                return Err(anyhow!("not enough rights to restrict/ban chat member"));
            }
            Ok(())
        }

        async fn unban_member(&self, chat_id: i64, user_id: i64) -> Result<()> {
            self.calls.lock().push(Call::Unban { chat_id, user_id });
            Ok(())
        }

        async fn member_status(&self, chat_id: i64, user_id: i64) -> Result<MemberStatus> {
            self.calls.lock().push(Call::MemberStatus { chat_id, user_id });
            Ok(self
                .statuses
                .lock()
                .get(&user_id)
                .copied()
                .unwrap_or(MemberStatus::Member))
        }

        async fn create_invite_link(&self, chat_id: i64) -> Result<String> {
            self.calls.lock().push(Call::CreateInvite { chat_id });
            Ok("https://t.me/+invite".to_string())
        }
    }
}
