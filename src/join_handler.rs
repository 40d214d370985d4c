//! New member handling: register pending, send the link, arm the deadline.

use crate::gateway::{Gateway, TextFormat};
use crate::message_utils;
use crate::notifier::AdminNotifier;
use crate::registry::MembershipRegistry;
use crate::scheduler::TimeoutScheduler;
use std::sync::Arc;
use url::Url;

/// A member reported by a "joined chat" event.
#[derive(Debug, Clone)]
pub struct JoinedMember {
    pub user_id: i64,
    pub display_name: String,
    pub is_bot: bool,
}

#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub chat_id: i64,
    pub members: Vec<JoinedMember>,
}

/// Build the verification page link for a user.
pub fn verification_link(base: &Url, user_id: i64) -> String {
    let mut link = base.clone();
    link.query_pairs_mut().append_pair("tg_id", &user_id.to_string());
    link.to_string()
}

pub struct JoinHandler {
    chat_id: i64,
    verify_page: Url,
    registry: Arc<MembershipRegistry>,
    scheduler: Arc<TimeoutScheduler>,
    gateway: Gateway,
    notifier: Arc<AdminNotifier>,
}

impl JoinHandler {
    pub fn new(
        chat_id: i64,
        verify_page: Url,
        registry: Arc<MembershipRegistry>,
        scheduler: Arc<TimeoutScheduler>,
        gateway: Gateway,
        notifier: Arc<AdminNotifier>,
    ) -> Self {
        Self {
            chat_id,
            verify_page,
            registry,
            scheduler,
            gateway,
            notifier,
        }
    }

    /// Process a join event. Returns how many members entered verification.
    pub async fn handle(&self, event: &JoinEvent) -> usize {
        if event.chat_id != self.chat_id {
            log::debug!(
                "Ignoring join event for chat {} (managed chat is {})",
                event.chat_id,
                self.chat_id
            );
            return 0;
        }

        let mut registered = 0;
        for member in &event.members {
            if member.is_bot {
                log::debug!("Skipping bot member {}", member.user_id);
                continue;
            }
            self.start_verification(member).await;
            registered += 1;
        }
        registered
    }

    async fn start_verification(&self, member: &JoinedMember) {
        let user_id = member.user_id;
        let username = member.display_name.as_str();
        log::info!("Processing new member @{} (ID: {})", username, user_id);

        let link = verification_link(&self.verify_page, user_id);
        let welcome = message_utils::welcome_message(username, &link, self.scheduler.window());
        if !self.gateway.send(self.chat_id, &welcome, TextFormat::HtmlNoPreview).await {
            let fallback = message_utils::welcome_fallback(username);
            if !self.gateway.send(self.chat_id, &fallback, TextFormat::Html).await {
                log::warn!("Could not deliver any welcome message to @{} (ID: {})", username, user_id);
            }
        }

        let inserted = self.registry.insert_pending(user_id, username);
        if let Some(previous) = inserted.replaced {
            log::info!("User @{} was already pending; restarting verification", username);
            self.scheduler.cancel(user_id, previous.ticket);
        }
        self.scheduler.arm(user_id, inserted.ticket);
        log::info!(
            "Pending verifications: {}",
            self.registry.pending_count()
        );

        self.notifier.user_joined(user_id, username);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_log::AuditLog;
    use crate::gateway::testing::{Call, RecordingGateway};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    const CHAT: i64 = -1001;
    const ADMIN: i64 = 555;

    struct Fixture {
        _dir: TempDir,
        recorder: Arc<RecordingGateway>,
        registry: Arc<MembershipRegistry>,
        scheduler: Arc<TimeoutScheduler>,
        handler: JoinHandler,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let recorder = RecordingGateway::new();
        let registry = Arc::new(MembershipRegistry::new());
        let audit = Arc::new(AuditLog::new(dir.path().join("analytics.json")));
        let window = Duration::from_secs(600);
        let notifier = Arc::new(AdminNotifier::new(recorder.gateway(), Some(ADMIN), true, window));
        let scheduler = Arc::new(TimeoutScheduler::new(
            CHAT,
            window,
            registry.clone(),
            audit,
            recorder.gateway(),
            notifier.clone(),
        ));
        let handler = JoinHandler::new(
            CHAT,
            Url::parse("https://verify.example/").unwrap(),
            registry.clone(),
            scheduler.clone(),
            recorder.gateway(),
            notifier,
        );
        Fixture {
            _dir: dir,
            recorder,
            registry,
            scheduler,
            handler,
        }
    }

    fn human(user_id: i64, name: &str) -> JoinedMember {
        JoinedMember {
            user_id,
            display_name: name.to_string(),
            is_bot: false,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_verification_link_embeds_user_id() {
        let base = Url::parse("https://verify.example/").unwrap();
        assert_eq!(verification_link(&base, 42), "https://verify.example/?tg_id=42");

        let with_query = Url::parse("https://verify.example/page?src=tg").unwrap();
        assert_eq!(
            verification_link(&with_query, 7),
            "https://verify.example/page?src=tg&tg_id=7"
        );
    }

    #[tokio::test]
    async fn test_join_registers_pending_and_sends_link() {
        let f = fixture();
        let event = JoinEvent {
            chat_id: CHAT,
            members: vec![human(42, "alice")],
        };

        assert_eq!(f.handler.handle(&event).await, 1);
        settle().await;

        assert!(f.registry.is_pending(42));
        assert_eq!(f.scheduler.armed_count(), 1);

        let group = f.recorder.sent_texts(CHAT);
        assert_eq!(group.len(), 1);
        assert!(group[0].contains("https://verify.example/?tg_id=42"));
        assert!(f.recorder.calls().contains(&Call::Send {
            chat_id: CHAT,
            text: group[0].clone(),
            format: TextFormat::HtmlNoPreview,
        }));

        let admin = f.recorder.sent_texts(ADMIN);
        assert_eq!(admin.len(), 1);
        assert!(admin[0].contains("New User Joined"));
    }

    #[tokio::test]
    async fn test_rejoin_keeps_single_entry() {
        let f = fixture();
        let event = JoinEvent {
            chat_id: CHAT,
            members: vec![human(42, "alice")],
        };

        for _ in 0..3 {
            f.handler.handle(&event).await;
        }

        assert_eq!(f.registry.pending_count(), 1);
        assert_eq!(f.scheduler.armed_count(), 1);
        assert_eq!(f.recorder.sent_texts(CHAT).len(), 3);
    }

    #[tokio::test]
    async fn test_bots_and_foreign_chats_are_ignored() {
        let f = fixture();
        let bot_event = JoinEvent {
            chat_id: CHAT,
            members: vec![JoinedMember {
                user_id: 1,
                display_name: "helper_bot".into(),
                is_bot: true,
            }],
        };
        let foreign = JoinEvent {
            chat_id: -2002,
            members: vec![human(2, "mallory")],
        };

        assert_eq!(f.handler.handle(&bot_event).await, 0);
        assert_eq!(f.handler.handle(&foreign).await, 0);
        settle().await;

        assert_eq!(f.registry.pending_count(), 0);
        assert!(f.recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_event_registers_only_humans() {
        let f = fixture();
        let event = JoinEvent {
            chat_id: CHAT,
            members: vec![
                human(10, "ann"),
                JoinedMember {
                    user_id: 11,
                    display_name: "ci_bot".into(),
                    is_bot: true,
                },
                human(12, "ben"),
            ],
        };

        assert_eq!(f.handler.handle(&event).await, 2);
        assert!(f.registry.is_pending(10));
        assert!(!f.registry.is_pending(11));
        assert!(f.registry.is_pending(12));
    }

    #[tokio::test]
    async fn test_welcome_failure_falls_back_and_still_registers() {
        let f = fixture();
        f.recorder.fail_next_sends(1);
        let event = JoinEvent {
            chat_id: CHAT,
            members: vec![human(42, "alice")],
        };

        f.handler.handle(&event).await;

        let group = f.recorder.sent_texts(CHAT);
        assert_eq!(group.len(), 2);
        assert!(group[1].contains("Please verify your NFT ownership"));
        assert!(f.registry.is_pending(42));
    }

    #[tokio::test]
    async fn test_total_send_failure_still_registers() {
        let f = fixture();
        f.recorder.fail_next_sends(2);
        let event = JoinEvent {
            chat_id: CHAT,
            members: vec![human(42, "alice")],
        };

        assert_eq!(f.handler.handle(&event).await, 1);
        assert!(f.registry.is_pending(42));
        assert_eq!(f.scheduler.armed_count(), 1);
    }
}
