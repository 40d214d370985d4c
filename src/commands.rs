//! Chat commands.

use crate::audit_log::{AuditLog, RECENT_LIMIT};
use crate::gateway::{Gateway, TextFormat};
use crate::message_utils;
use crate::notifier::AdminNotifier;
use crate::registry::MembershipRegistry;
use std::sync::Arc;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "Supported commands:")]
pub enum Command {
    #[command(description = "check that the bot is running")]
    Start,
    #[command(description = "check that the bot responds")]
    Test,
    #[command(description = "show verification analytics")]
    Analytics,
    #[command(description = "show admin notification settings")]
    NotificationsStatus,
    #[command(description = "enable admin notifications")]
    NotificationsOn,
    #[command(description = "disable admin notifications")]
    NotificationsOff,
    #[command(description = "send a sample admin notification")]
    TestAdminNotification,
    #[command(description = "re-admit a verified user: /add_user <user_id>")]
    AddUser(String),
}

impl Command {
    fn requires_admin(&self) -> bool {
        !matches!(self, Command::Start | Command::Test)
    }
}

/// Where a command came from.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub chat_id: i64,
    pub caller_id: i64,
    pub is_group: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub text: String,
    pub format: TextFormat,
}

impl CommandReply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
        }
    }

    fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Html,
        }
    }
}

pub struct CommandService {
    group_id: i64,
    registry: Arc<MembershipRegistry>,
    audit: Arc<AuditLog>,
    gateway: Gateway,
    notifier: Arc<AdminNotifier>,
}

impl CommandService {
    pub fn new(
        group_id: i64,
        registry: Arc<MembershipRegistry>,
        audit: Arc<AuditLog>,
        gateway: Gateway,
        notifier: Arc<AdminNotifier>,
    ) -> Self {
        Self {
            group_id,
            registry,
            audit,
            gateway,
            notifier,
        }
    }

    /// Execute a command and send the reply back to the originating chat.
    pub async fn handle(&self, ctx: CommandContext, command: Command) -> CommandReply {
        let reply = self.execute(ctx, command).await;
        if !self.gateway.send(ctx.chat_id, &reply.text, reply.format).await {
            log::warn!("Reply to command in chat {} was not delivered", ctx.chat_id);
        }
        reply
    }

    pub async fn execute(&self, ctx: CommandContext, command: Command) -> CommandReply {
        log::info!("Command {:?} from user {} in chat {}", command, ctx.caller_id, ctx.chat_id);

        if command.requires_admin() && !self.is_admin(ctx).await {
            return CommandReply::plain("❌ Only group admins can use this command.");
        }

        match command {
            Command::Start => CommandReply::plain("✅ Bot is active!"),
            Command::Test => self.test(ctx).await,
            Command::Analytics => self.analytics(),
            Command::NotificationsStatus => CommandReply::html(message_utils::notification_status(
                self.notifier.is_enabled(),
                self.notifier.target(),
                self.registry.pending_count(),
            )),
            Command::NotificationsOn => {
                self.notifier.set_enabled(true);
                CommandReply::plain("✅ Admin notifications enabled!")
            }
            Command::NotificationsOff => {
                self.notifier.set_enabled(false);
                CommandReply::plain("❌ Admin notifications disabled!")
            }
            Command::TestAdminNotification => self.test_admin_notification().await,
            Command::AddUser(arg) => self.add_user(&arg).await,
        }
    }

    /// Admin rights are checked in the chat the command was sent in; private
    /// chats are checked against the managed group.
    async fn is_admin(&self, ctx: CommandContext) -> bool {
        let chat = if ctx.is_group { ctx.chat_id } else { self.group_id };
        match self.gateway.member_status(chat, ctx.caller_id).await {
            Some(status) => status.is_admin(),
            None => false,
        }
    }

    async fn test(&self, ctx: CommandContext) -> CommandReply {
        if ctx.is_group {
            let notice = "🧪 Test: Bot is responding to messages in this group!";
            if !self.gateway.send(ctx.chat_id, notice, TextFormat::Plain).await {
                return CommandReply::plain("❌ Bot test failed. Check logs.");
            }
        }
        CommandReply::plain("✅ Bot is working! Test message received.")
    }

    fn analytics(&self) -> CommandReply {
        match self.audit.summary(RECENT_LIMIT) {
            Ok(summary) => CommandReply::plain(message_utils::analytics_report(&summary)),
            Err(e) => {
                log::error!("Failed to read audit log {}: {:#}", self.audit.path().display(), e);
                CommandReply::plain(format!("Error reading analytics: {}", e))
            }
        }
    }

    async fn test_admin_notification(&self) -> CommandReply {
        if self.notifier.target().is_none() {
            return CommandReply::plain("❌ No admin chat configured.");
        }
        let sample = message_utils::admin_verification_success(123456789, "test_user", 5, Some("test_wallet"));
        if self.notifier.send_now(&sample).await {
            CommandReply::plain("✅ Test admin notification sent!")
        } else {
            CommandReply::plain("❌ Test admin notification was not delivered (notifications may be disabled).")
        }
    }

    async fn add_user(&self, arg: &str) -> CommandReply {
        let Ok(user_id) = arg.trim().parse::<i64>() else {
            return CommandReply::plain("❌ Usage: /add_user <user_id>");
        };

        let Some(record) = self.registry.get_verified(user_id) else {
            return CommandReply::plain(format!(
                "❌ User {} is not verified. They need to complete verification first.",
                user_id
            ));
        };

        if !self.gateway.unban(self.group_id, user_id).await {
            log::warn!("Could not lift ban for manually added user {}", user_id);
        }
        let announcement = message_utils::manual_add_announcement(&record);
        if !self.gateway.send(self.group_id, &announcement, TextFormat::Html).await {
            log::warn!("Manual add announcement for user {} was not delivered", user_id);
        }
        log::info!("User {} re-admitted manually", user_id);
        CommandReply::plain(format!("✅ User {} has been added to the group.", user_id))
    }
}
