//! Telegram adapter: the Bot API behind [`GroupGateway`], and the update
//! dispatcher that feeds joins and commands into the services.

use crate::commands::{Command, CommandContext, CommandService};
use crate::gateway::{GroupGateway, MemberStatus, TextFormat};
use crate::join_handler::{JoinEvent, JoinHandler, JoinedMember};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, ParseMode, User};
use teloxide::update_listeners::Polling;

fn user_id(id: i64) -> Result<UserId> {
    let raw = u64::try_from(id).with_context(|| format!("invalid Telegram user id {}", id))?;
    Ok(UserId(raw))
}

fn member_status(kind: &ChatMemberKind) -> MemberStatus {
    match kind {
        ChatMemberKind::Owner(_) => MemberStatus::Creator,
        ChatMemberKind::Administrator(_) => MemberStatus::Administrator,
        ChatMemberKind::Member => MemberStatus::Member,
        ChatMemberKind::Restricted(_) => MemberStatus::Restricted,
        ChatMemberKind::Left => MemberStatus::Left,
        ChatMemberKind::Banned(_) => MemberStatus::Banned,
    }
}

pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl GroupGateway for TelegramGateway {
    async fn send_message(&self, chat_id: i64, text: &str, format: TextFormat) -> Result<()> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        match format {
            TextFormat::Plain => request.await?,
            TextFormat::Html => request.parse_mode(ParseMode::Html).await?,
            TextFormat::HtmlNoPreview => {
                request
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
                    .await?
            }
        };
        Ok(())
    }

    async fn ban_member(&self, chat_id: i64, user: i64) -> Result<()> {
        self.bot.ban_chat_member(ChatId(chat_id), user_id(user)?).await?;
        Ok(())
    }

    async fn unban_member(&self, chat_id: i64, user: i64) -> Result<()> {
        // without only_if_banned Telegram also removes a present member
        self.bot
            .unban_chat_member(ChatId(chat_id), user_id(user)?)
            .only_if_banned(true)
            .await?;
        Ok(())
    }

    async fn member_status(&self, chat_id: i64, user: i64) -> Result<MemberStatus> {
        let member = self.bot.get_chat_member(ChatId(chat_id), user_id(user)?).await?;
        Ok(member_status(&member.kind))
    }

    async fn create_invite_link(&self, chat_id: i64) -> Result<String> {
        let link = self.bot.create_chat_invite_link(ChatId(chat_id)).await?;
        Ok(link.invite_link)
    }
}

fn joined_member(user: &User) -> JoinedMember {
    JoinedMember {
        user_id: user.id.0 as i64,
        display_name: user
            .username
            .clone()
            .unwrap_or_else(|| user.first_name.clone()),
        is_bot: user.is_bot,
    }
}

async fn on_new_members(msg: Message, members: Vec<User>, joins: Arc<JoinHandler>) -> Result<()> {
    let event = JoinEvent {
        chat_id: msg.chat.id.0,
        members: members.iter().map(joined_member).collect(),
    };
    joins.handle(&event).await;
    Ok(())
}

async fn on_command(msg: Message, cmd: Command, commands: Arc<CommandService>) -> Result<()> {
    let Some(caller) = msg.from() else {
        return Ok(());
    };
    let ctx = CommandContext {
        chat_id: msg.chat.id.0,
        caller_id: caller.id.0 as i64,
        is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
    };
    commands.handle(ctx, cmd).await;
    Ok(())
}

fn schema() -> UpdateHandler<anyhow::Error> {
    Update::filter_message()
        .branch(
            dptree::filter_map(|msg: Message| msg.new_chat_members().map(|users| users.to_vec()))
                .endpoint(on_new_members),
        )
        .branch(teloxide::filter_command::<Command, _>().endpoint(on_command))
}

/// Long polling that skips updates queued while the bot was offline, so stale
/// joins are never re-registered.
fn update_listener(bot: Bot) -> Polling<Bot> {
    Polling::builder(bot).drop_pending_updates().build()
}

/// Poll for updates until Ctrl-C.
pub async fn run(bot: Bot, joins: Arc<JoinHandler>, commands: Arc<CommandService>) {
    log::info!("Starting Telegram polling (pending updates dropped)");
    let listener = update_listener(bot.clone());
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![joins, commands])
        .default_handler(|upd| async move {
            log::trace!("Unhandled update {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Dispatcher error"))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("Update listener error"),
        )
        .await;
}
