mod audit_log;
mod callback_handler;
mod commands;
mod env_loader;
mod gateway;
mod instance_lock;
mod join_handler;
mod log_config;
mod message_utils;
mod notifier;
mod pending;
mod registry;
mod response;
mod scheduler;
mod telegram;
mod verifier;
mod webhook;

use crate::audit_log::AuditLog;
use crate::callback_handler::CallbackHandler;
use crate::commands::CommandService;
use crate::env_loader::{BotConfig, load_env};
use crate::gateway::Gateway;
use crate::instance_lock::InstanceLock;
use crate::join_handler::JoinHandler;
use crate::log_config::{init_logging, parse_level};
use crate::notifier::AdminNotifier;
use crate::registry::MembershipRegistry;
use crate::scheduler::TimeoutScheduler;
use crate::telegram::TelegramGateway;
use crate::verifier::SubprocessVerifier;
use crate::webhook::WebhookState;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;

const CALLBACK_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment (including .env) and configure logging
    load_env();
    let config = BotConfig::from_env()?;

    // ensure the log file's directory exists
    if let Some(parent) = PathBuf::from(&config.log_file).parent() {
        std::fs::create_dir_all(parent)?;
    }
    init_logging(&config.log_file, parse_level(&config.log_level))?;

    let _lock = InstanceLock::acquire(&config.lock_file)?;
    if let Some(parent) = config.audit_log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    log::info!("Managing group {}", config.group_id);
    match config.admin_chat_id {
        Some(id) => log::info!(
            "Admin notifications {} for chat {}",
            if config.admin_notifications { "enabled" } else { "disabled" },
            id
        ),
        None => log::warn!("ADMIN_CHAT_ID is not set; admin notifications are off"),
    }

    let bot = Bot::new(&config.bot_token);
    let gateway = Gateway::new(
        Arc::new(TelegramGateway::new(bot.clone())),
        config.gateway_timeout,
    );

    let registry = Arc::new(MembershipRegistry::new());
    let audit = Arc::new(AuditLog::new(&config.audit_log_path));
    let notifier = Arc::new(AdminNotifier::new(
        gateway.clone(),
        config.admin_chat_id,
        config.admin_notifications,
        config.verification_timeout,
    ));
    let scheduler = Arc::new(TimeoutScheduler::new(
        config.group_id,
        config.verification_timeout,
        registry.clone(),
        audit.clone(),
        gateway.clone(),
        notifier.clone(),
    ));
    let joins = Arc::new(JoinHandler::new(
        config.group_id,
        config.verify_page_url.clone(),
        registry.clone(),
        scheduler.clone(),
        gateway.clone(),
        notifier.clone(),
    ));
    let callbacks = Arc::new(CallbackHandler::new(
        config.group_id,
        registry.clone(),
        scheduler,
        audit.clone(),
        gateway.clone(),
        notifier.clone(),
    ));
    let commands = Arc::new(CommandService::new(
        config.group_id,
        registry,
        audit,
        gateway,
        notifier,
    ));

    let state = Arc::new(WebhookState {
        jobs: webhook::spawn_callback_worker(callbacks, CALLBACK_QUEUE_CAPACITY),
        verifier: Arc::new(SubprocessVerifier::new(config.verifier.clone())?),
    });
    let mut server = tokio::spawn(webhook::serve(config.port, state));

    // poll Telegram until shutdown signal or webhook failure
    tokio::select! {
        _ = telegram::run(bot, joins, commands) => {
            log::info!("Shutting down bot server.");
            server.abort();
        }
        result = &mut server => {
            match result {
                Ok(Ok(())) => log::warn!("Webhook server exited"),
                Ok(Err(e)) => {
                    log::error!("Webhook server failed: {:#}", e);
                    return Err(e);
                }
                Err(e) => anyhow::bail!("webhook server task failed: {}", e),
            }
        }
    }
    Ok(())
}
