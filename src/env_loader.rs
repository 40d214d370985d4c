//! Environment-driven configuration.
//!
//! Required values (bot token, managed chat) are fatal when missing: the bot
//! must never fall back to a placeholder identity and act on the wrong chat.

use anyhow::{Context, Result, anyhow};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_VERIFY_PAGE_URL: &str = "https://admin-q2j7.onrender.com/";
const DEFAULT_VERIFIER_COMMAND: &str = "node ../test_js.js";

/// Load environment variables from a .env file.
pub fn load_env() {
    // Load .env file, ignore errors if file not found.
    dotenv().ok();
}

/// Runtime configuration for the bot and its webhook server.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub group_id: i64,
    pub admin_chat_id: Option<i64>,
    pub admin_notifications: bool,
    pub verify_page_url: Url,
    pub verification_timeout: Duration,
    pub port: u16,
    pub audit_log_path: PathBuf,
    pub lock_file: PathBuf,
    pub log_file: String,
    pub log_level: String,
    pub gateway_timeout: Duration,
    pub verifier: VerifierConfig,
}

/// Settings handed to the external NFT verifier.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub helius_api_key: Option<String>,
    pub collection_id: Option<String>,
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl BotConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = get("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
        let group_id = parse_required::<i64>(get("TELEGRAM_GROUP_ID"), "TELEGRAM_GROUP_ID")?;
        let admin_chat_id = parse_optional::<i64>(get("ADMIN_CHAT_ID"), "ADMIN_CHAT_ID")?;
        let admin_notifications = get("ADMIN_NOTIFICATIONS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let verify_page = get("VERIFY_PAGE_URL").unwrap_or_else(|| DEFAULT_VERIFY_PAGE_URL.to_string());
        let verify_page_url = Url::parse(&verify_page)
            .with_context(|| format!("VERIFY_PAGE_URL is not a valid URL: {}", verify_page))?;

        let timeout_secs = parse_optional::<u64>(get("VERIFICATION_TIMEOUT_SECS"), "VERIFICATION_TIMEOUT_SECS")?
            .unwrap_or(600);
        if timeout_secs == 0 {
            return Err(anyhow!("VERIFICATION_TIMEOUT_SECS must be greater than zero"));
        }
        let port = parse_optional::<u16>(get("PORT"), "PORT")?.unwrap_or(5000);
        let gateway_secs =
            parse_optional::<u64>(get("GATEWAY_TIMEOUT_SECS"), "GATEWAY_TIMEOUT_SECS")?.unwrap_or(10);
        let verifier_secs =
            parse_optional::<u64>(get("VERIFIER_TIMEOUT_SECS"), "VERIFIER_TIMEOUT_SECS")?.unwrap_or(30);

        let command: Vec<String> = get("VERIFIER_COMMAND")
            .unwrap_or_else(|| DEFAULT_VERIFIER_COMMAND.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(BotConfig {
            bot_token,
            group_id,
            admin_chat_id,
            admin_notifications,
            verify_page_url,
            verification_timeout: Duration::from_secs(timeout_secs),
            port,
            audit_log_path: PathBuf::from(get("AUDIT_LOG_PATH").unwrap_or_else(|| "analytics.json".into())),
            lock_file: PathBuf::from(get("LOCK_FILE").unwrap_or_else(|| "bot_server.lock".into())),
            log_file: get("LOG_FILE_PATH").unwrap_or_else(|| "logs/bot.log".into()),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            gateway_timeout: Duration::from_secs(gateway_secs),
            verifier: VerifierConfig {
                helius_api_key: get("HELIUS_API_KEY"),
                collection_id: get("COLLECTION_ID"),
                command,
                timeout: Duration::from_secs(verifier_secs),
            },
        })
    }
}

fn parse_required<T>(value: Option<String>, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = value.ok_or_else(|| anyhow!("{} is not set", key))?;
    raw.parse::<T>()
        .with_context(|| format!("{} has an invalid value: {}", key, raw))
}

fn parse_optional<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map(|raw| parse_required(Some(raw), key)).transpose()
}
