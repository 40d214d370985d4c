//! Chat message texts.
//!
//! Everything user-supplied (display names, wallets) is HTML-escaped before it
//! is interpolated into an HTML message.

use crate::audit_log::{AnalyticsSummary, AuditStatus};
use crate::pending::VerifiedRecord;
use chrono::{DateTime, Local};
use std::time::Duration;
use teloxide::utils::html::escape;

const COMMUNITY_NAME: &str = "Meta Betties";

/// Whole minutes in a verification window, rounded up.
pub fn window_minutes(window: Duration) -> u64 {
    window.as_secs().div_ceil(60)
}

/// Shorten a wallet address to `first8...last8`.
pub fn short_wallet(wallet: Option<&str>) -> String {
    let Some(wallet) = wallet.filter(|w| !w.is_empty() && *w != "N/A") else {
        return "N/A".to_string();
    };
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 16 {
        return wallet.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{}...{}", head, tail)
}

fn now_local() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn welcome_message(username: &str, verify_link: &str, window: Duration) -> String {
    let link = escape(verify_link);
    format!(
        "🎉 <b>Welcome to {community} Private Key!</b>\n\n\
         👋 Hi @{name}, we're excited to have you join our exclusive community!\n\n\
         🔐 <b>Verification Required</b>\n\
         To access this private group, you must verify your NFT ownership.\n\n\
         🔗 <b>Click here to verify:</b> <a href=\"{link}\">Verify NFT Ownership</a>\n\n\
         📋 <b>Or copy this link:</b>\n<code>{link}</code>\n\n\
         ⏰ <b>Time Limit:</b> You have {minutes} minutes to complete verification, or you'll be automatically removed.\n\n\
         🔄 <b>Multiple Verifications:</b> You can verify multiple times with the same Telegram ID.\n\n\
         Need help? Contact an admin!",
        community = COMMUNITY_NAME,
        name = escape(username),
        link = link,
        minutes = window_minutes(window),
    )
}

pub fn welcome_fallback(username: &str) -> String {
    format!(
        "👋 Welcome @{}! Please verify your NFT ownership to stay in this group.",
        escape(username)
    )
}

pub fn verification_success(username: &str) -> String {
    format!(
        "✅ <b>Verification Successful!</b>\n\n\
         🎉 Congratulations @{}!\n\n\
         💎 You have been verified as an NFT holder.\n\n\
         🔐 <b>Access Granted:</b> You should now have access to this private group.\n\n\
         🔄 <b>Multiple Verifications:</b> You can verify again anytime with the same Telegram ID.\n\n\
         📱 <b>If you were removed during verification:</b> You can rejoin the group using the link in your verification page.\n\n\
         Welcome to the {} community! 🚀",
        escape(username),
        COMMUNITY_NAME
    )
}

pub fn verification_failed(username: &str) -> String {
    format!(
        "❌ <b>Verification Failed</b>\n\n\
         😔 Sorry @{}, your verification was unsuccessful.\n\n\
         🚫 <b>Access Denied:</b> You do not have the required NFT to access this private group.\n\n\
         💎 <b>Requirements:</b> You must own at least one NFT to join this group.\n\n\
         🔄 <b>Try Again:</b> You can try again anytime by rejoining the group.\n\n\
         You will be removed from the group now.",
        escape(username)
    )
}

pub fn admin_user_joined(user_id: i64, username: &str, window: Duration) -> String {
    format!(
        "👋 <b>New User Joined</b>\n\n\
         👤 <b>User:</b> @{} (ID: {})\n\
         ⏰ <b>Time:</b> {}\n\
         ⏳ <b>Status:</b> Pending verification ({} min timer started)\n\
         🔗 <b>Verification link sent to group.</b>",
        escape(username),
        user_id,
        now_local(),
        window_minutes(window)
    )
}

pub fn admin_verification_success(user_id: i64, username: &str, nft_count: u64, wallet: Option<&str>) -> String {
    format!(
        "✅ <b>Verification Success</b>\n\n\
         👤 <b>User:</b> @{} (ID: {})\n\
         💎 <b>NFTs Found:</b> {}\n\
         💰 <b>Wallet:</b> {}\n\
         ⏰ <b>Time:</b> {}\n\n\
         🎉 User has been granted access to the group!",
        escape(username),
        user_id,
        nft_count,
        escape(&short_wallet(wallet)),
        now_local()
    )
}

pub fn admin_verification_failed(user_id: i64, username: &str, reason: &str, wallet: Option<&str>) -> String {
    format!(
        "❌ <b>Verification Failed</b>\n\n\
         👤 <b>User:</b> @{} (ID: {})\n\
         🚫 <b>Reason:</b> {}\n\
         💰 <b>Wallet:</b> {}\n\
         ⏰ <b>Time:</b> {}\n\n\
         😔 User has been removed from the group.",
        escape(username),
        user_id,
        escape(reason),
        escape(&short_wallet(wallet)),
        now_local()
    )
}

pub fn timeout_reason(window: Duration) -> String {
    format!("Verification timeout ({} minutes)", window_minutes(window))
}

fn format_epoch(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract() * 1e9) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "unknown time".to_string(),
    }
}

/// Plain-text analytics report.
pub fn analytics_report(summary: &AnalyticsSummary) -> String {
    let mut msg = format!(
        "📊 Group Analytics:\nTotal verified: {}\nTotal removed: {}\n\nRecent activity:\n",
        summary.total_verified, summary.total_removed
    );
    for entry in &summary.recent {
        let status = match entry.status {
            AuditStatus::Verified => "verified",
            AuditStatus::Removed => "removed",
        };
        msg.push_str(&format!(
            "@{} - {} ({})\n",
            entry.username,
            status,
            format_epoch(entry.timestamp)
        ));
    }
    msg
}

pub fn notification_status(enabled: bool, admin_chat_id: Option<i64>, pending: usize) -> String {
    let admin = admin_chat_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "Not set".to_string());
    format!(
        "📢 <b>Admin Notification Settings</b>\n\n\
         🔔 <b>Status:</b> {}\n\
         👤 <b>Admin Chat ID:</b> {}\n\
         📊 <b>Pending Verifications:</b> {}\n\n\
         <b>Notifications Sent:</b>\n\
         ✅ User joins group\n\
         ✅ Verification success\n\
         ✅ Verification failed\n\
         ✅ Timeout removal\n\n\
         <b>Commands:</b>\n\
         /notifications_on - Enable notifications\n\
         /notifications_off - Disable notifications\n\
         /notifications_status - Show this status",
        if enabled { "✅ Enabled" } else { "❌ Disabled" },
        admin,
        pending
    )
}

pub fn manual_add_announcement(record: &VerifiedRecord) -> String {
    format!(
        "✅ <b>User Added Manually</b>\n\n\
         👤 <b>User:</b> @{} (ID: {})\n\
         💎 <b>NFT Count:</b> {}\n\
         ⏰ <b>Verified:</b> {}\n\n\
         Welcome to the {} community! 🚀",
        escape(&record.username),
        record.user_id,
        record.nft_count,
        record
            .verified_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        COMMUNITY_NAME
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_log::{AuditEntry, AuditReason};

    #[test]
    fn test_short_wallet() {
        assert_eq!(short_wallet(None), "N/A");
        assert_eq!(short_wallet(Some("N/A")), "N/A");
        assert_eq!(short_wallet(Some("short")), "short");
        assert_eq!(
            short_wallet(Some("ABCDEFGH1234567890ZYXWVUTS")),
            "ABCDEFGH...ZYXWVUTS"
        );
    }

    #[test]
    fn test_window_minutes_rounds_up() {
        assert_eq!(window_minutes(Duration::from_secs(600)), 10);
        assert_eq!(window_minutes(Duration::from_secs(90)), 2);
    }

    #[test]
    fn test_welcome_contains_link_and_deadline() {
        let text = welcome_message("alice", "https://verify.example/?tg_id=42", Duration::from_secs(600));
        assert!(text.contains("href=\"https://verify.example/?tg_id=42\""));
        assert!(text.contains("10 minutes"));
        assert!(text.contains("@alice"));
    }

    #[test]
    fn test_names_are_escaped() {
        let text = verification_failed("<script>");
        assert!(text.contains("&lt;script&gt;"));
        assert!(!text.contains("<script>"));
    }

    #[test]
    fn test_analytics_report_lists_recent() {
        let summary = AnalyticsSummary {
            total_verified: 1,
            total_removed: 1,
            recent: vec![
                AuditEntry::verified(1, "alice", 2, "W"),
                AuditEntry::removed(2, "bob", AuditReason::Timeout, None),
            ],
        };
        let report = analytics_report(&summary);
        assert!(report.contains("Total verified: 1"));
        assert!(report.contains("Total removed: 1"));
        let alice = report.find("@alice - verified").unwrap();
        let bob = report.find("@bob - removed").unwrap();
        assert!(alice < bob);
    }
}
