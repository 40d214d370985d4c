//! External NFT ownership check.
//!
//! The holder check itself lives outside this process. `SubprocessVerifier`
//! runs the configured command with the wallet and collection in its
//! environment and reads the holding count from its stdout.

use crate::env_loader::VerifierConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

/// Result of an ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NftCheck {
    pub ok: bool,
    pub nft_count: u64,
}

impl NftCheck {
    fn denied() -> Self {
        Self::default()
    }

    fn holding(nft_count: u64) -> Self {
        Self {
            ok: nft_count > 0,
            nft_count,
        }
    }
}

#[async_trait]
pub trait NftVerifier: Send + Sync {
    async fn verify(&self, wallet_address: &str) -> Result<NftCheck>;
}

pub struct SubprocessVerifier {
    config: VerifierConfig,
    count_pattern: Regex,
}

impl SubprocessVerifier {
    pub fn new(config: VerifierConfig) -> Result<Self> {
        if config.command.is_empty() {
            anyhow::bail!("VERIFIER_COMMAND is empty");
        }
        let count_pattern = Regex::new(r"has (\d+) NFTs").context("invalid NFT count pattern")?;
        Ok(Self {
            config,
            count_pattern,
        })
    }

    /// Interpret the verifier's stdout.
    pub fn parse_output(&self, output: &str) -> Option<NftCheck> {
        if let Some(caps) = self.count_pattern.captures(output) {
            return caps[1].parse::<u64>().ok().map(NftCheck::holding);
        }
        if output.contains("has no NFTs") {
            return Some(NftCheck::denied());
        }
        None
    }
}

#[async_trait]
impl NftVerifier for SubprocessVerifier {
    async fn verify(&self, wallet_address: &str) -> Result<NftCheck> {
        let (Some(api_key), Some(collection)) = (&self.config.helius_api_key, &self.config.collection_id) else {
            log::warn!("Missing HELIUS_API_KEY or COLLECTION_ID; treating wallet as unverified");
            return Ok(NftCheck::denied());
        };

        let program = &self.config.command[0];
        let mut cmd = Command::new(program);
        cmd.args(&self.config.command[1..])
            .env("HELIUS_API_KEY", api_key)
            .env("COLLECTION_ID", collection)
            .env("WALLET_ADDRESS", wallet_address)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        log::info!("Running verifier for wallet {}", wallet_address);
        let output = match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                log::error!("Failed to run verifier {}: {}", program, e);
                return Ok(NftCheck::denied());
            }
            Err(_) => {
                log::warn!("Verifier timed out after {:?}", self.config.timeout);
                return Ok(NftCheck::denied());
            }
        };

        if !output.status.success() {
            log::warn!(
                "Verifier exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(NftCheck::denied());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match self.parse_output(&stdout) {
            Some(check) => {
                log::info!("Wallet {} holds {} NFTs", wallet_address, check.nft_count);
                Ok(check)
            }
            None => {
                log::warn!("Could not determine NFT count from verifier output");
                Ok(NftCheck::denied())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(script: &str) -> VerifierConfig {
        VerifierConfig {
            helius_api_key: Some("key".into()),
            collection_id: Some("collection".into()),
            command: vec!["sh".into(), "-c".into(), script.into()],
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_parse_output() {
        let verifier = SubprocessVerifier::new(config("true")).unwrap();
        assert_eq!(
            verifier.parse_output("Wallet abc has 3 NFTs in collection"),
            Some(NftCheck { ok: true, nft_count: 3 })
        );
        assert_eq!(verifier.parse_output("Wallet abc has 0 NFTs"), Some(NftCheck::denied()));
        assert_eq!(verifier.parse_output("Wallet abc has no NFTs"), Some(NftCheck::denied()));
        assert_eq!(verifier.parse_output("rate limited"), None);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let mut cfg = config("true");
        cfg.command.clear();
        assert!(SubprocessVerifier::new(cfg).is_err());
    }

    #[tokio::test]
    async fn test_subprocess_receives_wallet() {
        let verifier = SubprocessVerifier::new(config(r#"echo "Wallet $WALLET_ADDRESS has 2 NFTs""#)).unwrap();
        let check = verifier.verify("Wxyz").await.unwrap();
        assert_eq!(check, NftCheck { ok: true, nft_count: 2 });
    }

    #[tokio::test]
    async fn test_failing_subprocess_denies() {
        let verifier = SubprocessVerifier::new(config("echo 'has 5 NFTs'; exit 1")).unwrap();
        assert_eq!(verifier.verify("Wxyz").await.unwrap(), NftCheck::denied());
    }

    #[tokio::test]
    async fn test_missing_credentials_deny_without_running() {
        let mut cfg = config("exit 1");
        cfg.helius_api_key = None;
        let verifier = SubprocessVerifier::new(cfg).unwrap();
        assert_eq!(verifier.verify("Wxyz").await.unwrap(), NftCheck::denied());
    }

    #[tokio::test]
    async fn test_missing_program_denies() {
        let mut cfg = config("true");
        cfg.command = vec!["nft-gate-no-such-verifier".into()];
        let verifier = SubprocessVerifier::new(cfg).unwrap();
        assert_eq!(verifier.verify("Wxyz").await.unwrap(), NftCheck::denied());
    }

    #[tokio::test]
    async fn test_slow_subprocess_times_out() {
        let mut cfg = config("sleep 5; echo 'has 1 NFTs'");
        cfg.timeout = Duration::from_millis(100);
        let verifier = SubprocessVerifier::new(cfg).unwrap();
        assert_eq!(verifier.verify("Wxyz").await.unwrap(), NftCheck::denied());
    }
}
