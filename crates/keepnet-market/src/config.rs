use crate::error::{MarketError, Result};
use anyhow::Context;
use keepnet_economics::{TokenAmount, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Hard ceiling on the reporter share of a challenge-failure slash.
pub const REPORTER_BPS_CEILING: u32 = 5_000;

/// Economic constants and operational bounds of the market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Billing period length in seconds
    pub period_secs: u64,
    pub periods_per_epoch: u64,
    /// Proof submission step length in seconds
    pub step_secs: u64,
    /// Steps after a round's own step during which proofs are accepted
    pub proof_window_steps: u64,
    /// Stake per byte of capacity, in base units
    pub stake_per_byte: u64,
    /// Periods of revenue slashed when a provider quits early
    pub quit_slash_periods: u64,
    pub cancel_penalty_bps: u32,
    /// Extra share of remaining stake taken when a slash forces an exit
    pub forced_exit_penalty_bps: u32,
    pub primary_failure_slash_periods: u64,
    pub secondary_failure_slash_periods: u64,
    pub reporter_bps: u32,
    pub max_reporter_bps: u32,
    pub max_orders_per_node: usize,
    pub max_replicas_per_order: u32,
    pub challenge_sample_size: usize,
    pub max_cleanup_per_heartbeat: usize,
    pub cleanup_scan_limit: usize,
    pub max_lingering_rounds: usize,
    /// Events retained by the in-memory log
    pub event_history: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            period_secs: 7 * 24 * 60 * 60,
            periods_per_epoch: 4,
            step_secs: 30,
            proof_window_steps: 1,
            stake_per_byte: 1_000_000_000,
            quit_slash_periods: 3,
            cancel_penalty_bps: 1_000,
            forced_exit_penalty_bps: 5_000,
            primary_failure_slash_periods: 4,
            secondary_failure_slash_periods: 1,
            reporter_bps: 1_000,
            max_reporter_bps: REPORTER_BPS_CEILING,
            max_orders_per_node: 256,
            max_replicas_per_order: 16,
            challenge_sample_size: 8,
            max_cleanup_per_heartbeat: 16,
            cleanup_scan_limit: 64,
            max_lingering_rounds: 8,
            event_history: 1_024,
        }
    }
}

impl MarketConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("parsing market config")?;
        config.validate().context("validating market config")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading market config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("serializing market config")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing market config {}", path.display()))?;
        Ok(())
    }

    pub fn stake_per_byte(&self) -> TokenAmount {
        TokenAmount::from_base_units(self.stake_per_byte as u128)
    }

    pub fn validate(&self) -> Result<()> {
        let bps_limit = BPS_DENOMINATOR as u32;
        let checks: [(bool, &str); 15] = [
            (self.period_secs == 0, "period_secs must be positive"),
            (self.periods_per_epoch == 0, "periods_per_epoch must be positive"),
            (self.step_secs == 0, "step_secs must be positive"),
            (self.stake_per_byte == 0, "stake_per_byte must be positive"),
            (self.cancel_penalty_bps > bps_limit, "cancel_penalty_bps exceeds 10000"),
            (
                self.forced_exit_penalty_bps > bps_limit,
                "forced_exit_penalty_bps exceeds 10000",
            ),
            (
                self.max_reporter_bps > REPORTER_BPS_CEILING,
                "max_reporter_bps exceeds 5000",
            ),
            (
                self.reporter_bps > self.max_reporter_bps,
                "reporter_bps exceeds max_reporter_bps",
            ),
            (self.max_orders_per_node == 0, "max_orders_per_node must be positive"),
            (self.max_replicas_per_order == 0, "max_replicas_per_order must be positive"),
            (self.challenge_sample_size == 0, "challenge_sample_size must be positive"),
            (
                self.max_cleanup_per_heartbeat == 0,
                "max_cleanup_per_heartbeat must be positive",
            ),
            (self.cleanup_scan_limit == 0, "cleanup_scan_limit must be positive"),
            (self.max_lingering_rounds == 0, "max_lingering_rounds must be positive"),
            (self.event_history == 0, "event_history must be positive"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(MarketError::Config(reason.to_string())),
            None => Ok(()),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for `keepnet_*` targets
    pub level: String,
    /// `pretty` or `compact`
    pub format: String,
    pub show_target: bool,
    /// Per-module level overrides
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            show_target: true,
            module_filters: HashMap::new(),
        }
    }
}
