use crate::config::REPORTER_BPS_CEILING;
use crate::error::{MarketError, Result};
use keepnet_economics::{AccountAddress, TokenAmount};
use std::collections::HashMap;
use tracing::debug;

/// How a challenge-failure slash is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlashSplit {
    pub reporter_reward: TokenAmount,
    pub burned: TokenAmount,
}

/// Reporter rewards for processing challenge failures.
pub struct ReporterIncentive {
    balances: HashMap<AccountAddress, TokenAmount>,
    reporter_bps: u32,
    max_reporter_bps: u32,
    total_owed: TokenAmount,
}

impl ReporterIncentive {
    pub fn new(reporter_bps: u32, max_reporter_bps: u32) -> Self {
        Self {
            balances: HashMap::new(),
            reporter_bps,
            max_reporter_bps: max_reporter_bps.min(REPORTER_BPS_CEILING),
            total_owed: TokenAmount::ZERO,
        }
    }

    pub fn reporter_bps(&self) -> u32 {
        self.reporter_bps
    }

    pub fn set_reporter_bps(&mut self, bps: u32) -> Result<()> {
        if bps > self.max_reporter_bps {
            return Err(MarketError::invalid(format!(
                "reporter share {} bps exceeds the cap of {} bps",
                bps, self.max_reporter_bps
            )));
        }
        self.reporter_bps = bps;
        Ok(())
    }

    /// Split a failure slash between the reporter and the burn.
    pub fn split(&self, total_slashed: TokenAmount) -> SlashSplit {
        let reporter_reward = total_slashed.mul_bps(self.reporter_bps);
        SlashSplit {
            reporter_reward,
            burned: total_slashed.saturating_sub(reporter_reward),
        }
    }

    pub(crate) fn credit(&mut self, reporter: AccountAddress, amount: TokenAmount) {
        if amount.is_zero() {
            return;
        }
        let balance = self.balances.entry(reporter).or_default();
        *balance = balance.saturating_add(amount);
        self.total_owed = self.total_owed.saturating_add(amount);
        debug!(reporter = %reporter, amount = %amount, balance = %balance, "🏅 Reporter credited");
    }

    pub(crate) fn take(&mut self, reporter: &AccountAddress) -> Result<TokenAmount> {
        let amount = self
            .balances
            .remove(reporter)
            .filter(|amount| !amount.is_zero())
            .ok_or(MarketError::NothingToClaim(*reporter))?;
        self.total_owed = self.total_owed.saturating_sub(amount);
        Ok(amount)
    }

    pub fn balance(&self, reporter: &AccountAddress) -> TokenAmount {
        self.balances.get(reporter).copied().unwrap_or_default()
    }

    pub fn total_owed(&self) -> TokenAmount {
        self.total_owed
    }
}
