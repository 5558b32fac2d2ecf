use super::state::MarketState;
use super::StorageMarket;
use crate::error::{MarketError, Result};
use crate::events::MarketEvent;
use crate::types::SlashOutcome;
use keepnet_economics::{AccountAddress, TokenAmount};
use tracing::{info, warn};

impl StorageMarket {
    /// Name (or clear) the account allowed to slash nodes directly.
    pub fn set_authority(&self, caller: AccountAddress, authority: Option<AccountAddress>) -> Result<()> {
        self.execute("set_authority", |state, _| {
            state.require_owner(&caller)?;
            state.authority = authority;
            info!(authority = ?authority.map(|a| a.short()), "🛡️ Slashing authority changed");
            state.emit(MarketEvent::AuthorityChanged { authority });
            Ok(())
        })
    }

    pub fn set_reporter_bps(&self, caller: AccountAddress, bps: u32) -> Result<()> {
        self.execute("set_reporter_bps", |state, _| {
            state.require_owner(&caller)?;
            state.reporter.set_reporter_bps(bps)?;
            info!(bps, "🏅 Reporter share changed");
            state.emit(MarketEvent::ReporterBpsChanged { bps });
            Ok(())
        })
    }

    pub fn transfer_ownership(&self, caller: AccountAddress, new_owner: AccountAddress) -> Result<()> {
        self.execute("transfer_ownership", |state, _| {
            state.require_owner(&caller)?;
            let previous = std::mem::replace(&mut state.owner, new_owner);
            info!(previous = %previous, owner = %new_owner, "👑 Ownership transferred");
            state.emit(MarketEvent::OwnershipTransferred {
                previous,
                owner: new_owner,
            });
            Ok(())
        })
    }

    /// Slash a node by decision of the slashing authority. The whole amount is
    /// burned and a forced exit cascades if capacity collapses.
    pub fn authority_slash(
        &self,
        caller: AccountAddress,
        provider: AccountAddress,
        amount: TokenAmount,
    ) -> Result<SlashOutcome> {
        self.execute("authority_slash", |state, tick| {
            if state.authority != Some(caller) {
                return Err(MarketError::Unauthorized(format!(
                    "{} is not the slashing authority",
                    caller
                )));
            }
            let (outcome, _) = state.slash_node(provider, amount, tick, None)?;
            warn!(
                provider = %provider,
                authority = %caller,
                slashed = %outcome.total_slashed,
                forced_exit = outcome.forced_exit,
                "⚔️ Authority slash"
            );
            Ok(outcome)
        })
    }
}

impl MarketState {
    fn require_owner(&self, caller: &AccountAddress) -> Result<()> {
        if *caller != self.owner {
            return Err(MarketError::Unauthorized(format!(
                "{} is not the market owner",
                caller
            )));
        }
        Ok(())
    }
}
