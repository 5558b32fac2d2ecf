use crate::error::{EconomicsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const KEEP_DECIMALS: u32 = 18;
pub const KEEP_BASE_UNIT: u128 = 1_000_000_000_000_000_000; // 10^18

/// Basis-point denominator used by every percentage in the market
pub const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub fn from_keep(whole: u64) -> Self {
        Self(whole as u128 * KEEP_BASE_UNIT)
    }

    pub const fn to_base_units(&self) -> u128 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul(&self, factor: u128) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    pub fn checked_div(&self, divisor: u128) -> Option<Self> {
        self.0.checked_div(divisor).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self * bps / 10_000`, rounded down.
    pub fn mul_bps(&self, bps: u32) -> Self {
        // Split to avoid overflowing on the intermediate product.
        let whole = self.0 / BPS_DENOMINATOR;
        let rem = self.0 % BPS_DENOMINATOR;
        Self(whole * bps as u128 + rem * bps as u128 / BPS_DENOMINATOR)
    }

    /// Checked addition reporting which balance overflowed.
    pub fn try_add(&self, other: Self, what: &str) -> Result<Self> {
        self.checked_add(other)
            .ok_or_else(|| EconomicsError::Overflow(what.to_string()))
    }

    /// Checked subtraction reporting which balance underflowed.
    pub fn try_sub(&self, other: Self, what: &str) -> Result<Self> {
        self.checked_sub(other)
            .ok_or_else(|| EconomicsError::Underflow(what.to_string()))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / KEEP_BASE_UNIT;
        let frac = self.0 % KEEP_BASE_UNIT;
        if frac == 0 {
            write!(f, "{} KEEP", whole)
        } else {
            let digits = format!("{:018}", frac);
            write!(f, "{}.{} KEEP", whole, digits.trim_end_matches('0'))
        }
    }
}

impl From<u128> for TokenAmount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(address: &str) -> Result<Self> {
        let trimmed = address.strip_prefix("0x").unwrap_or(address);
        let raw = hex::decode(trimmed)
            .map_err(|e| EconomicsError::InvalidAddress(format!("{}: {}", address, e)))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            EconomicsError::InvalidAddress(format!(
                "expected 32 bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Short form used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

/// Why funds left (or were routed inside) the market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferReason {
    /// Client paid more than the order cost
    OrderOverpayment,
    /// Unused escrow returned after an order ran to completion
    OrderRefund,
    /// Escrow returned after the owner cancelled
    CancellationRefund,
    /// Stake released by capacity shrink or unstake
    StakeReturn,
    /// Provider storage earnings
    RewardClaim,
    /// Share of a challenge-failure slash
    ReporterReward,
    /// Recipient pulled an accumulated refund
    RefundWithdrawal,
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferReason::OrderOverpayment => "order_overpayment",
            TransferReason::OrderRefund => "order_refund",
            TransferReason::CancellationRefund => "cancellation_refund",
            TransferReason::StakeReturn => "stake_return",
            TransferReason::RewardClaim => "reward_claim",
            TransferReason::ReporterReward => "reporter_reward",
            TransferReason::RefundWithdrawal => "refund_withdrawal",
        };
        f.write_str(label)
    }
}
