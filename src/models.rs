//! Shared data structures used throughout the application.

use ethers::types::{Address, TxHash};
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

/// Market data read from the chain at session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketSnapshot {
    /// DAI cost of 1 ETH.
    pub eth_price_in_dai: f64,
    /// Largest ETH amount a single position may lock.
    pub max_eth_per_transaction: f64,
    #[serde(skip)]
    pub fetched_at: SystemTime,
}

impl MarketSnapshot {
    /// Whole seconds since the snapshot was read. 0 if the clock went backwards.
    pub fn age_secs(&self) -> u64 {
        self.fetched_at.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// Connected account and its ETH balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountState {
    pub address: Address,
    pub eth_balance: f64,
}

/// Everything a single refresh reads. Replaced wholesale on apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketData {
    pub snapshot: MarketSnapshot,
    pub account: Option<AccountState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionInput {
    pub eth_amount: f64,
    /// Rehypothecation rate in percent (e.g. 50 for 50%).
    pub ratio_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Danger,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Safe => f.write_str("safe"),
            RiskLevel::Danger => f.write_str("danger"),
        }
    }
}

/// Calculator output. Never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionProjection {
    pub total_collateral_eth: f64,
    pub total_debt_dai: f64,
    pub liquidation_price_dai: f64,
    pub expected_return_dai: f64,
    /// Inverse of the ratio in percent; 0 when the ratio is 0.
    pub collateralization_rate_percent: u32,
    pub risk_level: RiskLevel,
}

impl PositionProjection {
    /// Labelled rows as shown to the user.
    pub fn summary_rows(&self, eth_price: f64) -> Vec<(&'static str, String)> {
        vec![
            ("Current ETH price", format!("${:.2}", eth_price)),
            (
                "Expected Collateral (ETH)",
                format!("{:.3}", self.total_collateral_eth),
            ),
            ("Expected Debt (DAI)", format!("{:.2}", self.total_debt_dai)),
            (
                "Expected Change (DAI)",
                format!("{:.2}", self.expected_return_dai),
            ),
            (
                "Expected Liquidation Price",
                format!("${:.2}", self.liquidation_price_dai),
            ),
            (
                "Expected Collateralization Rate",
                format!("{}%", self.collateralization_rate_percent),
            ),
            ("Expected Status", self.risk_level.to_string()),
        ]
    }
}

/// Outcome of the latest submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Loading,
    Ready,
    Submitting,
}

/// Arguments of the leverage contract call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubmissionRequest {
    pub collateral_eth: f64,
    pub debt_dai: f64,
    pub account: Address,
    /// ETH sent along with the call.
    pub value_eth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Notifications raised by the wallet or provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEvent {
    /// The active account changed. `None` keeps the current one.
    AccountChanged(Option<Address>),
    NetworkChanged { chain_id: u64 },
}
