//! On-chain collaborators consumed by the session.
//!
//! Responsibilities:
//! • Read the DAI/ETH exchange rate and ETH balances from the ledger.
//! • Send a leveraged position to the leverage contract.
//!
//! Both are traits so the session can be driven without a node.

use crate::errors::Result;
use crate::models::{SubmissionReceipt, SubmissionRequest};
use async_trait::async_trait;
use ethers::types::Address;

pub mod client;
pub mod oracle;

pub use client::{EthLedger, EthSubmitter};
pub use oracle::PriceOracleClient;

/// Read-only view of the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Units of `token` needed to buy exactly 1 ETH.
    async fn exchange_rate(&self, token: Address) -> Result<f64>;

    /// ETH held by a contract.
    async fn contract_eth_balance(&self, contract: Address) -> Result<f64>;

    /// ETH held by a user account.
    async fn account_eth_balance(&self, account: Address) -> Result<f64>;
}

/// Sends a validated position to the leverage contract.
///
/// Implementations fail with `AppError::SubmissionRejected` when the
/// contract reverts and `AppError::SubmissionTransport` when the request
/// never reaches a verdict.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn submit_leveraged_position(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionReceipt>;
}
