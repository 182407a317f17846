use crate::chain::{Ledger, TransactionSubmitter};
use crate::errors::{AppError, Result};
use crate::models::{SubmissionReceipt, SubmissionRequest};
use crate::utils::{from_wei, to_wei};
use async_trait::async_trait;
use ethers::{
    contract::{ContractError, abigen},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::LocalWallet,
    types::Address,
    utils::WEI_IN_ETHER,
};
use std::sync::Arc;
use tracing::{debug, info};

abigen!(
    UniswapFactory,
    r"[
        function getExchange(address token) view returns (address)
    ]",
);

abigen!(
    UniswapExchange,
    r"[
        function getTokenToEthOutputPrice(uint256 eth_bought) view returns (uint256)
    ]",
);

abigen!(
    LeverageContract,
    r"[
        function riskNewCDP(uint256 eth_to_lock, uint256 dai_to_draw, bool leverage) payable
    ]",
);

type SignerClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// Ledger reads over an HTTP JSON-RPC provider.
#[derive(Clone)]
pub struct EthLedger {
    provider: Arc<Provider<Http>>,
    factory: UniswapFactory<Provider<Http>>,
}

impl EthLedger {
    pub fn new(provider: Arc<Provider<Http>>, factory_address: Address) -> Self {
        let factory = UniswapFactory::new(factory_address, provider.clone());
        Self { provider, factory }
    }

    pub fn connect(rpc_url: &str, factory_address: Address) -> Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(rpc_url)?);
        Ok(Self::new(provider, factory_address))
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }
}

#[async_trait]
impl Ledger for EthLedger {
    async fn exchange_rate(&self, token: Address) -> Result<f64> {
        let exchange_address = self.factory.get_exchange(token).call().await?;
        if exchange_address.is_zero() {
            return Err(AppError::OracleUnavailable(format!(
                "factory has no exchange for token {token:?}"
            )));
        }
        let exchange = UniswapExchange::new(exchange_address, self.provider.clone());
        let price_wei = exchange
            .get_token_to_eth_output_price(WEI_IN_ETHER)
            .call()
            .await?;
        debug!(?exchange_address, %price_wei, "[ORACLE] exchange quote");
        from_wei(price_wei)
    }

    async fn contract_eth_balance(&self, contract: Address) -> Result<f64> {
        from_wei(self.provider.get_balance(contract, None).await?)
    }

    async fn account_eth_balance(&self, account: Address) -> Result<f64> {
        from_wei(self.provider.get_balance(account, None).await?)
    }
}

/// Signs and sends `riskNewCDP` calls to the leverage contract.
#[derive(Clone)]
pub struct EthSubmitter {
    leverage: LeverageContract<SignerClient>,
}

impl EthSubmitter {
    /// `wallet` must already carry the provider's chain id.
    pub fn new(provider: Arc<Provider<Http>>, wallet: LocalWallet, leverage_address: Address) -> Self {
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        Self {
            leverage: LeverageContract::new(leverage_address, client),
        }
    }

    pub fn address(&self) -> Address {
        self.leverage.client().address()
    }
}

#[async_trait]
impl TransactionSubmitter for EthSubmitter {
    async fn submit_leveraged_position(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionReceipt> {
        let collateral = to_wei(request.collateral_eth)?;
        let debt = to_wei(request.debt_dai)?;
        let value = to_wei(request.value_eth)?;

        let call = self
            .leverage
            .risk_new_cdp(collateral, debt, true)
            .value(value)
            .from(request.account);
        let pending = call.send().await.map_err(classify_contract_error)?;
        let tx_hash = *pending;
        info!(?tx_hash, %collateral, %debt, %value, "[SUBMIT] transaction sent");

        let receipt = pending
            .await
            .map_err(|e| AppError::SubmissionTransport(e.to_string()))?
            .ok_or_else(|| {
                AppError::SubmissionTransport(format!("transaction {tx_hash:?} was dropped"))
            })?;

        if receipt.status.is_some_and(|s| s.is_zero()) {
            return Err(AppError::SubmissionRejected {
                reason: format!("transaction {tx_hash:?} reverted"),
            });
        }

        Ok(SubmissionReceipt {
            tx_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
        })
    }
}

/// Reverts become `SubmissionRejected`; everything else is a transport failure.
fn classify_contract_error<M: Middleware>(err: ContractError<M>) -> AppError {
    if let Some(reason) = err.decode_revert::<String>() {
        return AppError::SubmissionRejected { reason };
    }
    if err.is_revert() {
        return AppError::SubmissionRejected {
            reason: err.to_string(),
        };
    }
    AppError::SubmissionTransport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Bytes;

    #[test]
    fn revert_is_rejection() {
        let err: ContractError<Provider<Http>> = ContractError::Revert(Bytes::from(vec![]));
        assert!(matches!(
            classify_contract_error(err),
            AppError::SubmissionRejected { .. }
        ));
    }

    #[test]
    fn decode_failure_is_transport_error() {
        let err: ContractError<Provider<Http>> =
            ContractError::DecodingError(ethers::abi::Error::InvalidData);
        assert!(matches!(
            classify_contract_error(err),
            AppError::SubmissionTransport(_)
        ));
    }
}
