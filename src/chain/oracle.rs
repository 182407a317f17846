use crate::chain::Ledger;
use crate::errors::{AppError, Result};
use crate::models::{AccountState, MarketData, MarketSnapshot};
use crate::utils::floor2;
use ethers::types::Address;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Largest ETH amount one position may lock so that a full loop at
/// `max_ratio_percent` stays within `margin` of the contract's balance.
///
/// `floor2(margin * balance / (r + r^2 + r^3))`, or 0 when the ratio is not
/// positive.
pub fn max_eth_capacity(contract_balance: f64, max_ratio_percent: f64, margin: f64) -> f64 {
    let r = max_ratio_percent / 100.0;
    let loop_share = r + r * r + r * r * r;
    if !loop_share.is_finite() || loop_share <= 0.0 {
        return 0.0;
    }
    floor2(contract_balance * margin / loop_share)
}

/// Reads market data for the DAI exchange and the leverage contract.
/// Keeps the most recent snapshot it produced.
pub struct PriceOracleClient {
    ledger: Arc<dyn Ledger>,
    dai_address: Address,
    leverage_address: Address,
    capacity_margin: f64,
    last_snapshot: RwLock<Option<MarketSnapshot>>,
}

impl PriceOracleClient {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        dai_address: Address,
        leverage_address: Address,
        capacity_margin: f64,
    ) -> Self {
        Self {
            ledger,
            dai_address,
            leverage_address,
            capacity_margin,
            last_snapshot: RwLock::new(None),
        }
    }

    /// DAI cost of 1 ETH.
    pub async fn fetch_eth_price(&self) -> Result<f64> {
        let price = self
            .ledger
            .exchange_rate(self.dai_address)
            .await
            .map_err(unavailable)?;
        if !price.is_finite() || price <= 0.0 {
            return Err(AppError::OracleUnavailable(format!(
                "exchange quoted a non-positive price: {price}"
            )));
        }
        Ok(price)
    }

    /// Per-transaction ETH ceiling derived from the leverage contract's balance.
    pub async fn fetch_max_eth_capacity(&self, max_ratio_percent: f64) -> Result<f64> {
        let balance = self
            .ledger
            .contract_eth_balance(self.leverage_address)
            .await
            .map_err(unavailable)?;
        let capacity = max_eth_capacity(balance, max_ratio_percent, self.capacity_margin);
        debug!(balance, capacity, "[ORACLE] leverage contract capacity");
        Ok(capacity)
    }

    pub async fn fetch_account_balance(&self, account: Address) -> Result<f64> {
        self.ledger
            .account_eth_balance(account)
            .await
            .map_err(unavailable)
    }

    /// Fetch price and capacity together and cache the result.
    pub async fn fetch_snapshot(&self, max_ratio_percent: f64) -> Result<MarketSnapshot> {
        let (eth_price_in_dai, max_eth_per_transaction) = tokio::try_join!(
            self.fetch_eth_price(),
            self.fetch_max_eth_capacity(max_ratio_percent)
        )?;
        let snapshot = MarketSnapshot {
            eth_price_in_dai,
            max_eth_per_transaction,
            fetched_at: SystemTime::now(),
        };
        *self
            .last_snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot);
        Ok(snapshot)
    }

    /// Snapshot plus, when an account is known, its balance.
    pub async fn fetch_market(
        &self,
        max_ratio_percent: f64,
        account: Option<Address>,
    ) -> Result<MarketData> {
        let snapshot = self.fetch_snapshot(max_ratio_percent).await?;
        let account = match account {
            Some(address) => Some(AccountState {
                address,
                eth_balance: self.fetch_account_balance(address).await?,
            }),
            None => None,
        };
        Ok(MarketData { snapshot, account })
    }

    pub fn cached_snapshot(&self) -> Option<MarketSnapshot> {
        *self
            .last_snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unavailable(err: AppError) -> AppError {
    match err {
        AppError::OracleUnavailable(_) => err,
        other => {
            warn!(error = %other, "[ORACLE] ledger read failed");
            AppError::OracleUnavailable(other.to_string())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory ledger with switchable failure.
    pub(crate) struct MockLedger {
        pub price: f64,
        pub contract_balance: f64,
        pub account_balance: f64,
        pub fail: AtomicBool,
        pub reads: AtomicUsize,
    }

    impl MockLedger {
        pub(crate) fn new(price: f64, contract_balance: f64, account_balance: f64) -> Self {
            Self {
                price,
                contract_balance,
                account_balance,
                fail: AtomicBool::new(false),
                reads: AtomicUsize::new(0),
            }
        }

        fn read(&self, value: f64) -> Result<f64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(AppError::Config("rpc down".into()))
            } else {
                Ok(value)
            }
        }
    }

    #[async_trait]
    impl Ledger for MockLedger {
        async fn exchange_rate(&self, _token: Address) -> Result<f64> {
            self.read(self.price)
        }

        async fn contract_eth_balance(&self, _contract: Address) -> Result<f64> {
            self.read(self.contract_balance)
        }

        async fn account_eth_balance(&self, _account: Address) -> Result<f64> {
            self.read(self.account_balance)
        }
    }

    pub(crate) fn oracle_over(ledger: Arc<MockLedger>) -> PriceOracleClient {
        PriceOracleClient::new(ledger, Address::zero(), Address::repeat_byte(0x11), 0.9)
    }

    #[test]
    fn capacity_covers_full_loop_at_max_ratio() {
        // r = 0.6: 0.6 + 0.36 + 0.216 = 1.176; 0.9 * 1 / 1.176 = 0.7653...
        assert_eq!(max_eth_capacity(1.0, 60.0, 0.9), 0.76);
        // r = 0.5: 0.875; 0.9 * 10 / 0.875 = 10.2857...
        assert_eq!(max_eth_capacity(10.0, 50.0, 0.9), 10.28);
    }

    #[test]
    fn capacity_is_zero_for_degenerate_inputs() {
        assert_eq!(max_eth_capacity(10.0, 0.0, 0.9), 0.0);
        assert_eq!(max_eth_capacity(0.0, 60.0, 0.9), 0.0);
        assert_eq!(max_eth_capacity(10.0, -5.0, 0.9), 0.0);
    }

    #[tokio::test]
    async fn snapshot_is_fetched_and_cached() {
        let ledger = Arc::new(MockLedger::new(150.0, 1.0, 2.0));
        let oracle = oracle_over(ledger.clone());
        assert!(oracle.cached_snapshot().is_none());

        let snapshot = oracle.fetch_snapshot(60.0).await.expect("snapshot");
        assert_eq!(snapshot.eth_price_in_dai, 150.0);
        assert_eq!(snapshot.max_eth_per_transaction, 0.76);
        assert_eq!(oracle.cached_snapshot(), Some(snapshot));
    }

    #[tokio::test]
    async fn ledger_failure_maps_to_oracle_unavailable() {
        let ledger = Arc::new(MockLedger::new(150.0, 1.0, 2.0));
        ledger.fail.store(true, Ordering::SeqCst);
        let oracle = oracle_over(ledger);

        let err = oracle.fetch_eth_price().await.unwrap_err();
        assert!(matches!(err, AppError::OracleUnavailable(_)));
        assert!(oracle.fetch_snapshot(60.0).await.is_err());
        assert!(oracle.cached_snapshot().is_none());
    }

    #[tokio::test]
    async fn zero_price_is_rejected() {
        let ledger = Arc::new(MockLedger::new(0.0, 1.0, 2.0));
        let oracle = oracle_over(ledger);
        assert!(matches!(
            oracle.fetch_eth_price().await,
            Err(AppError::OracleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn market_includes_account_only_when_known() {
        let ledger = Arc::new(MockLedger::new(150.0, 1.0, 2.5));
        let oracle = oracle_over(ledger);

        let without = oracle.fetch_market(60.0, None).await.expect("market");
        assert!(without.account.is_none());

        let account = Address::repeat_byte(0x22);
        let with = oracle.fetch_market(60.0, Some(account)).await.expect("market");
        assert_eq!(
            with.account,
            Some(AccountState {
                address: account,
                eth_balance: 2.5
            })
        );
    }
}
