//! Miscellaneous helper utilities.

use crate::errors::{AppError, Result};
use crate::models::WalletEvent;
use bigdecimal::BigDecimal;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::U256;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Decimals of ETH and DAI on chain.
pub const WEI_DECIMALS: i64 = 18;

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Convert an 18-decimal on-chain amount to a float.
pub fn from_wei(wei: U256) -> Result<f64> {
    let raw = BigInt::from_str(&wei.to_string())?;
    BigDecimal::new(raw, WEI_DECIMALS)
        .to_f64()
        .ok_or_else(|| AppError::Conversion(format!("{wei} wei does not fit in f64")))
}

/// Convert a float amount to wei, truncating anything past 18 decimals.
pub fn to_wei(value: f64) -> Result<U256> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Conversion(format!(
            "{value} cannot be expressed in wei"
        )));
    }
    let decimal = BigDecimal::from_str(&value.to_string())
        .map_err(|e| AppError::Conversion(e.to_string()))?;
    let scaled = (decimal * BigDecimal::from(10u64.pow(WEI_DECIMALS as u32))).with_scale(0);
    let (digits, _) = scaled.into_bigint_and_exponent();
    U256::from_dec_str(&digits.to_string()).map_err(|e| AppError::Conversion(e.to_string()))
}

/// Truncate a non-negative amount to 2 decimal places; anything else yields 0.
pub fn floor2(value: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    BigDecimal::from_str(&value.to_string())
        .ok()
        .and_then(|d| d.with_scale(2).to_f64())
        .unwrap_or(0.0)
}

/// Spawns a background task that polls the provider's chain id and emits
/// `WalletEvent::NetworkChanged` whenever it differs from the last one seen.
/// The task ends once the receiver is dropped.
pub fn spawn_network_watcher(
    provider: Arc<Provider<Http>>,
    tx: mpsc::Sender<WalletEvent>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        let mut last_chain_id: Option<u64> = None;
        loop {
            ticker.tick().await;
            let chain_id = match provider.get_chainid().await {
                Ok(id) => id.as_u64(),
                Err(e) => {
                    warn!(error = %e, "[WATCH] failed to read chain id");
                    continue;
                }
            };
            if let Some(event) = network_change(last_chain_id, chain_id) {
                info!(previous = ?last_chain_id, chain_id, "[WATCH] network changed");
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            last_chain_id = Some(chain_id);
        }
    })
}

/// `NetworkChanged` when `current` differs from an earlier observation.
/// The first observation only establishes the baseline.
pub fn network_change(previous: Option<u64>, current: u64) -> Option<WalletEvent> {
    match previous {
        Some(previous) if previous != current => {
            Some(WalletEvent::NetworkChanged { chain_id: current })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_round_trip_keeps_18_decimals() {
        let one_eth = U256::from_dec_str("1000000000000000000").unwrap();
        assert_eq!(from_wei(one_eth).unwrap(), 1.0);
        assert_eq!(to_wei(0.1875).unwrap(), U256::from(187_500_000_000_000_000u64));
        assert_eq!(to_wei(0.0).unwrap(), U256::zero());
    }

    #[test]
    fn to_wei_rejects_negative_and_nan() {
        assert!(to_wei(-1.0).is_err());
        assert!(to_wei(f64::NAN).is_err());
    }

    #[test]
    fn floor2_truncates() {
        assert_eq!(floor2(3.999), 3.99);
        assert_eq!(floor2(0.29), 0.29);
        assert_eq!(floor2(1.0), 1.0);
        assert_eq!(floor2(-4.0), 0.0);
        assert_eq!(floor2(f64::INFINITY), 0.0);
    }

    #[test]
    fn network_change_needs_a_baseline_and_a_different_id() {
        assert_eq!(network_change(None, 1), None);
        assert_eq!(network_change(Some(1), 1), None);
        assert_eq!(
            network_change(Some(1), 42),
            Some(WalletEvent::NetworkChanged { chain_id: 42 })
        );
    }
}
