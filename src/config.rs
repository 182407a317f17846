//! Configuration loader and application settings.

use crate::errors::{AppError, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::path::Path;
use url::Url;

/// Static protocol limits for a single position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsConfig {
    /// Smallest ETH amount the leverage contract accepts.
    pub min_eth: f64,
    pub min_percent: f64,
    pub max_percent: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            min_eth: 0.01,
            min_percent: 10.0,
            max_percent: 60.0,
        }
    }
}

/// Values injected into a `PositionSession` at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub default_eth_amount: f64,
    pub default_ratio_percent: f64,
    /// Share of the leverage contract's ETH balance a single loop may consume.
    pub capacity_margin: f64,
    pub bounds: BoundsConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_eth_amount: 0.1,
            default_ratio_percent: 50.0,
            capacity_margin: 0.9,
            bounds: BoundsConfig::default(),
        }
    }
}

/// On-chain addresses, in the same shape as the frontend's `addresses.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    /// Uniswap v1 factory used to resolve the DAI exchange.
    pub factory_address: Address,
    pub dai_address: Address,
    pub leverage_address: Address,
}

impl ContractAddresses {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            factory_address: env_address("FACTORY_ADDRESS")?,
            dai_address: env_address("DAI_ADDRESS")?,
            leverage_address: env_address("LEVERAGE_ADDRESS")?,
        })
    }
}

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// RPC endpoint for the Ethereum-compatible node.
    pub rpc_url: Url,
    pub addresses: ContractAddresses,
    /// Hex private key of the signing wallet. Required to submit.
    pub private_key: Option<String>,
    /// Account to read balances for when no private key is set.
    pub account: Option<Address>,
    /// Initial edits applied after the first load.
    pub eth_amount: Option<f64>,
    pub ratio_percent: Option<f64>,
    pub submit: bool,
    pub watch: bool,
    pub json_output: bool,
    pub network_poll_secs: u64,
    pub load_attempts: u32,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Contract addresses come from the JSON file named by `ADDRESSES_FILE`
    /// when set, otherwise from `FACTORY_ADDRESS`, `DAI_ADDRESS` and
    /// `LEVERAGE_ADDRESS`.
    pub fn from_env() -> Result<Self> {
        let rpc_url = Url::parse(&std::env::var("RPC_URL").map_err(|_| {
            AppError::Config("Set RPC_URL env var to your Ethereum node HTTP endpoint".into())
        })?)?;

        let addresses = match std::env::var("ADDRESSES_FILE") {
            Ok(path) => ContractAddresses::from_file(Path::new(&path))?,
            Err(_) => ContractAddresses::from_env()?,
        };

        let account = match optional_var("ACCOUNT") {
            Some(raw) => Some(parse_address("ACCOUNT", &raw)?),
            None => None,
        };

        let eth_amount = optional_var("ETH_AMOUNT")
            .map(|v| v.parse::<f64>())
            .transpose()?;
        let ratio_percent = optional_var("RATIO_PERCENT")
            .map(|v| v.parse::<f64>())
            .transpose()?;

        let network_poll_secs = poll_interval_secs(optional_var("NETWORK_POLL_SECS"));
        let load_attempts: u32 = optional_var("LOAD_ATTEMPTS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
            .max(1);

        Ok(Self {
            rpc_url,
            addresses,
            private_key: optional_var("PRIVATE_KEY"),
            account,
            eth_amount,
            ratio_percent,
            submit: flag("SUBMIT"),
            watch: flag("WATCH"),
            json_output: optional_var("OUTPUT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            network_poll_secs,
            load_attempts,
            session: SessionConfig::default(),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Seconds between chain-id polls. Defaults to 10, never below 1.
fn poll_interval_secs(raw: Option<String>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(10)
        .max(1)
}

fn flag(name: &str) -> bool {
    optional_var(name).is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn env_address(name: &str) -> Result<Address> {
    let raw = std::env::var(name)
        .map_err(|_| AppError::Config(format!("Set {name} env var or ADDRESSES_FILE")))?;
    parse_address(name, &raw)
}

fn parse_address(name: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{name} is not a valid address: {e}")))
}
