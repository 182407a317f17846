use anyhow::Result;
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use looper::{
    chain::{EthLedger, EthSubmitter, PriceOracleClient},
    config::AppConfig,
    models::WalletEvent,
    position::SLIPPAGE_DISCLAIMER,
    session::PositionSession,
    utils,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::from_env()?;
    info!(
        rpc_url = %config.rpc_url,
        leverage = ?config.addresses.leverage_address,
        "[INIT] looper starting"
    );

    let ledger = EthLedger::connect(config.rpc_url.as_str(), config.addresses.factory_address)?;
    let provider = ledger.provider();

    let wallet = match &config.private_key {
        Some(key) => {
            let chain_id = provider.get_chainid().await?.as_u64();
            Some(key.parse::<LocalWallet>()?.with_chain_id(chain_id))
        }
        None => None,
    };
    let account = wallet.as_ref().map(|w| w.address()).or(config.account);
    if account.is_none() {
        warn!("[INIT] no account configured; balance checks will fail");
    }

    let oracle = PriceOracleClient::new(
        Arc::new(ledger),
        config.addresses.dai_address,
        config.addresses.leverage_address,
        config.session.capacity_margin,
    );
    let mut session = PositionSession::new(oracle, config.session, account);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match session.load().await {
            Ok(()) => break,
            Err(e) if attempt < config.load_attempts => {
                warn!(attempt, error = %e, "[INIT] market load failed, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(eth_amount) = config.eth_amount {
        session.set_eth_amount(eth_amount);
    }
    if let Some(ratio_percent) = config.ratio_percent {
        session.set_ratio_percent(ratio_percent);
    }
    report(&session, config.json_output)?;
    info!("[INIT] {SLIPPAGE_DISCLAIMER}");

    if config.submit {
        match wallet {
            Some(wallet) => {
                let submitter =
                    EthSubmitter::new(provider.clone(), wallet, config.addresses.leverage_address);
                info!(from = ?submitter.address(), "[SUBMIT] sending position");
                match session.submit(&submitter).await {
                    Ok(receipt) => info!(
                        tx_hash = ?receipt.tx_hash,
                        block = ?receipt.block_number,
                        "[SUBMIT] Transaction sent"
                    ),
                    Err(e) => error!(error = %e, "[SUBMIT] position not opened"),
                }
            }
            None => warn!("[SUBMIT] set PRIVATE_KEY to submit a position"),
        }
    }

    if config.watch {
        let (tx, mut rx) = mpsc::channel::<WalletEvent>(8);
        let _watcher = utils::spawn_network_watcher(provider, tx, config.network_poll_secs);
        info!(interval = config.network_poll_secs, "[INIT] network watcher started");
        while let Some(event) = rx.recv().await {
            match session.handle_event(event).await {
                Ok(()) => report(&session, config.json_output)?,
                Err(e) => warn!(error = %e, "[WATCH] reload failed"),
            }
        }
    }

    Ok(())
}

/// Log the current projection, or print it as JSON.
fn report(session: &PositionSession, json: bool) -> Result<()> {
    let (Some(projection), Some(snapshot)) = (session.projection(), session.snapshot()) else {
        return Ok(());
    };

    if json {
        let body = serde_json::json!({
            "input": session.input(),
            "snapshot": snapshot,
            "account": session.account(),
            "projection": projection,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        info!(age_secs = snapshot.age_secs(), "[POSITION] market snapshot");
        for (label, value) in projection.summary_rows(snapshot.eth_price_in_dai) {
            info!(%value, "[POSITION] {label}");
        }
    }

    if let Err(e) = session.validate() {
        warn!(error = %e, "[SESSION] position cannot be submitted");
    }
    Ok(())
}
