//! Position session: owns the user's input, keeps the projection in sync and
//! drives submission.
//!
//! Phases run `Loading -> Ready -> Submitting -> Ready`. Network reads are
//! split into `begin_*` / `apply_*` / `finish_*` steps so that a response
//! can be matched against the request that produced it. Responses carrying
//! an outdated `RefreshToken` are dropped.

use crate::chain::{PriceOracleClient, TransactionSubmitter};
use crate::config::SessionConfig;
use crate::errors::{AppError, Result, ValidationError};
use crate::models::{
    AccountState, MarketData, MarketSnapshot, PositionInput, PositionProjection, SessionPhase,
    SubmissionReceipt, SubmissionRequest, SubmissionState, WalletEvent,
};
use crate::position::{BoundsValidator, project};
use ethers::types::Address;
use tracing::{debug, info, warn};

/// Identifies one market refresh. Later tokens supersede earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshToken(u64);

/// Proof that a submission was admitted. Consumed by `finish_submit` or
/// `abandon_submit`.
#[derive(Debug)]
pub struct SubmissionTicket {
    id: u64,
    pub request: SubmissionRequest,
    pub projection: PositionProjection,
}

pub struct PositionSession {
    config: SessionConfig,
    validator: BoundsValidator,
    oracle: PriceOracleClient,
    input: PositionInput,
    account_address: Option<Address>,
    market: Option<MarketData>,
    projection: Option<PositionProjection>,
    phase: SessionPhase,
    submission: SubmissionState,
    latest_refresh: u64,
    submissions: u64,
}

impl PositionSession {
    pub fn new(oracle: PriceOracleClient, config: SessionConfig, account: Option<Address>) -> Self {
        Self {
            validator: BoundsValidator::new(config.bounds),
            input: PositionInput {
                eth_amount: config.default_eth_amount,
                ratio_percent: config.default_ratio_percent,
            },
            config,
            oracle,
            account_address: account,
            market: None,
            projection: None,
            phase: SessionPhase::Loading,
            submission: SubmissionState::Idle,
            latest_refresh: 0,
            submissions: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.submission
    }

    pub fn input(&self) -> PositionInput {
        self.input
    }

    pub fn projection(&self) -> Option<&PositionProjection> {
        self.projection.as_ref()
    }

    pub fn snapshot(&self) -> Option<&MarketSnapshot> {
        self.market.as_ref().map(|m| &m.snapshot)
    }

    pub fn account(&self) -> Option<&AccountState> {
        self.market.as_ref().and_then(|m| m.account.as_ref())
    }

    pub fn account_address(&self) -> Option<Address> {
        self.account_address
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    /// Start a refresh. Any refresh started earlier becomes stale.
    pub fn begin_refresh(&mut self) -> RefreshToken {
        self.latest_refresh += 1;
        RefreshToken(self.latest_refresh)
    }

    /// Apply the outcome of the refresh identified by `token`.
    ///
    /// Returns `Ok(false)` when the token is stale and the outcome was
    /// dropped. A failed refresh keeps the previous market data; the session
    /// only stays in `Loading` if nothing was ever loaded.
    pub fn apply_refresh(&mut self, token: RefreshToken, outcome: Result<MarketData>) -> Result<bool> {
        if token.0 != self.latest_refresh {
            debug!(token = token.0, latest = self.latest_refresh, "[SESSION] dropping stale market data");
            return Ok(false);
        }

        let data = match outcome {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "[SESSION] market refresh failed");
                if self.market.is_some() && self.phase == SessionPhase::Loading {
                    self.phase = SessionPhase::Ready;
                }
                return Err(match e {
                    AppError::OracleUnavailable(_) => e,
                    other => AppError::OracleUnavailable(other.to_string()),
                });
            }
        };

        // The account may have changed while the read was in flight.
        let account = data
            .account
            .filter(|a| Some(a.address) == self.account_address);
        self.market = Some(MarketData {
            snapshot: data.snapshot,
            account,
        });
        self.recompute();
        if self.phase == SessionPhase::Loading {
            self.phase = SessionPhase::Ready;
        }
        debug!(
            eth_price = data.snapshot.eth_price_in_dai,
            max_eth = data.snapshot.max_eth_per_transaction,
            balance = ?account.map(|a| a.eth_balance),
            "[SESSION] market data loaded"
        );
        Ok(true)
    }

    /// Fetch market data and the account balance, then apply them.
    pub async fn load(&mut self) -> Result<()> {
        let token = self.begin_refresh();
        let outcome = self
            .oracle
            .fetch_market(self.config.bounds.max_percent, self.account_address)
            .await;
        self.apply_refresh(token, outcome).map(|_| ())
    }

    /// React to a wallet or provider notification by re-reading everything.
    /// The current input is kept.
    pub async fn handle_event(&mut self, event: WalletEvent) -> Result<()> {
        match event {
            WalletEvent::AccountChanged(account) => {
                if account.is_some() {
                    self.account_address = account;
                }
                info!(account = ?self.account_address, "[SESSION] account changed, reloading");
            }
            WalletEvent::NetworkChanged { chain_id } => {
                info!(chain_id, "[SESSION] network changed, reloading");
            }
        }
        if self.phase == SessionPhase::Ready {
            self.phase = SessionPhase::Loading;
        }
        self.load().await
    }

    // -----------------------------------------------------------------------
    // Input edits
    // -----------------------------------------------------------------------

    /// Replace the ETH amount. Non-finite values are ignored.
    pub fn set_eth_amount(&mut self, eth_amount: f64) -> Option<&PositionProjection> {
        if eth_amount.is_finite() {
            self.input = PositionInput {
                eth_amount,
                ..self.input
            };
            self.recompute();
        }
        self.projection.as_ref()
    }

    /// Replace the rehypothecation percent. Non-finite values are ignored.
    pub fn set_ratio_percent(&mut self, ratio_percent: f64) -> Option<&PositionProjection> {
        if ratio_percent.is_finite() {
            self.input = PositionInput {
                ratio_percent,
                ..self.input
            };
            self.recompute();
        }
        self.projection.as_ref()
    }

    fn recompute(&mut self) {
        if let Some(market) = &self.market {
            self.projection = Some(project(
                self.input.eth_amount,
                self.input.ratio_percent,
                market.snapshot.eth_price_in_dai,
            ));
        }
    }

    // -----------------------------------------------------------------------
    // Validation and submission
    // -----------------------------------------------------------------------

    /// Check the current input against the loaded limits and balance.
    pub fn validate(&self) -> Result<()> {
        let market = self.market.as_ref().ok_or(AppError::NotReady)?;
        let balance = market.account.map(|a| a.eth_balance).unwrap_or(0.0);
        self.validator.validate(
            self.input.eth_amount,
            self.input.ratio_percent,
            balance,
            market.snapshot.max_eth_per_transaction,
        )?;
        Ok(())
    }

    /// Limit checks only, for showing an input error before a balance exists.
    pub fn input_error(&self) -> Option<ValidationError> {
        let market = self.market.as_ref()?;
        self.validator
            .check_limits(
                self.input.eth_amount,
                self.input.ratio_percent,
                market.snapshot.max_eth_per_transaction,
            )
            .err()
    }

    pub fn can_submit(&self) -> bool {
        self.phase == SessionPhase::Ready && self.account_address.is_some() && self.validate().is_ok()
    }

    /// Admit a submission: re-validate, then enter `Submitting`.
    pub fn begin_submit(&mut self) -> Result<SubmissionTicket> {
        match self.phase {
            SessionPhase::Loading => return Err(AppError::NotReady),
            SessionPhase::Submitting => {
                warn!("[SESSION] submission already in flight");
                return Err(AppError::SubmissionInFlight);
            }
            SessionPhase::Ready => {}
        }
        let account = self.account_address.ok_or(AppError::NoAccount)?;
        if let Err(e) = self.validate() {
            warn!(error = %e, "[SESSION] submission refused");
            return Err(e);
        }
        let projection = self.projection.ok_or(AppError::NotReady)?;

        self.submissions += 1;
        self.phase = SessionPhase::Submitting;
        self.submission = SubmissionState::Submitting;
        let request = SubmissionRequest {
            collateral_eth: projection.total_collateral_eth,
            debt_dai: projection.total_debt_dai,
            account,
            value_eth: self.input.eth_amount,
        };
        info!(
            collateral_eth = request.collateral_eth,
            debt_dai = request.debt_dai,
            value_eth = request.value_eth,
            "[SESSION] submitting position"
        );
        Ok(SubmissionTicket {
            id: self.submissions,
            request,
            projection,
        })
    }

    /// Record the outcome of an admitted submission and return to `Ready`.
    pub fn finish_submit(
        &mut self,
        ticket: SubmissionTicket,
        outcome: Result<SubmissionReceipt>,
    ) -> Result<SubmissionReceipt> {
        if ticket.id != self.submissions || self.phase != SessionPhase::Submitting {
            return Err(AppError::NotReady);
        }
        self.phase = SessionPhase::Ready;
        match outcome {
            Ok(receipt) => {
                self.submission = SubmissionState::Succeeded;
                info!(tx_hash = ?receipt.tx_hash, "[SESSION] transaction sent");
                Ok(receipt)
            }
            Err(e) => {
                self.submission = SubmissionState::Failed;
                warn!(error = %e, "[SESSION] submission failed");
                Err(e)
            }
        }
    }

    /// Give up on an admitted submission whose outcome will never arrive.
    /// Records `Failed` and returns to `Ready`. Outdated tickets are ignored.
    pub fn abandon_submit(&mut self, ticket: SubmissionTicket) {
        if ticket.id != self.submissions || self.phase != SessionPhase::Submitting {
            return;
        }
        self.phase = SessionPhase::Ready;
        self.submission = SubmissionState::Failed;
        warn!(ticket = ticket.id, "[SESSION] submission abandoned before completion");
    }

    /// Validate, send through `submitter`, and record the outcome.
    ///
    /// Dropping the returned future before it completes abandons the
    /// submission, so the session never stays in `Submitting`.
    pub async fn submit(&mut self, submitter: &dyn TransactionSubmitter) -> Result<SubmissionReceipt> {
        let ticket = self.begin_submit()?;
        let request = ticket.request;
        let mut in_flight = InFlightSubmission {
            session: self,
            ticket: Some(ticket),
        };
        let outcome = submitter.submit_leveraged_position(&request).await;
        match in_flight.ticket.take() {
            Some(ticket) => in_flight.session.finish_submit(ticket, outcome),
            None => Err(AppError::NotReady),
        }
    }
}

/// Abandons its ticket on drop unless the submission was finished.
struct InFlightSubmission<'a> {
    session: &'a mut PositionSession,
    ticket: Option<SubmissionTicket>,
}

impl Drop for InFlightSubmission<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.session.abandon_submit(ticket);
        }
    }
}
