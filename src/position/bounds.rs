use crate::config::BoundsConfig;
use crate::errors::ValidationError;

/// Stateless input rules for a position. The dynamic per-transaction cap is
/// supplied per call, the static protocol band at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsValidator {
    limits: BoundsConfig,
}

impl BoundsValidator {
    pub fn new(limits: BoundsConfig) -> Self {
        Self { limits }
    }

    /// Check an input pair. The first failing rule wins:
    /// 1. the amount is present and within `max_eth_per_transaction`
    /// 2. the amount and ratio sit inside the protocol band
    /// 3. the account holds at least the amount
    pub fn validate(
        &self,
        eth_amount: f64,
        ratio_percent: f64,
        available_eth_balance: f64,
        max_eth_per_transaction: f64,
    ) -> Result<(), ValidationError> {
        self.check_limits(eth_amount, ratio_percent, max_eth_per_transaction)?;

        if available_eth_balance < eth_amount {
            return Err(ValidationError::InsufficientBalance {
                available: available_eth_balance,
                required: eth_amount,
            });
        }
        Ok(())
    }

    /// Rules 1 and 2 only, for gating edits before any balance is known.
    pub fn check_limits(
        &self,
        eth_amount: f64,
        ratio_percent: f64,
        max_eth_per_transaction: f64,
    ) -> Result<(), ValidationError> {
        let present = eth_amount.is_finite() && eth_amount > 0.0;
        if !present || eth_amount > max_eth_per_transaction {
            return Err(ValidationError::ExceedsTransactionLimit {
                limit: max_eth_per_transaction,
            });
        }

        let limits = &self.limits;
        let ratio_ok =
            ratio_percent >= limits.min_percent && ratio_percent <= limits.max_percent;
        if eth_amount < limits.min_eth || !ratio_ok {
            return Err(ValidationError::OutOfRange {
                min_eth: limits.min_eth,
                min_percent: limits.min_percent,
                max_percent: limits.max_percent,
            });
        }
        Ok(())
    }
}

impl Default for BoundsValidator {
    fn default() -> Self {
        Self::new(BoundsConfig::default())
    }
}
