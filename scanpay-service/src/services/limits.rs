//! Amount rules shared by transaction creation and fixed-amount QR codes.

use crate::config::PaymentConfig;
use crate::error::PaymentError;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountLimits {
    pub min: Decimal,
    pub max: Decimal,
}

impl From<&PaymentConfig> for AmountLimits {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            min: config.min_amount,
            max: config.max_amount,
        }
    }
}

impl AmountLimits {
    /// At most 2 significant decimal places and within `min..=max`.
    /// Trailing zeros do not count, so `12.500` is accepted as `12.50`.
    pub fn check(&self, amount: Decimal) -> Result<(), PaymentError> {
        if amount.normalize().scale() > 2 {
            return Err(PaymentError::Validation(format!(
                "Amount {} has more than 2 decimal places",
                amount
            )));
        }
        if amount < self.min || amount > self.max {
            return Err(PaymentError::Validation(format!(
                "Amount {} is outside the allowed range {} to {}",
                amount, self.min, self.max
            )));
        }
        Ok(())
    }
}
