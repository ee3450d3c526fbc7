//! Marketplace pricing
//!
//! Guides set a base price, which is what they receive. The price shown to
//! users adds the marketplace fee on top:
//!
//! ```text
//! final_price = round2(base_price * (1 + fee_percent / 100))
//! ```

use serde::Serialize;
use thiserror::Error;

/// Marketplace fee applied when none is configured
pub const DEFAULT_FEE_PERCENT: f64 = 25.0;

#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

/// Breakdown of a displayed price
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub base_price: f64,
    pub fee_amount: f64,
    pub final_price: f64,
    pub currency: String,
    /// Final price with exactly two decimals
    pub formatted: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCalculator {
    fee_percent: f64,
}

impl PriceCalculator {
    /// Non-finite or negative fees fall back to the default
    pub fn new(fee_percent: f64) -> Self {
        let fee_percent = if fee_percent.is_finite() && fee_percent >= 0.0 {
            fee_percent
        } else {
            tracing::warn!(fee_percent, "Invalid marketplace fee, using default");
            DEFAULT_FEE_PERCENT
        };
        Self { fee_percent }
    }

    pub fn fee_percent(&self) -> f64 {
        self.fee_percent
    }

    pub fn final_price(&self, base_price: f64) -> Result<f64, PricingError> {
        validate(base_price)?;
        Ok(round2(base_price * (1.0 + self.fee_percent / 100.0)))
    }

    pub fn quote(&self, base_price: f64, currency: &str) -> Result<PriceQuote, PricingError> {
        let final_price = self.final_price(base_price)?;
        Ok(PriceQuote {
            base_price,
            fee_amount: round2(final_price - base_price),
            final_price,
            currency: currency.trim().to_uppercase(),
            formatted: format_price(final_price),
        })
    }
}

impl Default for PriceCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_FEE_PERCENT)
    }
}

/// Two-decimal formatting, e.g. `125` -> `"125.00"`
pub fn format_price(value: f64) -> String {
    format!("{:.2}", value)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn validate(base_price: f64) -> Result<(), PricingError> {
    if !base_price.is_finite() {
        return Err(PricingError::InvalidPrice(format!(
            "{} is not a finite number",
            base_price
        )));
    }
    if base_price < 0.0 {
        return Err(PricingError::InvalidPrice(format!(
            "{} is negative",
            base_price
        )));
    }
    Ok(())
}
