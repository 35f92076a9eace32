//! Exchange fee model
//!
//! fee = rate * contracts * P * (1 - P)
//!
//! The fee is symmetric around 0.5, zero at both ends and linear in
//! contracts. A settlement leg never pays a fee, which is what makes holding
//! a near-certain winner to settlement cheaper than selling it at 0.99.

use crate::config::FeeConfig;
use rust_decimal::Decimal;

/// Computes per-leg trading fees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCalculator {
    rate: Decimal,
}

impl FeeCalculator {
    /// Create a calculator for the given rate
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    /// Taker calculator from config
    pub fn taker(config: &FeeConfig) -> Self {
        Self::new(config.fee_rate)
    }

    /// Maker calculator from config
    pub fn maker(config: &FeeConfig) -> Self {
        Self::new(config.maker_fee_rate)
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Fee for one leg at `price` (clamped to [0, 1])
    pub fn fee(&self, price: Decimal, contracts: u32) -> Decimal {
        let p = price.clamp(Decimal::ZERO, Decimal::ONE);
        self.rate * Decimal::from(contracts) * p * (Decimal::ONE - p)
    }

    /// Fee for a settlement leg, always zero
    pub fn settlement_fee(&self, _contracts: u32) -> Decimal {
        Decimal::ZERO
    }

    /// Entry plus exit fee for a round trip closed at market
    pub fn round_trip(&self, entry: Decimal, exit: Decimal, contracts: u32) -> Decimal {
        self.fee(entry, contracts) + self.fee(exit, contracts)
    }

    /// Price move per contract needed to cover a round trip at `price`
    ///
    /// Assumes both legs trade near `price`.
    pub fn break_even_move(&self, price: Decimal, contracts: u32) -> Decimal {
        if contracts == 0 {
            return Decimal::ZERO;
        }
        self.round_trip(price, price, contracts) / Decimal::from(contracts)
    }
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self::taker(&FeeConfig::default())
    }
}
