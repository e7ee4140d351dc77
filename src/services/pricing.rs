use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// A (unit price, quantity) pair fed to the calculator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl PriceLine {
    pub fn new(unit_price: Decimal, quantity: u32) -> Self {
        Self {
            unit_price,
            quantity,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Result of pricing a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedCart {
    pub subtotal: Decimal,
    /// Percentage actually applied, after clamping
    pub discount_percent: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Rounds to currency minor units, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamps a discount percentage into `[0, 100]`.
pub fn clamp_discount(percent: Decimal) -> Decimal {
    percent.max(Decimal::ZERO).min(HUNDRED)
}

/// `1 - d/100` for a clamped percentage.
pub fn discount_factor(percent: Decimal) -> Decimal {
    Decimal::ONE - clamp_discount(percent) / HUNDRED
}

/// Converts a money amount to integer cents.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Computes subtotal and discounted total for a cart.
///
/// The subtotal is the exact sum of `price × quantity` rounded to cents; the
/// total is the subtotal scaled by the discount factor and rounded again, so
/// `total <= subtotal` always holds for non-negative prices.
pub fn price_cart(lines: &[PriceLine], discount_percent: Option<Decimal>) -> PricedCart {
    let subtotal = round_money(lines.iter().map(PriceLine::line_total).sum());
    let percent = discount_percent.map(clamp_discount).unwrap_or(Decimal::ZERO);
    let total = round_money(subtotal * discount_factor(percent));

    PricedCart {
        subtotal,
        discount_percent: percent,
        discount: subtotal - total,
        total,
    }
}
