use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounds a money amount to two decimals, midpoint away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Line subtotal for a price snapshot.
pub fn line_subtotal(price: Decimal, quantity: i32) -> Decimal {
    round_currency(price * Decimal::from(quantity))
}

/// Money breakdown shared by carts and orders.
///
/// `total == subtotal - discount + tax` holds for every value built by
/// [`CartTotals::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    /// Tax is charged on the discounted subtotal. The discount is clamped to
    /// `[0, subtotal]`.
    pub fn compute(subtotal: Decimal, discount: Decimal, tax_rate: Decimal) -> Self {
        let subtotal = round_currency(subtotal.max(Decimal::ZERO));
        let discount = round_currency(discount.max(Decimal::ZERO).min(subtotal));
        let taxable = subtotal - discount;
        let tax = round_currency(taxable * tax_rate.max(Decimal::ZERO));
        Self {
            subtotal,
            discount,
            tax,
            total: subtotal - discount + tax,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount + self.tax
    }
}
