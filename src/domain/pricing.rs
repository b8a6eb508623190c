//! Cart pricing: line totals, VAT, shipping, discount and token redemption.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingParams {
    /// VAT as a fraction, 0.19 for 19%.
    pub tax_rate: Decimal,
    pub free_shipping_threshold: Money,
    pub shipping_flat_fee: Money,
}

impl Default for PricingParams {
    fn default() -> Self {
        Self { tax_rate: dec!(0.19), free_shipping_threshold: Money::new(dec!(50.00)), shipping_flat_fee: Money::new(dec!(4.99)) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLine { pub unit_price: Money, pub quantity: u32 }

impl PriceLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub tokens_value: Money,
    pub total: Money,
}

impl Totals {
    /// Amount payable before any loyalty tokens are redeemed.
    pub fn before_tokens(&self) -> Money { self.subtotal + self.tax + self.shipping - self.discount }

    /// Storage form: every field to cents, the total rounded once from the
    /// unrounded sum.
    pub fn rounded(&self) -> Totals {
        Totals {
            subtotal: self.subtotal.round_cents(),
            tax: self.tax.round_cents(),
            shipping: self.shipping.round_cents(),
            discount: self.discount.round_cents(),
            tokens_value: self.tokens_value.round_cents(),
            total: self.total.round_cents(),
        }
    }
}

pub fn price_cart(lines: &[PriceLine], params: &PricingParams, discount: Money, tokens_value: Money) -> Totals {
    let subtotal: Money = lines.iter().map(PriceLine::line_total).sum();
    let tax = subtotal * params.tax_rate;
    let shipping = if subtotal >= params.free_shipping_threshold { Money::ZERO } else { params.shipping_flat_fee };
    let total = subtotal + tax + shipping - discount - tokens_value;
    Totals { subtotal, tax, shipping, discount, tokens_value, total }
}
