//! Customer profile fields the order core reads and the statistics it keeps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;
use super::order::ShippingAddress;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub username: String,
    pub street_address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub total_orders: u32,
    pub total_spent: Money,
}

/// Address fields supplied with a checkout request; blanks fall back to the profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressInput {
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl Customer {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), username: username.into(), street_address: String::new(), city: String::new(),
            postal_code: String::new(), country: "DE".into(), total_orders: 0, total_spent: Money::ZERO,
        }
    }

    /// Copy of the address to freeze into an order.
    pub fn shipping_address(&self, input: &AddressInput) -> ShippingAddress {
        fn pick(given: &Option<String>, fallback: &str) -> String {
            given.as_deref().map(str::trim).filter(|v| !v.is_empty()).unwrap_or(fallback).to_string()
        }
        let country = pick(&input.country, &self.country);
        ShippingAddress {
            street_address: pick(&input.street_address, &self.street_address),
            city: pick(&input.city, &self.city),
            postal_code: pick(&input.postal_code, &self.postal_code),
            country: if country.is_empty() { "DE".into() } else { country },
        }
    }

    pub fn record_order(&mut self, total: Money) {
        self.total_orders = self.total_orders.saturating_add(1);
        self.total_spent = self.total_spent + total;
    }
}
