//! Loyalty Ledger
//!
//! Append-only token transactions. Each row carries the running balance
//! after it was applied; the customer's balance is the newest row's
//! `balance_after`, or 0 without rows.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::Money;
use crate::CommerceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType { Earned, Spent, Expired, AdminAdjustment }

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Earned => "earned", Self::Spent => "spent", Self::Expired => "expired", Self::AdminAdjustment => "admin_adjustment" }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TransactionType {
    type Err = CommerceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earned" => Ok(Self::Earned),
            "spent" => Ok(Self::Spent),
            "expired" => Ok(Self::Expired),
            "admin_adjustment" => Ok(Self::AdminAdjustment),
            other => Err(CommerceError::Storage(format!("unknown token transaction type '{other}'"))),
        }
    }
}

/// One stored ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyToken {
    pub id: i64,
    pub customer_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub order_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A ledger row waiting to be applied against the current balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPosting {
    pub customer_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub order_id: Option<Uuid>,
    pub description: String,
}

impl TokenPosting {
    pub fn earn(customer_id: Uuid, tokens: i64, order_id: Uuid, order_number: &str) -> Self {
        Self { customer_id, transaction_type: TransactionType::Earned, amount: tokens, order_id: Some(order_id), description: format!("Earned from order {order_number}") }
    }

    pub fn spend(customer_id: Uuid, tokens: i64, order_id: Uuid, order_number: &str) -> Self {
        Self { customer_id, transaction_type: TransactionType::Spent, amount: -tokens, order_id: Some(order_id), description: format!("Spent on order {order_number}") }
    }

    /// Credit back tokens that were spent on an order that did not go through.
    pub fn refund(customer_id: Uuid, tokens: i64, order_id: Uuid, order_number: &str) -> Self {
        Self { customer_id, transaction_type: TransactionType::AdminAdjustment, amount: tokens, order_id: Some(order_id), description: format!("Refund of tokens spent on order {order_number}") }
    }

    /// Apply against `balance`, producing the row to store.
    pub fn apply(self, balance: i64, id: i64, now: DateTime<Utc>) -> Result<LoyaltyToken, CommerceError> {
        let balance_after = balance + self.amount;
        if balance_after < 0 {
            return Err(CommerceError::InsufficientBalance { requested: -self.amount, available: balance });
        }
        Ok(LoyaltyToken {
            id, customer_id: self.customer_id, transaction_type: self.transaction_type, amount: self.amount,
            balance_after, order_id: self.order_id, description: self.description, created_at: now,
        })
    }
}

/// Earn and redeem rates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyPolicy {
    pub token_value: Money,
    pub purchase_threshold: Money,
}

impl Default for LoyaltyPolicy {
    fn default() -> Self { Self { token_value: Money::new(dec!(1.00)), purchase_threshold: Money::new(dec!(100.00)) } }
}

impl LoyaltyPolicy {
    /// One token per full threshold spent.
    pub fn tokens_for(&self, total: Money) -> i64 {
        let threshold = self.purchase_threshold.amount();
        if threshold <= Decimal::ZERO || total.amount() <= Decimal::ZERO { return 0; }
        (total.amount() / threshold).floor().to_i64().unwrap_or(0)
    }

    pub fn value_of(&self, tokens: i64) -> Money { self.token_value * Decimal::from(tokens) }
}

/// Balance implied by a customer's rows in creation order.
pub fn balance_of(rows: &[LoyaltyToken]) -> i64 { rows.last().map(|r| r.balance_after).unwrap_or(0) }

/// Replaying amounts reproduces every stored `balance_after`.
pub fn ledger_is_consistent(rows: &[LoyaltyToken]) -> bool {
    let mut running = 0i64;
    rows.iter().all(|row| {
        running += row.amount;
        running == row.balance_after && running >= 0
    })
}
