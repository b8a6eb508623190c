//! Order Aggregate
//!
//! An order, its item snapshots and its status history form one unit. The
//! status machine is linear with two absorbing branches:
//!
//! ```text
//! pending -> confirmed -> processing -> shipped -> delivered
//! pending | confirmed -> cancelled
//! any non-terminal -> refunded
//! ```

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::{PriceLine, Totals};
use crate::domain::value_objects::Money;
use crate::CommerceError;
use super::product::Product;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub shop_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub tokens_used: u32,
    pub tokens_value: Money,
    pub total: Money,
    pub shipping_address: ShippingAddress,
    pub customer_notes: String,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub items: Vec<OrderItem>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub ordered_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub events: Vec<DomainEvent>,
}

/// Product data frozen into the order at checkout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress { pub street_address: String, pub city: String, pub postal_code: String, pub country: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry { pub status: OrderStatus, pub notes: String, pub changed_by: String, pub created_at: DateTime<Utc> }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped,
        OrderStatus::Delivered, OrderStatus::Cancelled, OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded) }
    pub fn is_cancellable(&self) -> bool { matches!(self, Self::Pending | Self::Confirmed) }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (*self, next) {
            (Pending, Confirmed) | (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered) => true,
            (Pending | Confirmed, Cancelled) => true,
            (from, Refunded) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Goods are still in the shop while the order sits in one of these.
    pub fn holds_stock(&self) -> bool { matches!(self, Self::Pending | Self::Confirmed | Self::Processing) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = CommerceError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|status| status.as_str() == s).ok_or_else(|| {
            let valid: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
            CommerceError::Validation(format!("Invalid status '{s}'. Valid options: {}", valid.join(", ")))
        })
    }
}

impl OrderItem {
    /// Snapshot a product line at its current price.
    pub fn snapshot(product: &Product, quantity: u32, tax_rate: Decimal) -> Self {
        let unit_price = product.current_price();
        let line_total = unit_price.multiply(quantity);
        Self {
            id: Uuid::now_v7(), product_id: product.id, product_name: product.name.clone(),
            product_sku: product.sku.to_string(), unit_price, quantity, line_total, tax_rate,
            tax_amount: (line_total * tax_rate).round_cents(),
        }
    }

    pub fn price_line(&self) -> PriceLine { PriceLine { unit_price: self.unit_price, quantity: self.quantity } }
}

impl ShippingAddress {
    pub fn is_complete(&self) -> bool {
        !self.street_address.trim().is_empty() && !self.city.trim().is_empty() && !self.postal_code.trim().is_empty()
    }
}

/// `ORD-{unix seconds}-{six uppercase alphanumerics}`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    const CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect();
    format!("ORD-{}-{}", now.timestamp(), suffix)
}

/// Everything needed to open a new order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub shop_id: Uuid,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
    pub tokens_used: u32,
    pub shipping_address: ShippingAddress,
    pub customer_notes: String,
    pub placed_by: String,
}

impl Order {
    /// Open a pending order. `totals` must already be rounded for storage.
    pub fn place(new: NewOrder, order_number: String, now: DateTime<Utc>) -> Self {
        let NewOrder { customer_id, shop_id, items, totals, tokens_used, shipping_address, customer_notes, placed_by } = new;
        let mut order = Self {
            id: Uuid::now_v7(), order_number, customer_id, shop_id, status: OrderStatus::Pending,
            subtotal: totals.subtotal, tax_amount: totals.tax, shipping_cost: totals.shipping,
            discount_amount: totals.discount, tokens_used, tokens_value: totals.tokens_value, total: totals.total,
            shipping_address, customer_notes, tracking_number: None, tracking_url: None, items,
            status_history: vec![StatusHistoryEntry { status: OrderStatus::Pending, notes: "Order placed".into(), changed_by: placed_by, created_at: now }],
            ordered_at: now, confirmed_at: None, shipped_at: None, delivered_at: None, cancelled_at: None,
            updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, order_number: order.order_number.clone(), customer_id, shop_id, total: order.total.amount(),
        }));
        order
    }

    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
    pub fn latest_history(&self) -> Option<&StatusHistoryEntry> { self.status_history.last() }

    /// Validate and apply a status change. On error nothing is modified.
    pub fn transition(&mut self, next: OrderStatus, changed_by: &str, notes: Option<&str>, now: DateTime<Utc>) -> Result<(), CommerceError> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(CommerceError::InvalidTransition { from, to: next });
        }
        self.status = next;
        let stamp = match next {
            OrderStatus::Confirmed => Some(&mut self.confirmed_at),
            OrderStatus::Shipped => Some(&mut self.shipped_at),
            OrderStatus::Delivered => Some(&mut self.delivered_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Refunded => None,
        };
        if let Some(slot) = stamp {
            slot.get_or_insert(now);
        }
        let notes = match notes {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => format!("Status changed from {from} to {next}"),
        };
        self.status_history.push(StatusHistoryEntry { status: next, notes, changed_by: changed_by.to_string(), created_at: now });
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: self.id, order_number: self.order_number.clone(), from, to: next, changed_by: changed_by.to_string(),
        }));
        Ok(())
    }

    pub fn set_tracking(&mut self, number: &str, url: Option<&str>, changed_by: &str, now: DateTime<Utc>) -> Result<(), CommerceError> {
        if self.status.is_terminal() {
            return Err(CommerceError::Validation(format!("Order {} is {}; tracking can no longer change", self.order_number, self.status)));
        }
        self.tracking_number = Some(number.to_string());
        self.tracking_url = url.filter(|u| !u.is_empty()).map(str::to_string);
        self.status_history.push(StatusHistoryEntry {
            status: self.status, notes: format!("Tracking number added: {number}"), changed_by: changed_by.to_string(), created_at: now,
        });
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::TrackingUpdated { order_id: self.id, tracking_number: number.to_string() }));
        Ok(())
    }

    /// Put `tokens` worth `value` against a pending order's total.
    pub fn redeem_tokens(&mut self, tokens: u32, value: Money, now: DateTime<Utc>) -> Result<(), CommerceError> {
        if self.status != OrderStatus::Pending {
            return Err(CommerceError::Validation(format!("Order {} is {}; tokens can only be redeemed while pending", self.order_number, self.status)));
        }
        if value > self.total {
            return Err(CommerceError::Validation(format!("Token value {value} exceeds the order amount {}", self.total)));
        }
        self.tokens_used = self.tokens_used.checked_add(tokens)
            .ok_or_else(|| CommerceError::Validation("Too many tokens".into()))?;
        self.tokens_value = self.tokens_value + value;
        self.total = self.total - value;
        self.touch(now);
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}
