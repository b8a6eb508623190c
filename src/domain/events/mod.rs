//! Domain events
use crate::domain::aggregates::OrderStatus;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Loyalty(LoyaltyEvent),
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, customer_id: Uuid, shop_id: Uuid, total: Decimal },
    StatusChanged { order_id: Uuid, order_number: String, from: OrderStatus, to: OrderStatus, changed_by: String },
    TrackingUpdated { order_id: Uuid, tracking_number: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoyaltyEvent {
    TokensEarned { customer_id: Uuid, order_id: Uuid, tokens: i64, balance_after: i64 },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Placed { .. }) => "commerce.orders.placed",
            DomainEvent::Order(OrderEvent::StatusChanged { .. }) => "commerce.orders.status_changed",
            DomainEvent::Order(OrderEvent::TrackingUpdated { .. }) => "commerce.orders.tracking_updated",
            DomainEvent::Loyalty(LoyaltyEvent::TokensEarned { .. }) => "commerce.loyalty.tokens_earned",
        }
    }
}
