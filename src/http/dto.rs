//! Request bodies and response projections.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{AddressInput, CartLine, LoyaltyToken, Order, OrderItem, OrderStatus, StatusHistoryEntry, TransactionType};
use crate::domain::value_objects::Money;
use crate::service::{MerchantOrder, PlaceOrder};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub shop_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub shipping_street_address: Option<String>,
    #[validate(length(max = 100))]
    pub shipping_city: Option<String>,
    #[validate(length(max = 10))]
    pub shipping_postal_code: Option<String>,
    #[validate(length(equal = 2, message = "Country must be a two-letter code"))]
    pub shipping_country: Option<String>,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub customer_notes: String,
    #[serde(default)]
    pub tokens_to_spend: u32,
    #[validate(length(min = 1, message = "Cart cannot be empty"))]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItemRequest { pub product_id: Uuid, pub quantity: u32 }

impl From<CreateOrderRequest> for PlaceOrder {
    fn from(r: CreateOrderRequest) -> Self {
        PlaceOrder {
            shop_id: r.shop_id,
            items: r.items.into_iter().map(|i| CartLine { product_id: i.product_id, quantity: i.quantity }).collect(),
            address: AddressInput {
                street_address: r.shipping_street_address, city: r.shipping_city,
                postal_code: r.shipping_postal_code, country: r.shipping_country,
            },
            customer_notes: r.customer_notes,
            tokens_to_spend: r.tokens_to_spend,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    #[validate(length(min = 1))]
    pub status: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTrackingRequest {
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: String,
    #[validate(url)]
    pub tracking_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

impl UpdateStatusRequest {
    pub fn parsed_status(&self) -> crate::Result<OrderStatus> { self.status.trim().parse() }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
}

impl From<&OrderItem> for OrderItemView {
    fn from(i: &OrderItem) -> Self {
        Self {
            product_id: i.product_id, product_name: i.product_name.clone(), product_sku: i.product_sku.clone(),
            unit_price: i.unit_price, quantity: i.quantity, line_total: i.line_total, tax_rate: i.tax_rate, tax_amount: i.tax_amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryView { pub status: OrderStatus, pub notes: String, pub changed_by: String, pub created_at: DateTime<Utc> }

impl From<&StatusHistoryEntry> for HistoryView {
    fn from(h: &StatusHistoryEntry) -> Self {
        Self { status: h.status, notes: h.notes.clone(), changed_by: h.changed_by.clone(), created_at: h.created_at }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
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
    pub shipping_street_address: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub customer_notes: String,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub item_count: u32,
    pub items: Vec<OrderItemView>,
    pub status_history: Vec<HistoryView>,
    pub ordered_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderDetail {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id, order_number: o.order_number.clone(), customer_id: o.customer_id, shop_id: o.shop_id, status: o.status,
            subtotal: o.subtotal, tax_amount: o.tax_amount, shipping_cost: o.shipping_cost, discount_amount: o.discount_amount,
            tokens_used: o.tokens_used, tokens_value: o.tokens_value, total: o.total,
            shipping_street_address: o.shipping_address.street_address.clone(), shipping_city: o.shipping_address.city.clone(),
            shipping_postal_code: o.shipping_address.postal_code.clone(), shipping_country: o.shipping_address.country.clone(),
            customer_notes: o.customer_notes.clone(), tracking_number: o.tracking_number.clone(), tracking_url: o.tracking_url.clone(),
            item_count: o.item_count(), items: o.items.iter().map(Into::into).collect(),
            status_history: o.status_history.iter().map(Into::into).collect(),
            ordered_at: o.ordered_at, confirmed_at: o.confirmed_at, shipped_at: o.shipped_at, delivered_at: o.delivered_at,
            cancelled_at: o.cancelled_at, updated_at: o.updated_at,
        }
    }
}

/// List row.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub shop_id: Uuid,
    pub status: OrderStatus,
    pub total: Money,
    pub item_count: u32,
    pub ordered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_rate: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_amount: Option<Money>,
}

impl From<&Order> for OrderSummary {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id, order_number: o.order_number.clone(), shop_id: o.shop_id, status: o.status, total: o.total,
            item_count: o.item_count(), ordered_at: o.ordered_at, commission_rate: None, commission_amount: None,
        }
    }
}

impl From<&MerchantOrder> for OrderSummary {
    fn from(m: &MerchantOrder) -> Self {
        Self { commission_rate: Some(m.commission_rate), commission_amount: Some(m.commission_amount), ..OrderSummary::from(&m.order) }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenView {
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub order_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<&LoyaltyToken> for TokenView {
    fn from(t: &LoyaltyToken) -> Self {
        Self {
            transaction_type: t.transaction_type, amount: t.amount, balance_after: t.balance_after, order_id: t.order_id,
            description: t.description.clone(), created_at: t.created_at,
        }
    }
}
