//! Order Lifecycle Engine
//!
//! `OrderService` validates requests against the current catalog and
//! customer state, builds the aggregate changes, and hands them to the
//! store as one transaction. Events are published after the commit.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use crate::config::Config;
use crate::domain::aggregates::{
    generate_order_number, AddressInput, Cart, CartLine, LoyaltyPolicy, LoyaltyToken, NewOrder, Order, OrderItem,
    OrderStatus, Product, Shop, TokenPosting, TransactionType,
};
use crate::domain::events::{DomainEvent, LoyaltyEvent};
use crate::domain::pricing::price_cart;
use crate::domain::value_objects::Money;
use crate::notify::Notifier;
use crate::store::{LifecycleEffects, OrderStore};
use crate::{CommerceError, Result};

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

// =============================================================================
// Callers
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { Customer, Merchant }

/// Authenticated caller. `id` is the customer or merchant id, `username`
/// is what the audit trail records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor { pub id: Uuid, pub role: Role, pub username: String }

impl Actor {
    pub fn customer(id: Uuid, username: impl Into<String>) -> Self { Self { id, role: Role::Customer, username: username.into() } }
    pub fn merchant(id: Uuid, username: impl Into<String>) -> Self { Self { id, role: Role::Merchant, username: username.into() } }

    fn owns(&self, order: &Order) -> bool { self.role == Role::Customer && self.id == order.customer_id }
    fn runs(&self, shop: &Shop) -> bool { self.role == Role::Merchant && self.id == shop.merchant_id }
}

// =============================================================================
// Requests & projections
// =============================================================================

#[derive(Clone, Debug, Default)]
pub struct PlaceOrder {
    /// Taken from the first product when absent.
    pub shop_id: Option<Uuid>,
    pub items: Vec<CartLine>,
    pub address: AddressInput,
    pub customer_notes: String,
    pub tokens_to_spend: u32,
}

/// An order as its merchant sees it, with the platform's cut.
#[derive(Clone, Debug)]
pub struct MerchantOrder { pub order: Order, pub commission_rate: Decimal, pub commission_amount: Money }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LoyaltyBalance { pub balance: i64, pub value: Money }

/// Restock, token refunds and accrual that accompany moving `order` from
/// `from` to its current status.
pub fn lifecycle_effects(order: &Order, from: OrderStatus, policy: &LoyaltyPolicy) -> LifecycleEffects {
    let to = order.status;
    let mut effects = LifecycleEffects::default();
    let aborted = matches!(to, OrderStatus::Cancelled | OrderStatus::Refunded);

    if to == OrderStatus::Cancelled || (to == OrderStatus::Refunded && from.holds_stock()) {
        effects.restock = order.items.iter().map(|i| (i.product_id, i.quantity)).collect();
    }
    if aborted && order.tokens_used > 0 {
        effects.postings.push(TokenPosting::refund(order.customer_id, i64::from(order.tokens_used), order.id, &order.order_number));
    }
    if to == OrderStatus::Delivered {
        let tokens = policy.tokens_for(order.total);
        if tokens > 0 {
            effects.postings.push(TokenPosting::earn(order.customer_id, tokens, order.id, &order.order_number));
        }
    }
    effects
}

fn earned_events(tokens: &[LoyaltyToken]) -> impl Iterator<Item = DomainEvent> + '_ {
    tokens.iter().filter(|t| t.transaction_type == TransactionType::Earned).filter_map(|t| {
        Some(DomainEvent::Loyalty(LoyaltyEvent::TokensEarned {
            customer_id: t.customer_id, order_id: t.order_id?, tokens: t.amount, balance_after: t.balance_after,
        }))
    })
}

// =============================================================================
// Service
// =============================================================================

pub struct OrderService<S> {
    store: Arc<S>,
    config: Config,
    notifier: Notifier,
}

impl<S> Clone for OrderService<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), config: self.config.clone(), notifier: self.notifier.clone() } }
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: Arc<S>, config: Config, notifier: Notifier) -> Self { Self { store, config, notifier } }

    pub fn store(&self) -> &S { &self.store }
    pub fn config(&self) -> &Config { &self.config }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    pub async fn create_order(&self, actor: &Actor, request: PlaceOrder) -> Result<Order> {
        if actor.role != Role::Customer {
            return Err(CommerceError::Forbidden("Only customers can place orders".into()));
        }
        let cart = Cart::from_lines(request.items)?;
        let customer = self.store.customer(actor.id).await?.ok_or_else(|| CommerceError::not_found("Customer"))?;

        let ids = cart.product_ids();
        let products: HashMap<Uuid, Product> = self.store.products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
        if let Some(missing) = ids.iter().find(|id| !products.contains_key(id)) {
            return Err(CommerceError::not_found(format!("Product {missing}")));
        }
        let lines: Vec<(&Product, u32)> = cart.lines().iter().filter_map(|l| products.get(&l.product_id).map(|p| (p, l.quantity))).collect();

        let shop_id = match (request.shop_id, lines.first()) {
            (Some(id), _) => id,
            (None, Some((p, _))) => p.shop_id,
            (None, None) => return Err(CommerceError::Validation("Cart is empty".into())),
        };
        if lines.iter().any(|(p, _)| p.shop_id != shop_id) {
            return Err(CommerceError::Validation("All items must belong to the same shop".into()));
        }
        let shop = self.store.shop(shop_id).await?.ok_or_else(|| CommerceError::not_found("Shop"))?;
        if !shop.is_operational() {
            return Err(CommerceError::Validation(format!("Shop '{}' is not accepting orders", shop.name)));
        }
        for (product, qty) in &lines {
            product.ensure_available(*qty)?;
        }

        let shipping_address = customer.shipping_address(&request.address);
        if !shipping_address.is_complete() {
            return Err(CommerceError::Validation("Shipping address requires street, city and postal code".into()));
        }

        let tax_rate = self.config.pricing.tax_rate;
        let items: Vec<OrderItem> = lines.iter().map(|(p, q)| OrderItem::snapshot(p, *q, tax_rate)).collect();
        let price_lines: Vec<_> = items.iter().map(OrderItem::price_line).collect();
        let tokens = request.tokens_to_spend;
        let tokens_value = self.config.loyalty.value_of(i64::from(tokens));
        let totals = price_cart(&price_lines, &self.config.pricing, Money::ZERO, tokens_value);
        if tokens_value > totals.before_tokens() {
            return Err(CommerceError::Validation(format!(
                "Token value {tokens_value} exceeds the order amount {}", totals.before_tokens().round_cents()
            )));
        }
        if tokens > 0 {
            let available = self.store.loyalty_balance(customer.id).await?;
            if i64::from(tokens) > available {
                return Err(CommerceError::InsufficientBalance { requested: i64::from(tokens), available });
            }
        }

        let new = NewOrder {
            customer_id: customer.id, shop_id, items, totals: totals.rounded(), tokens_used: tokens,
            shipping_address, customer_notes: request.customer_notes.trim().to_string(), placed_by: actor.username.clone(),
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Utc::now();
            let mut order = Order::place(new.clone(), generate_order_number(now), now);
            let spend = (tokens > 0).then(|| TokenPosting::spend(customer.id, i64::from(tokens), order.id, &order.order_number));
            match self.store.insert_order(&order, spend).await {
                Ok(saved) => {
                    info!(order_number = %saved.order_number, customer = %saved.customer_id, shop = %saved.shop_id, total = %saved.total, "order placed");
                    self.notifier.publish_all(order.take_events()).await;
                    return Ok(saved);
                }
                Err(CommerceError::DuplicateOrderNumber(number)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    warn!(%number, attempt, "order number collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Status machine
    // -------------------------------------------------------------------------

    pub async fn transition_status(&self, actor: &Actor, order_id: Uuid, next: OrderStatus, notes: Option<&str>) -> Result<Order> {
        let order = self.load(order_id).await?;
        self.ensure_merchant_of(actor, &order).await?;
        self.apply_transition(order, next, &actor.username, notes).await
    }

    /// Customer owner or shop merchant; only `pending` and `confirmed` orders.
    pub async fn cancel(&self, actor: &Actor, order_id: Uuid, reason: Option<&str>) -> Result<Order> {
        let order = self.load(order_id).await?;
        if !actor.owns(&order) {
            self.ensure_merchant_of(actor, &order).await?;
        }
        if !order.status.is_cancellable() {
            return Err(CommerceError::InvalidTransition { from: order.status, to: OrderStatus::Cancelled });
        }
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or("No reason provided");
        let notes = format!("Order cancelled: {reason}");
        self.apply_transition(order, OrderStatus::Cancelled, &actor.username, Some(&notes)).await
    }

    pub async fn update_tracking(&self, actor: &Actor, order_id: Uuid, tracking_number: &str, tracking_url: Option<&str>) -> Result<Order> {
        let mut order = self.load(order_id).await?;
        self.ensure_merchant_of(actor, &order).await?;
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(CommerceError::Validation("Tracking number is required".into()));
        }
        order.set_tracking(tracking_number, tracking_url, &actor.username, Utc::now())?;
        let saved = self.store.commit_tracking(&order).await?;
        info!(order_number = %saved.order_number, tracking_number, "tracking updated");
        self.notifier.publish_all(order.take_events()).await;
        Ok(saved)
    }

    async fn apply_transition(&self, mut order: Order, next: OrderStatus, changed_by: &str, notes: Option<&str>) -> Result<Order> {
        let from = order.status;
        order.transition(next, changed_by, notes, Utc::now())?;
        let effects = lifecycle_effects(&order, from, &self.config.loyalty);
        let outcome = self.store.commit_transition(&order, from, &effects).await?;
        info!(order_number = %order.order_number, %from, to = %next, changed_by, restocked = effects.restock.len(), "order status changed");

        let mut events = order.take_events();
        events.extend(earned_events(&outcome.tokens));
        self.notifier.publish_all(events).await;
        Ok(outcome.order)
    }

    // -------------------------------------------------------------------------
    // Loyalty
    // -------------------------------------------------------------------------

    /// Credit `floor(total / threshold)` tokens for a delivered order. Returns
    /// `None` when the order earns nothing or has already earned. The delivered
    /// transition calls the same posting, so this only repairs a missed accrual.
    pub async fn accrue_loyalty(&self, order: &Order) -> Result<Option<LoyaltyToken>> {
        let current = self.load(order.id).await?;
        if current.status != OrderStatus::Delivered {
            return Err(CommerceError::Validation(format!("Order {} is {}; tokens accrue on delivery", current.order_number, current.status)));
        }
        let tokens = self.config.loyalty.tokens_for(current.total);
        if tokens == 0 {
            return Ok(None);
        }
        let row = self.store.post_tokens(TokenPosting::earn(current.customer_id, tokens, current.id, &current.order_number)).await?;
        match &row {
            Some(r) => {
                info!(order_number = %current.order_number, tokens, balance = r.balance_after, "loyalty tokens earned");
                self.notifier.publish_all(earned_events(std::slice::from_ref(r)).collect()).await;
            }
            None => info!(order_number = %current.order_number, "loyalty already accrued"),
        }
        Ok(row)
    }

    /// Redeem tokens against the customer's own pending order. The order's
    /// `tokens_used`, `tokens_value` and `total` change with the ledger row,
    /// so a later cancel or refund credits them back.
    pub async fn spend_loyalty(&self, customer_id: Uuid, tokens: i64, order: &Order) -> Result<LoyaltyToken> {
        if tokens < 1 {
            return Err(CommerceError::Validation("Token amount must be at least 1".into()));
        }
        if customer_id != order.customer_id {
            return Err(CommerceError::Forbidden("Tokens can only be redeemed on the customer's own orders".into()));
        }
        let count = u32::try_from(tokens).map_err(|_| CommerceError::Validation(format!("Token amount {tokens} is too large")))?;
        let value = self.config.loyalty.value_of(tokens);
        let spend = TokenPosting::spend(customer_id, tokens, order.id, &order.order_number);
        let (saved, row) = self.store.redeem_tokens(order.id, count, value, spend).await?;
        info!(order_number = %saved.order_number, tokens, balance = row.balance_after, total = %saved.total, "loyalty tokens spent");
        Ok(row)
    }

    pub async fn loyalty_balance(&self, actor: &Actor) -> Result<LoyaltyBalance> {
        ensure_customer(actor)?;
        let balance = self.store.loyalty_balance(actor.id).await?;
        Ok(LoyaltyBalance { balance, value: self.config.loyalty.value_of(balance) })
    }

    pub async fn loyalty_history(&self, actor: &Actor) -> Result<Vec<LoyaltyToken>> {
        ensure_customer(actor)?;
        self.store.loyalty_history(actor.id).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Visible to the ordering customer and the shop's merchant; anyone else
    /// gets `NotFound`.
    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order> {
        let order = self.load(order_id).await?;
        if actor.owns(&order) {
            return Ok(order);
        }
        match self.store.shop(order.shop_id).await? {
            Some(shop) if actor.runs(&shop) => Ok(order),
            _ => Err(CommerceError::not_found("Order")),
        }
    }

    pub async fn my_orders(&self, actor: &Actor) -> Result<Vec<Order>> {
        ensure_customer(actor)?;
        self.store.orders_for_customer(actor.id).await
    }

    pub async fn merchant_orders(&self, actor: &Actor) -> Result<Vec<MerchantOrder>> {
        if actor.role != Role::Merchant {
            return Err(CommerceError::Forbidden("Only merchants can view shop orders".into()));
        }
        let shops: HashMap<Uuid, Shop> = self.store.shops_of_merchant(actor.id).await?.into_iter().map(|s| (s.id, s)).collect();
        let shop_ids: Vec<Uuid> = shops.keys().copied().collect();
        let orders = self.store.orders_for_shops(&shop_ids).await?;
        Ok(orders.into_iter().filter_map(|order| {
            let subscription = &shops.get(&order.shop_id)?.subscription;
            Some(MerchantOrder { commission_rate: subscription.commission_rate(), commission_amount: subscription.commission_on(order.total), order })
        }).collect())
    }

    /// Merchant of the product's shop only. Products referenced by orders stay.
    pub async fn delete_product(&self, actor: &Actor, product_id: Uuid) -> Result<()> {
        let product = self.store.products(&[product_id]).await?.pop().ok_or_else(|| CommerceError::not_found("Product"))?;
        let shop = self.store.shop(product.shop_id).await?.ok_or_else(|| CommerceError::not_found("Shop"))?;
        if !actor.runs(&shop) {
            return Err(CommerceError::Forbidden("Only the shop's merchant can delete its products".into()));
        }
        self.store.delete_product(product_id).await?;
        info!(product = %product.name, "product deleted");
        Ok(())
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.store.order(order_id).await?.ok_or_else(|| CommerceError::not_found("Order"))
    }

    async fn ensure_merchant_of(&self, actor: &Actor, order: &Order) -> Result<()> {
        match self.store.shop(order.shop_id).await? {
            Some(shop) if actor.runs(&shop) => Ok(()),
            _ => Err(CommerceError::Forbidden("Only the shop's merchant can manage this order".into())),
        }
    }
}

fn ensure_customer(actor: &Actor) -> Result<()> {
    match actor.role {
        Role::Customer => Ok(()),
        Role::Merchant => Err(CommerceError::Forbidden("Only customers have a loyalty account and orders".into())),
    }
}
