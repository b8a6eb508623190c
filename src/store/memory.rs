//! In-process store.
//!
//! One async mutex guards the whole state, so every trait call is a single
//! critical section. Writes stage their changes on copies of the touched
//! rows and only write them back once every check has passed.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::domain::aggregates::{Customer, LoyaltyToken, Order, OrderStatus, Product, Shop, StatusHistoryEntry, TokenPosting, TransactionType};
use crate::domain::value_objects::Money;
use crate::{CommerceError, Result};
use super::{LifecycleEffects, OrderStore, TransitionOutcome};

#[derive(Default)]
struct State {
    shops: HashMap<Uuid, Shop>,
    customers: HashMap<Uuid, Customer>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    ledger: Vec<LoyaltyToken>,
}

#[derive(Default)]
pub struct MemoryStore { state: Mutex<State> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_shop(&self, shop: Shop) { self.state.lock().await.shops.insert(shop.id, shop); }
    pub async fn insert_customer(&self, customer: Customer) { self.state.lock().await.customers.insert(customer.id, customer); }

    /// Insert or replace a catalog row.
    pub async fn upsert_product(&self, product: Product) { self.state.lock().await.products.insert(product.id, product); }

    pub async fn product(&self, id: Uuid) -> Option<Product> { self.state.lock().await.products.get(&id).cloned() }
}

impl State {
    fn balance(&self, customer_id: Uuid) -> i64 {
        self.ledger.iter().rev().find(|t| t.customer_id == customer_id).map(|t| t.balance_after).unwrap_or(0)
    }

    fn has_earned(&self, order_id: Option<Uuid>) -> bool {
        self.ledger.iter().any(|t| t.transaction_type == TransactionType::Earned && t.order_id == order_id)
    }

    /// Turn postings into rows against running balances without writing them.
    fn stage_postings(&self, postings: &[TokenPosting]) -> Result<Vec<LoyaltyToken>> {
        let now = Utc::now();
        let mut staged: Vec<LoyaltyToken> = Vec::with_capacity(postings.len());
        for posting in postings {
            if posting.transaction_type == TransactionType::Earned
                && (self.has_earned(posting.order_id) || staged.iter().any(|t| t.transaction_type == TransactionType::Earned && t.order_id == posting.order_id))
            {
                continue;
            }
            let balance = staged.iter().rev().find(|t| t.customer_id == posting.customer_id)
                .map(|t| t.balance_after)
                .unwrap_or_else(|| self.balance(posting.customer_id));
            let id = (self.ledger.len() + staged.len() + 1) as i64;
            staged.push(posting.clone().apply(balance, id, now)?);
        }
        Ok(staged)
    }

    fn sorted(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at).then(b.id.cmp(&a.id)));
        orders
    }
}

fn stored(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.events.clear();
    copy
}

/// Carry a transition made on a caller's copy over to the stored order.
fn absorb_transition(current: &mut Order, applied: &Order) {
    current.status = applied.status;
    current.confirmed_at = current.confirmed_at.or(applied.confirmed_at);
    current.shipped_at = current.shipped_at.or(applied.shipped_at);
    current.delivered_at = current.delivered_at.or(applied.delivered_at);
    current.cancelled_at = current.cancelled_at.or(applied.cancelled_at);
    current.updated_at = applied.updated_at;
    current.status_history.extend(applied.latest_history().cloned());
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn shop(&self, id: Uuid) -> Result<Option<Shop>> { Ok(self.state.lock().await.shops.get(&id).cloned()) }

    async fn shops_of_merchant(&self, merchant_id: Uuid) -> Result<Vec<Shop>> {
        Ok(self.state.lock().await.shops.values().filter(|s| s.merchant_id == merchant_id).cloned().collect())
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> { Ok(self.state.lock().await.customers.get(&id).cloned()) }

    async fn products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        let product = state.products.get(&id).ok_or_else(|| CommerceError::not_found("Product"))?;
        if state.orders.values().any(|o| o.items.iter().any(|i| i.product_id == id)) {
            return Err(CommerceError::ProductInUse(product.name.clone()));
        }
        state.products.remove(&id);
        Ok(())
    }

    async fn insert_order(&self, order: &Order, spend: Option<TokenPosting>) -> Result<Order> {
        let mut state = self.state.lock().await;
        if state.orders.values().any(|o| o.order_number == order.order_number) {
            return Err(CommerceError::DuplicateOrderNumber(order.order_number.clone()));
        }
        let mut customer = state.customers.get(&order.customer_id).cloned().ok_or_else(|| CommerceError::not_found("Customer"))?;

        let mut reserved: Vec<Product> = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let mut product = state.products.get(&item.product_id).cloned()
                .ok_or_else(|| CommerceError::not_found(format!("Product {}", item.product_id)))?;
            product.reserve(item.quantity)?;
            reserved.push(product);
        }
        let tokens = state.stage_postings(&spend.into_iter().collect::<Vec<_>>())?;
        customer.record_order(order.total);

        for product in reserved { state.products.insert(product.id, product); }
        state.ledger.extend(tokens);
        state.customers.insert(customer.id, customer);
        let saved = stored(order);
        state.orders.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> { Ok(self.state.lock().await.orders.get(&id).cloned()) }

    async fn orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(State::sorted(state.orders.values().filter(|o| o.customer_id == customer_id).cloned().collect()))
    }

    async fn orders_for_shops(&self, shop_ids: &[Uuid]) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(State::sorted(state.orders.values().filter(|o| shop_ids.contains(&o.shop_id)).cloned().collect()))
    }

    async fn commit_transition(&self, order: &Order, expected: OrderStatus, effects: &LifecycleEffects) -> Result<TransitionOutcome> {
        let mut state = self.state.lock().await;
        let mut current = state.orders.get(&order.id).cloned().ok_or_else(|| CommerceError::not_found("Order"))?;
        if current.status != expected {
            return Err(CommerceError::InvalidTransition { from: current.status, to: order.status });
        }

        let mut restocked: Vec<Product> = Vec::with_capacity(effects.restock.len());
        for (product_id, qty) in &effects.restock {
            let mut product = state.products.get(product_id).cloned()
                .ok_or_else(|| CommerceError::not_found(format!("Product {product_id}")))?;
            product.restock(*qty);
            restocked.push(product);
        }
        let tokens = state.stage_postings(&effects.postings)?;

        for product in restocked { state.products.insert(product.id, product); }
        state.ledger.extend(tokens.iter().cloned());
        absorb_transition(&mut current, order);
        state.orders.insert(current.id, current.clone());
        Ok(TransitionOutcome { order: current, tokens })
    }

    async fn commit_tracking(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.lock().await;
        let current = state.orders.get_mut(&order.id).ok_or_else(|| CommerceError::not_found("Order"))?;
        if current.status.is_terminal() {
            return Err(CommerceError::Validation(format!("Order {} is {}; tracking can no longer change", current.order_number, current.status)));
        }
        current.tracking_number = order.tracking_number.clone();
        current.tracking_url = order.tracking_url.clone();
        current.updated_at = order.updated_at;
        if let Some(entry) = order.latest_history() {
            current.status_history.push(StatusHistoryEntry { status: current.status, ..entry.clone() });
        }
        Ok(current.clone())
    }

    async fn redeem_tokens(&self, order_id: Uuid, tokens: u32, value: Money, spend: TokenPosting) -> Result<(Order, LoyaltyToken)> {
        let mut state = self.state.lock().await;
        let mut order = state.orders.get(&order_id).cloned().ok_or_else(|| CommerceError::not_found("Order"))?;
        if order.customer_id != spend.customer_id {
            return Err(CommerceError::Forbidden("Tokens can only be redeemed on the customer's own orders".into()));
        }
        order.redeem_tokens(tokens, value, Utc::now())?;
        let row = state.stage_postings(std::slice::from_ref(&spend))?.pop()
            .ok_or_else(|| CommerceError::Storage("spend posting was not written".into()))?;
        let mut customer = state.customers.get(&order.customer_id).cloned().ok_or_else(|| CommerceError::not_found("Customer"))?;
        customer.total_spent = customer.total_spent - value;

        state.ledger.push(row.clone());
        state.customers.insert(customer.id, customer);
        state.orders.insert(order.id, order.clone());
        Ok((order, row))
    }

    async fn post_tokens(&self, posting: TokenPosting) -> Result<Option<LoyaltyToken>> {
        let mut state = self.state.lock().await;
        let row = state.stage_postings(std::slice::from_ref(&posting))?.pop();
        if let Some(row) = &row { state.ledger.push(row.clone()); }
        Ok(row)
    }

    async fn loyalty_balance(&self, customer_id: Uuid) -> Result<i64> { Ok(self.state.lock().await.balance(customer_id)) }

    async fn loyalty_history(&self, customer_id: Uuid) -> Result<Vec<LoyaltyToken>> {
        Ok(self.state.lock().await.ledger.iter().filter(|t| t.customer_id == customer_id).cloned().collect())
    }
}
