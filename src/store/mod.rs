//! Persistence seam for the order core.
//!
//! Every method that writes is one transaction: it either applies all of its
//! effects or none of them. Stock reservation and loyalty postings are
//! re-checked inside that transaction, so callers may validate optimistically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::aggregates::{Customer, LoyaltyToken, Order, OrderStatus, Product, Shop, TokenPosting};
use crate::domain::value_objects::Money;
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Side effects that ride along with a status change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifecycleEffects {
    /// `(product_id, quantity)` to put back on the shelf.
    pub restock: Vec<(Uuid, u32)>,
    pub postings: Vec<TokenPosting>,
}

#[derive(Clone, Debug)]
pub struct TransitionOutcome {
    pub order: Order,
    /// Ledger rows actually written; skipped postings are absent.
    pub tokens: Vec<LoyaltyToken>,
}

#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    async fn shop(&self, id: Uuid) -> Result<Option<Shop>>;
    async fn shops_of_merchant(&self, merchant_id: Uuid) -> Result<Vec<Shop>>;
    async fn customer(&self, id: Uuid) -> Result<Option<Customer>>;
    async fn products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;

    /// Fails with `ProductInUse` while any order item references the product.
    async fn delete_product(&self, id: Uuid) -> Result<()>;

    /// Persist a freshly placed order: items, first history row, stock
    /// reservations, optional token spend and customer statistics.
    async fn insert_order(&self, order: &Order, spend: Option<TokenPosting>) -> Result<Order>;

    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>>;
    async fn orders_for_shops(&self, shop_ids: &[Uuid]) -> Result<Vec<Order>>;

    /// Persist a transition already applied to `order`, provided the stored
    /// status is still `expected`. Only the status, its timestamps and the
    /// newest history row are written onto the stored order, along with
    /// `effects`. Returns the stored order as it now reads.
    async fn commit_transition(&self, order: &Order, expected: OrderStatus, effects: &LifecycleEffects) -> Result<TransitionOutcome>;

    /// Persist tracking fields and the newest history row onto the stored
    /// order. Fails with `Validation` once the stored order is terminal.
    async fn commit_tracking(&self, order: &Order) -> Result<Order>;

    /// Redeem `tokens` worth `value` against a stored pending order and write
    /// the `spend` row, in one transaction.
    async fn redeem_tokens(&self, order_id: Uuid, tokens: u32, value: Money, spend: TokenPosting) -> Result<(Order, LoyaltyToken)>;

    /// Append one ledger row. An `earned` posting for an order that already
    /// earned is skipped and yields `None`.
    async fn post_tokens(&self, posting: TokenPosting) -> Result<Option<LoyaltyToken>>;

    async fn loyalty_balance(&self, customer_id: Uuid) -> Result<i64>;
    async fn loyalty_history(&self, customer_id: Uuid) -> Result<Vec<LoyaltyToken>>;
}
