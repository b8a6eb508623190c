//! Postgres store.
//!
//! Stock is reserved with a conditional `UPDATE ... WHERE stock_quantity >= $n`,
//! loyalty postings lock the customer row first, and status changes only
//! apply while the stored status is still the one the caller read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use uuid::Uuid;
use crate::config::Config;
use crate::domain::aggregates::{
    Customer, LoyaltyToken, Order, OrderItem, OrderStatus, Product, ShippingAddress, Shop, StatusHistoryEntry,
    Subscription, TokenPosting, TransactionType,
};
use crate::domain::value_objects::{Money, Sku};
use crate::{CommerceError, Result};
use super::{LifecycleEffects, OrderStore, TransitionOutcome};

const FK_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(config.db_max_connections).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| CommerceError::Storage(e.to_string()))
    }

    async fn reload(&self, id: Uuid) -> Result<Order> {
        self.order(id).await?.ok_or_else(|| CommerceError::not_found("Order"))
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position")
            .bind(&ids).fetch_all(&self.pool).await?;
        let history = sqlx::query_as::<_, HistoryRow>("SELECT order_id, status, notes, changed_by, created_at FROM order_status_history WHERE order_id = ANY($1) ORDER BY id")
            .bind(&ids).fetch_all(&self.pool).await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in items { items_by_order.entry(row.order_id).or_default().push(row.try_into()?); }
        let mut history_by_order: HashMap<Uuid, Vec<StatusHistoryEntry>> = HashMap::new();
        for row in history { history_by_order.entry(row.order_id).or_default().push(row.try_into()?); }

        rows.into_iter().map(|row| {
            let items = items_by_order.remove(&row.id).unwrap_or_default();
            let history = history_by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items, history)
        }).collect()
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(FromRow)]
struct ShopRow { id: Uuid, merchant_id: Uuid, name: String, is_active: bool, tier: String, status: String }

#[derive(FromRow)]
struct CustomerRow { id: Uuid, username: String, street_address: String, city: String, postal_code: String, country: String, total_orders: i32, total_spent: Decimal }

#[derive(FromRow)]
struct ProductRow {
    id: Uuid, shop_id: Uuid, sku: String, slug: String, name: String, price: Decimal, sale_price: Option<Decimal>,
    cost_price: Option<Decimal>, stock_quantity: i32, min_stock_level: i32, max_stock_level: i32, sales_count: i32,
    is_active: bool, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, customer_id: Uuid, shop_id: Uuid, status: String,
    subtotal: Decimal, tax_amount: Decimal, shipping_cost: Decimal, discount_amount: Decimal,
    tokens_used: i32, tokens_value: Decimal, total: Decimal,
    shipping_street_address: String, shipping_city: String, shipping_postal_code: String, shipping_country: String,
    customer_notes: String, tracking_number: Option<String>, tracking_url: Option<String>,
    ordered_at: DateTime<Utc>, confirmed_at: Option<DateTime<Utc>>, shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>, cancelled_at: Option<DateTime<Utc>>, updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid, order_id: Uuid, product_id: Uuid, product_name: String, product_sku: String, unit_price: Decimal,
    quantity: i32, line_total: Decimal, tax_rate: Decimal, tax_amount: Decimal,
}

#[derive(FromRow)]
struct HistoryRow { order_id: Uuid, status: String, notes: String, changed_by: String, created_at: DateTime<Utc> }

#[derive(FromRow)]
struct LoyaltyRow {
    id: i64, customer_id: Uuid, transaction_type: String, amount: i64, balance_after: i64, order_id: Option<Uuid>,
    description: String, created_at: DateTime<Utc>,
}

fn count(value: i32, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| CommerceError::Storage(format!("negative {field}: {value}")))
}

impl TryFrom<ShopRow> for Shop {
    type Error = CommerceError;
    fn try_from(r: ShopRow) -> Result<Self> {
        Ok(Shop {
            id: r.id, merchant_id: r.merchant_id, name: r.name, is_active: r.is_active,
            subscription: Subscription { merchant_id: r.merchant_id, tier: r.tier.parse()?, status: r.status.parse()? },
        })
    }
}

impl TryFrom<CustomerRow> for Customer {
    type Error = CommerceError;
    fn try_from(r: CustomerRow) -> Result<Self> {
        Ok(Customer {
            id: r.id, username: r.username, street_address: r.street_address, city: r.city, postal_code: r.postal_code,
            country: r.country, total_orders: count(r.total_orders, "total_orders")?, total_spent: Money::new(r.total_spent),
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = CommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, shop_id: r.shop_id, sku: Sku::new(r.sku).map_err(|e| CommerceError::Storage(e.to_string()))?,
            slug: r.slug, name: r.name, price: Money::new(r.price), sale_price: r.sale_price.map(Money::new),
            cost_price: r.cost_price.map(Money::new), stock_quantity: count(r.stock_quantity, "stock_quantity")?,
            min_stock_level: count(r.min_stock_level, "min_stock_level")?, max_stock_level: count(r.max_stock_level, "max_stock_level")?,
            sales_count: count(r.sales_count, "sales_count")?, is_active: r.is_active, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = CommerceError;
    fn try_from(r: OrderItemRow) -> Result<Self> {
        Ok(OrderItem {
            id: r.id, product_id: r.product_id, product_name: r.product_name, product_sku: r.product_sku,
            unit_price: Money::new(r.unit_price), quantity: count(r.quantity, "quantity")?, line_total: Money::new(r.line_total),
            tax_rate: r.tax_rate, tax_amount: Money::new(r.tax_amount),
        })
    }
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
    type Error = CommerceError;
    fn try_from(r: HistoryRow) -> Result<Self> {
        Ok(StatusHistoryEntry { status: parse_status(&r.status)?, notes: r.notes, changed_by: r.changed_by, created_at: r.created_at })
    }
}

impl TryFrom<LoyaltyRow> for LoyaltyToken {
    type Error = CommerceError;
    fn try_from(r: LoyaltyRow) -> Result<Self> {
        Ok(LoyaltyToken {
            id: r.id, customer_id: r.customer_id, transaction_type: r.transaction_type.parse()?, amount: r.amount,
            balance_after: r.balance_after, order_id: r.order_id, description: r.description, created_at: r.created_at,
        })
    }
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>, status_history: Vec<StatusHistoryEntry>) -> Result<Order> {
        Ok(Order {
            id: self.id, order_number: self.order_number, customer_id: self.customer_id, shop_id: self.shop_id,
            status: parse_status(&self.status)?, subtotal: Money::new(self.subtotal), tax_amount: Money::new(self.tax_amount),
            shipping_cost: Money::new(self.shipping_cost), discount_amount: Money::new(self.discount_amount),
            tokens_used: count(self.tokens_used, "tokens_used")?, tokens_value: Money::new(self.tokens_value), total: Money::new(self.total),
            shipping_address: ShippingAddress {
                street_address: self.shipping_street_address, city: self.shipping_city,
                postal_code: self.shipping_postal_code, country: self.shipping_country,
            },
            customer_notes: self.customer_notes, tracking_number: self.tracking_number, tracking_url: self.tracking_url,
            items, status_history, ordered_at: self.ordered_at, confirmed_at: self.confirmed_at, shipped_at: self.shipped_at,
            delivered_at: self.delivered_at, cancelled_at: self.cancelled_at, updated_at: self.updated_at, events: vec![],
        })
    }
}

/// Stored status strings are written by us; anything else is corruption.
fn parse_status(s: &str) -> Result<OrderStatus> {
    s.parse().map_err(|_| CommerceError::Storage(format!("unknown order status '{s}'")))
}

fn qty(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| CommerceError::Validation(format!("quantity {value} is too large")))
}

const SHOP_SELECT: &str = "SELECT s.id, s.merchant_id, s.name, s.is_active, COALESCE(sub.tier, 'free') AS tier, COALESCE(sub.status, 'active') AS status \
     FROM shops s LEFT JOIN subscriptions sub ON sub.merchant_id = s.merchant_id";

// =============================================================================
// Transaction steps
// =============================================================================

async fn lock_customer(conn: &mut PgConnection, customer_id: Uuid) -> Result<()> {
    sqlx::query("SELECT id FROM customers WHERE id = $1 FOR UPDATE").bind(customer_id)
        .fetch_optional(&mut *conn).await?
        .map(|_| ())
        .ok_or_else(|| CommerceError::not_found("Customer"))
}

async fn reserve(conn: &mut PgConnection, product_id: Uuid, quantity: u32) -> Result<()> {
    let reserved = sqlx::query("UPDATE products SET stock_quantity = stock_quantity - $2, sales_count = sales_count + $2, updated_at = NOW() \
         WHERE id = $1 AND is_active AND stock_quantity >= $2")
        .bind(product_id).bind(qty(quantity)?).execute(&mut *conn).await?;
    if reserved.rows_affected() == 1 { return Ok(()); }

    let current: Option<(String, i32, bool)> = sqlx::query_as("SELECT name, stock_quantity, is_active FROM products WHERE id = $1")
        .bind(product_id).fetch_optional(&mut *conn).await?;
    Err(match current {
        None => CommerceError::not_found(format!("Product {product_id}")),
        Some((name, _, false)) => CommerceError::ProductInactive(name),
        Some((name, stock, true)) => CommerceError::OutOfStock { product: name, requested: quantity, available: count(stock, "stock_quantity")? },
    })
}

async fn restock(conn: &mut PgConnection, product_id: Uuid, quantity: u32) -> Result<()> {
    sqlx::query("UPDATE products SET stock_quantity = stock_quantity + $2, sales_count = GREATEST(sales_count - $2, 0), updated_at = NOW() WHERE id = $1")
        .bind(product_id).bind(qty(quantity)?).execute(&mut *conn).await?;
    Ok(())
}

async fn insert_history(conn: &mut PgConnection, order_id: Uuid, entry: &StatusHistoryEntry) -> Result<()> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, notes, changed_by, created_at) VALUES ($1, $2, $3, $4, $5)")
        .bind(order_id).bind(entry.status.as_str()).bind(&entry.notes).bind(&entry.changed_by).bind(entry.created_at)
        .execute(&mut *conn).await?;
    Ok(())
}

async fn post(conn: &mut PgConnection, posting: &TokenPosting) -> Result<Option<LoyaltyToken>> {
    lock_customer(conn, posting.customer_id).await?;
    if posting.transaction_type == TransactionType::Earned {
        let already: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM loyalty_tokens WHERE order_id = $1 AND transaction_type = 'earned')")
            .bind(posting.order_id).fetch_one(&mut *conn).await?;
        if already { return Ok(None); }
    }
    let balance: i64 = sqlx::query_scalar("SELECT balance_after FROM loyalty_tokens WHERE customer_id = $1 ORDER BY id DESC LIMIT 1")
        .bind(posting.customer_id).fetch_optional(&mut *conn).await?.unwrap_or(0);
    let staged = posting.clone().apply(balance, 0, Utc::now())?;
    let row = sqlx::query_as::<_, LoyaltyRow>(
        "INSERT INTO loyalty_tokens (customer_id, transaction_type, amount, balance_after, order_id, description, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *")
        .bind(staged.customer_id).bind(staged.transaction_type.as_str()).bind(staged.amount).bind(staged.balance_after)
        .bind(staged.order_id).bind(&staged.description).bind(staged.created_at)
        .fetch_one(&mut *conn).await?;
    Ok(Some(row.try_into()?))
}

/// Product row locks are always taken in id order, so two checkouts over the
/// same products queue behind each other instead of deadlocking.
fn by_product(lines: impl IntoIterator<Item = (Uuid, u32)>) -> Vec<(Uuid, u32)> {
    let mut lines: Vec<_> = lines.into_iter().collect();
    lines.sort_by_key(|(product_id, _)| *product_id);
    lines
}

fn stored(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.events.clear();
    copy
}

#[async_trait]
impl OrderStore for PgStore {
    async fn shop(&self, id: Uuid) -> Result<Option<Shop>> {
        sqlx::query_as::<_, ShopRow>(&format!("{SHOP_SELECT} WHERE s.id = $1"))
            .bind(id).fetch_optional(&self.pool).await?
            .map(Shop::try_from).transpose()
    }

    async fn shops_of_merchant(&self, merchant_id: Uuid) -> Result<Vec<Shop>> {
        sqlx::query_as::<_, ShopRow>(&format!("{SHOP_SELECT} WHERE s.merchant_id = $1 ORDER BY s.created_at"))
            .bind(merchant_id).fetch_all(&self.pool).await?
            .into_iter().map(Shop::try_from).collect()
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>> {
        sqlx::query_as::<_, CustomerRow>("SELECT id, username, street_address, city, postal_code, country, total_orders, total_spent FROM customers WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Customer::try_from).transpose()
    }

    async fn products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?;
        let mut by_id: HashMap<Uuid, Product> = HashMap::with_capacity(rows.len());
        for row in rows { let p = Product::try_from(row)?; by_id.insert(p.id, p); }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn delete_product(&self, id: Uuid) -> Result<()> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        let name = name.ok_or_else(|| CommerceError::not_found("Product"))?;
        match sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(FK_VIOLATION) => Err(CommerceError::ProductInUse(name)),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_order(&self, order: &Order, spend: Option<TokenPosting>) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        lock_customer(&mut tx, order.customer_id).await?;
        for (product_id, quantity) in by_product(order.items.iter().map(|i| (i.product_id, i.quantity))) {
            reserve(&mut tx, product_id, quantity).await?;
        }

        let a = &order.shipping_address;
        let inserted = sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, shop_id, status, subtotal, tax_amount, shipping_cost, discount_amount, \
             tokens_used, tokens_value, total, shipping_street_address, shipping_city, shipping_postal_code, shipping_country, \
             customer_notes, ordered_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)")
            .bind(order.id).bind(&order.order_number).bind(order.customer_id).bind(order.shop_id).bind(order.status.as_str())
            .bind(order.subtotal.amount()).bind(order.tax_amount.amount()).bind(order.shipping_cost.amount())
            .bind(order.discount_amount.amount()).bind(qty(order.tokens_used)?).bind(order.tokens_value.amount())
            .bind(order.total.amount()).bind(&a.street_address).bind(&a.city).bind(&a.postal_code).bind(&a.country)
            .bind(&order.customer_notes).bind(order.ordered_at).bind(order.updated_at)
            .execute(&mut *tx).await;
        match inserted {
            Err(sqlx::Error::Database(db)) if db.constraint() == Some("orders_order_number_key") => {
                return Err(CommerceError::DuplicateOrderNumber(order.order_number.clone()));
            }
            other => { other?; }
        }

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, position, product_name, product_sku, unit_price, quantity, line_total, tax_rate, tax_amount) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
                .bind(item.id).bind(order.id).bind(item.product_id).bind(position as i32).bind(&item.product_name)
                .bind(&item.product_sku).bind(item.unit_price.amount()).bind(qty(item.quantity)?).bind(item.line_total.amount())
                .bind(item.tax_rate).bind(item.tax_amount.amount())
                .execute(&mut *tx).await?;
        }
        for entry in &order.status_history {
            insert_history(&mut tx, order.id, entry).await?;
        }
        if let Some(spend) = &spend {
            post(&mut tx, spend).await?;
        }
        sqlx::query("UPDATE customers SET total_orders = total_orders + 1, total_spent = total_spent + $2 WHERE id = $1")
            .bind(order.customer_id).bind(order.total.amount()).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(stored(order))
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE customer_id = $1 ORDER BY ordered_at DESC, id DESC")
            .bind(customer_id).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn orders_for_shops(&self, shop_ids: &[Uuid]) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE shop_id = ANY($1) ORDER BY ordered_at DESC, id DESC")
            .bind(shop_ids).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn commit_transition(&self, order: &Order, expected: OrderStatus, effects: &LifecycleEffects) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE orders SET status = $2, confirmed_at = COALESCE(confirmed_at, $3), shipped_at = COALESCE(shipped_at, $4), \
             delivered_at = COALESCE(delivered_at, $5), cancelled_at = COALESCE(cancelled_at, $6), updated_at = $7 \
             WHERE id = $1 AND status = $8")
            .bind(order.id).bind(order.status.as_str()).bind(order.confirmed_at).bind(order.shipped_at)
            .bind(order.delivered_at).bind(order.cancelled_at).bind(order.updated_at).bind(expected.as_str())
            .execute(&mut *tx).await?;
        if updated.rows_affected() == 0 {
            let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1").bind(order.id).fetch_optional(&mut *tx).await?;
            return Err(match current {
                None => CommerceError::not_found("Order"),
                Some(status) => CommerceError::InvalidTransition { from: parse_status(&status)?, to: order.status },
            });
        }
        if let Some(entry) = order.latest_history() {
            insert_history(&mut tx, order.id, entry).await?;
        }
        for (product_id, quantity) in by_product(effects.restock.iter().copied()) {
            restock(&mut tx, product_id, quantity).await?;
        }
        let mut tokens = Vec::new();
        for posting in &effects.postings {
            tokens.extend(post(&mut tx, posting).await?);
        }
        tx.commit().await?;
        Ok(TransitionOutcome { order: self.reload(order.id).await?, tokens })
    }

    async fn commit_tracking(&self, order: &Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let status: Option<String> = sqlx::query_scalar(
            "UPDATE orders SET tracking_number = $2, tracking_url = $3, updated_at = $4 \
             WHERE id = $1 AND status NOT IN ('delivered', 'cancelled', 'refunded') RETURNING status")
            .bind(order.id).bind(&order.tracking_number).bind(&order.tracking_url).bind(order.updated_at)
            .fetch_optional(&mut *tx).await?;
        let status = match status {
            Some(status) => parse_status(&status)?,
            None => {
                let current: Option<(String, String)> = sqlx::query_as("SELECT order_number, status FROM orders WHERE id = $1")
                    .bind(order.id).fetch_optional(&mut *tx).await?;
                return Err(match current {
                    None => CommerceError::not_found("Order"),
                    Some((number, status)) => CommerceError::Validation(format!("Order {number} is {status}; tracking can no longer change")),
                });
            }
        };
        if let Some(entry) = order.latest_history() {
            insert_history(&mut tx, order.id, &StatusHistoryEntry { status, ..entry.clone() }).await?;
        }
        tx.commit().await?;
        self.reload(order.id).await
    }

    async fn redeem_tokens(&self, order_id: Uuid, tokens: u32, value: Money, spend: TokenPosting) -> Result<(Order, LoyaltyToken)> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id).fetch_optional(&mut *tx).await?
            .ok_or_else(|| CommerceError::not_found("Order"))?;
        let mut order = row.into_order(vec![], vec![])?;
        if order.customer_id != spend.customer_id {
            return Err(CommerceError::Forbidden("Tokens can only be redeemed on the customer's own orders".into()));
        }
        order.redeem_tokens(tokens, value, Utc::now())?;

        sqlx::query("UPDATE orders SET tokens_used = $2, tokens_value = $3, total = $4, updated_at = $5 WHERE id = $1")
            .bind(order.id).bind(qty(order.tokens_used)?).bind(order.tokens_value.amount()).bind(order.total.amount()).bind(order.updated_at)
            .execute(&mut *tx).await?;
        let token = post(&mut tx, &spend).await?
            .ok_or_else(|| CommerceError::Storage("spend posting was not written".into()))?;
        sqlx::query("UPDATE customers SET total_spent = total_spent - $2 WHERE id = $1")
            .bind(order.customer_id).bind(value.amount()).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok((self.reload(order_id).await?, token))
    }

    async fn post_tokens(&self, posting: TokenPosting) -> Result<Option<LoyaltyToken>> {
        let mut tx = self.pool.begin().await?;
        let row = post(&mut tx, &posting).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn loyalty_balance(&self, customer_id: Uuid) -> Result<i64> {
        let balance: Option<i64> = sqlx::query_scalar("SELECT balance_after FROM loyalty_tokens WHERE customer_id = $1 ORDER BY id DESC LIMIT 1")
            .bind(customer_id).fetch_optional(&self.pool).await?;
        Ok(balance.unwrap_or(0))
    }

    async fn loyalty_history(&self, customer_id: Uuid) -> Result<Vec<LoyaltyToken>> {
        sqlx::query_as::<_, LoyaltyRow>("SELECT * FROM loyalty_tokens WHERE customer_id = $1 ORDER BY id")
            .bind(customer_id).fetch_all(&self.pool).await?
            .into_iter().map(LoyaltyToken::try_from).collect()
    }
}
