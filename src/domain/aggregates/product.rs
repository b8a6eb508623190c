//! Product Aggregate
//!
//! Catalog rows as the order core sees them. Stock accounting lives here:
//! `reserve` and `restock` are the only mutations, and the stock status is
//! always derived from the raw counters.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::CommerceError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub sku: Sku,
    pub slug: String,
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub cost_price: Option<Money>,
    pub stock_quantity: u32,
    pub min_stock_level: u32,
    pub max_stock_level: u32,
    pub sales_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus { InStock, LowStock, OutOfStock }

impl StockStatus {
    /// Classify a stock count against the low-stock threshold.
    pub fn classify(quantity: u32, min_stock_level: u32) -> Self {
        if quantity == 0 { StockStatus::OutOfStock }
        else if quantity <= min_stock_level { StockStatus::LowStock }
        else { StockStatus::InStock }
    }
}

impl Product {
    pub fn create(shop_id: Uuid, sku: Sku, name: impl Into<String>, price: Money) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), shop_id, slug: slugify(&name), sku, name, price,
            sale_price: None, cost_price: None, stock_quantity: 0, min_stock_level: 5,
            max_stock_level: 1000, sales_count: 0, is_active: true, created_at: now, updated_at: now,
        }
    }

    /// The sale price wins only when it undercuts the list price.
    pub fn current_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if sale < self.price => sale,
            _ => self.price,
        }
    }

    pub fn stock_status(&self) -> StockStatus { StockStatus::classify(self.stock_quantity, self.min_stock_level) }
    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }
    pub fn stock(&self) -> Quantity { Quantity::new(self.stock_quantity) }

    /// Margin over cost in percent, if a positive cost price is known.
    pub fn profit_margin(&self) -> Option<Decimal> {
        let cost = self.cost_price?.amount();
        if cost <= Decimal::ZERO { return None; }
        Some((self.current_price().amount() - cost) / cost * Decimal::ONE_HUNDRED)
    }

    /// Check that `qty` units could be sold right now, without mutating.
    pub fn ensure_available(&self, qty: u32) -> Result<(), CommerceError> {
        if !self.is_active { return Err(CommerceError::ProductInactive(self.name.clone())); }
        if qty > self.stock_quantity {
            return Err(CommerceError::OutOfStock { product: self.name.clone(), requested: qty, available: self.stock_quantity });
        }
        Ok(())
    }

    /// Compare-and-decrement. Leaves the product untouched on failure.
    pub fn reserve(&mut self, qty: u32) -> Result<(), CommerceError> {
        self.ensure_available(qty)?;
        let remaining = self.stock().subtract(qty).ok_or_else(|| CommerceError::OutOfStock {
            product: self.name.clone(), requested: qty, available: self.stock_quantity,
        })?;
        self.stock_quantity = remaining.value();
        self.sales_count = self.sales_count.saturating_add(qty);
        self.touch();
        Ok(())
    }

    pub fn restock(&mut self, qty: u32) {
        self.stock_quantity = self.stock().add(qty).value();
        self.sales_count = self.sales_count.saturating_sub(qty);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn slugify(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}
