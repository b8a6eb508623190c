//! Local Retail Commerce Core
//!
//! Order lifecycle engine for a two-sided local retail marketplace.
//!
//! ## Features
//! - Checkout: cart validation, item snapshots, atomic stock reservation
//! - Order status machine with an append-only audit trail
//! - VAT, shipping and token redemption pricing in exact decimals
//! - Loyalty token ledger with running balances
//! - Merchant commission resolution by subscription tier

pub mod config;
pub mod domain;
pub mod http;
pub mod notify;
pub mod service;
pub mod store;

pub use config::Config;
pub use domain::aggregates::{Order, OrderStatus};
pub use service::OrderService;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("{0}")]
    Validation(String),

    #[error("Request validation failed")]
    Fields(#[from] validator::ValidationErrors),

    #[error("Product '{product}' has only {available} items in stock.")]
    OutOfStock { product: String, requested: u32, available: u32 },

    #[error("Product '{0}' is not available.")]
    ProductInactive(String),

    #[error("Order cannot move from {from} to {to}.")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Insufficient token balance: requested {requested}, available {available}.")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Product '{0}' is referenced by existing orders")]
    ProductInUse(String),

    #[error("Order number {0} already exists")]
    DuplicateOrderNumber(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CommerceError {
    pub fn not_found(what: impl Into<String>) -> Self { Self::NotFound(what.into()) }
}

impl From<sqlx::Error> for CommerceError {
    fn from(e: sqlx::Error) -> Self { CommerceError::Storage(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
