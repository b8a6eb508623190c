//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod customer;
pub mod loyalty;
pub mod subscription;

pub use product::{Product, StockStatus};
pub use order::{generate_order_number, NewOrder, Order, OrderItem, OrderStatus, ShippingAddress, StatusHistoryEntry};
pub use cart::{Cart, CartLine};
pub use customer::{AddressInput, Customer};
pub use loyalty::{LoyaltyPolicy, LoyaltyToken, TokenPosting, TransactionType};
pub use subscription::{Shop, Subscription, SubscriptionStatus, Tier};
