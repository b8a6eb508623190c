//! HTTP surface.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | [`handlers::health`] |
//! | POST | `/api/v1/orders/` | [`handlers::create_order`] |
//! | GET | `/api/v1/orders/my_orders/` | [`handlers::my_orders`] |
//! | GET | `/api/v1/orders/merchant_orders/` | [`handlers::merchant_orders`] |
//! | GET | `/api/v1/orders/:id/` | [`handlers::get_order`] |
//! | PATCH | `/api/v1/orders/:id/update_status/` | [`handlers::update_status`] |
//! | PATCH | `/api/v1/orders/:id/update_tracking/` | [`handlers::update_tracking`] |
//! | POST | `/api/v1/orders/:id/cancel/` | [`handlers::cancel`] |
//! | GET | `/api/v1/loyalty/balance/` | [`handlers::loyalty_balance`] |
//! | GET | `/api/v1/loyalty/transactions/` | [`handlers::loyalty_transactions`] |
//!
//! Every path is served with and without the trailing slash.

pub mod actor;
pub mod body;
pub mod dto;
pub mod error;
pub mod handlers;

use axum::{routing::{get, patch, post, MethodRouter}, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::service::OrderService;
use crate::store::OrderStore;

pub fn router<S: OrderStore>(service: OrderService<S>) -> Router {
    let routes: Vec<(&str, MethodRouter<OrderService<S>>)> = vec![
        ("/api/v1/orders", post(handlers::create_order::<S>)),
        ("/api/v1/orders/my_orders", get(handlers::my_orders::<S>)),
        ("/api/v1/orders/merchant_orders", get(handlers::merchant_orders::<S>)),
        ("/api/v1/orders/:id", get(handlers::get_order::<S>)),
        ("/api/v1/orders/:id/update_status", patch(handlers::update_status::<S>)),
        ("/api/v1/orders/:id/update_tracking", patch(handlers::update_tracking::<S>)),
        ("/api/v1/orders/:id/cancel", post(handlers::cancel::<S>)),
        ("/api/v1/loyalty/balance", get(handlers::loyalty_balance::<S>)),
        ("/api/v1/loyalty/transactions", get(handlers::loyalty_transactions::<S>)),
    ];

    let mut app = Router::new().route("/health", get(handlers::health));
    for (path, method) in routes {
        app = app.route(path, method.clone()).route(&format!("{path}/"), method);
    }
    app.layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(service)
}
