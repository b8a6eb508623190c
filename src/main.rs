//! Local Retail Commerce - order lifecycle and loyalty service

use anyhow::Result;
use localretail_commerce::{http, notify::Notifier, store::{MemoryStore, PgStore}, Config, OrderService};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let notifier = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Notifier::new(Some(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                Notifier::disabled()
            }
        },
        None => Notifier::disabled(),
    };

    let app = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, &config).await?;
            store.migrate().await?;
            http::router(OrderService::new(Arc::new(store), config.clone(), notifier))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store");
            http::router(OrderService::new(Arc::new(MemoryStore::new()), config.clone(), notifier))
        }
    };

    tracing::info!("🚀 Local Retail Commerce listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
