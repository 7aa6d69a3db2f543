//! Charada shop - cart, checkout and order-lifecycle service

use std::sync::Arc;

use anyhow::Result;
use secrecy::ExposeSecret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use charada_shop::api::{self, AppState};
use charada_shop::auth::AuthKeys;
use charada_shop::config::Config;
use charada_shop::domain::events::NatsPublisher;
use charada_shop::store::{memory::MemoryDatabase, postgres::PgDatabase, Database};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    tracing::debug!(?config, "configuration loaded");

    let db: Arc<dyn Database> = match &config.database_url {
        Some(url) => {
            let pg = PgDatabase::connect(url.expose_secret(), config.db_max_connections).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on the in-memory store; data is lost on exit");
            Arc::new(MemoryDatabase::new())
        }
    };
    let events = NatsPublisher::connect(config.nats_url.as_deref()).await;
    let auth = AuthKeys::new(&config.jwt_secret, config.jwt_ttl_secs, config.bcrypt_cost);

    let state = AppState {
        db,
        events: Arc::new(events),
        auth: Arc::new(auth),
        base_url: config.public_base_url.as_str().into(),
    };
    let app = api::router(state);

    let addr = config.socket_addr();
    tracing::info!(%addr, "charada-shop listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
