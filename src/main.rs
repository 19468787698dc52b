use anyhow::{Context, Result};
use axum::{extract::FromRef, Router};
use reqwest::Client;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::CatalogCache;
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::store::StoreHandle;

// Declare modules
mod cache;
mod catalog;
mod config;
mod error;
mod filters;
mod images;
mod listing;
mod models;
mod query;
mod routes;
mod store;
mod view;

// Shared by every handler. The catalog cache is cheap to clone; all clones
// share the same entries.
#[derive(Clone, FromRef)]
pub struct AppState {
    settings: Arc<Settings>,
    catalog: CatalogCache,
}

impl AppState {
    pub fn new(settings: Settings, store: StoreHandle) -> Self {
        let catalog = CatalogCache::new(Catalog::new(store), &settings.cache);
        AppState {
            settings: Arc::new(settings),
            catalog,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "powerauto=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing Power Auto server...");

    // Load configuration
    let settings = match Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // One client for every store request
    let http_client = Client::builder()
        .user_agent(concat!("powerauto/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .context("Failed to build shared reqwest client")?;

    // Missing credentials are not fatal: pages render the connection banner
    let store = StoreHandle::from_settings(&settings, http_client)?;

    let app_state = AppState::new(settings, store);

    let router: Router = routes::create_router(app_state.clone());
    let app = router
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = match app_state.settings.server_address.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(
                "Invalid server address format in configuration ('{}'): {}",
                app_state.settings.server_address,
                e
            );
            return Err(anyhow::anyhow!("Invalid server address format: {}", app_state.settings.server_address));
        }
    };

    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!("Server listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
