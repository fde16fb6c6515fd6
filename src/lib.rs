pub mod api;
pub mod config;
pub mod directory; // Shared doctor list
pub mod filtering; // Patient list filtering engine
pub mod lookup; // File-number search
pub mod models;
pub mod registration; // Patient + visit registration workflow
pub mod schedule; // Doctor schedule view
pub mod session; // Identity, role, bearer tokens
pub mod store; // Remote data access
pub mod upcoming; // Rolling 7-day window
pub mod views; // Debounce + latest-wins, for embedding front ends

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ConfigError, StoreConfig};
use crate::directory::DirectoryCache;
use crate::session::{AuthError, Authenticator, RemoteAuth, TokenRegistry};
use crate::store::{AnyStore, RestStore, SqliteStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Authentication setup failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open the configured store and the matching authenticator.
pub fn open_backend(config: &AppConfig) -> Result<(AnyStore, Authenticator), StartupError> {
    match &config.store {
        StoreConfig::Sqlite { path } => {
            let store = SqliteStore::open(path)?;
            let registry = TokenRegistry::new(&config.tokens);
            if registry.is_empty() {
                tracing::warn!("No bearer tokens configured; every API call will be refused");
            }
            tracing::info!(path = %path.display(), tokens = registry.len(), "Using local store");
            Ok((AnyStore::Sqlite(store), Authenticator::Tokens(registry)))
        }
        StoreConfig::Remote {
            url,
            key,
            timeout_secs,
        } => {
            let store = RestStore::new(url, key, *timeout_secs)?;
            let auth = RemoteAuth::new(url, key, *timeout_secs)?;
            if !config.tokens.is_empty() {
                tracing::warn!("Static tokens are ignored with a remote store");
            }
            tracing::info!(url = %url, "Using remote store");
            Ok((AnyStore::Rest(store), Authenticator::Remote(auth)))
        }
    }
}

pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = AppConfig::from_env()?;
    let (store, auth) = open_backend(&config)?;

    let directory = Arc::new(DirectoryCache::new());
    match directory.refresh(&store).await {
        Ok(count) => tracing::info!(count, "Doctor directory loaded"),
        Err(e) => tracing::warn!(error = %e, "Doctor directory unavailable at startup"),
    }

    let ctx = api::ApiContext::new(store, directory, auth);
    let mut server = api::start_server(ctx, config.bind).await?;
    tracing::info!(addr = %server.addr, "Serving until Ctrl-C");

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    server.stopped().await;
    Ok(())
}
