//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::router::{AppState, create_router};
use crate::cache::SessionCache;
use crate::config::Config;
use crate::hub::HubClient;
use crate::oidc::{OidcClient, ProviderMetadata};
use crate::store::{RedbTokenStore, TokenStore};
use crate::{Error, Result};

/// Hub gateway server
pub struct HubGateway {
    /// Configuration
    config: Config,
    /// Shared request state
    state: Arc<AppState>,
}

impl HubGateway {
    /// Create a new gateway.
    ///
    /// Discovers identity-provider metadata and opens the token store. A
    /// discovery failure is fatal: without it the gateway cannot serve any
    /// authenticated route.
    pub async fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.hub.upstream_timeout)
            .build()?;

        let issuer = config.issuer_url();
        let metadata = ProviderMetadata::discover(&http, &issuer).await?;
        info!(issuer = %metadata.issuer, "Identity provider discovered");

        let oidc = OidcClient::new(
            http.clone(),
            metadata,
            config.auth.client_id.clone(),
            config.auth.resolve_secret(),
            config.auth.pkce,
        );

        let store_path = config.storage.resolve_path()?;
        let store: Arc<dyn TokenStore> = Arc::new(RedbTokenStore::open(&store_path)?);

        let hub = HubClient::new(http, config.hub.api_url());

        let state = Arc::new(AppState {
            config: config.clone(),
            oidc,
            store,
            cache: SessionCache::new(),
            hub,
        });

        Ok(Self { config, state })
    }

    /// Run the gateway until shutdown
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        // Periodic cache maintenance; lazy eviction on read covers
        // correctness, this keeps the map from accumulating dead entries.
        let cache_state = Arc::clone(&self.state);
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        cache_state.cache.evict_expired();
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("HUB GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(hub = %self.config.hub.api_url(), "Proxying to Hub");
        info!(issuer = %self.state.oidc.issuer(), "Brokering tokens for");
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
