//! Shared server state and startup.

use std::sync::Arc;

use crate::api;
use crate::auth::Authenticator;
use crate::gateway;
use crate::presence::PresenceRegistry;
use crate::router::MessageRouter;
use crate::store::{MemoryStore, MessageStore};

/// State shared by every HTTP handler and WebSocket connection.
pub struct AppState {
    /// Routes send requests and serves conversation history.
    pub router: MessageRouter,
    /// Verifies bearer tokens.
    pub auth: Authenticator,
    /// Refuse WebSocket upgrades that carry no valid token.
    pub require_ws_auth: bool,
}

impl AppState {
    /// Creates state over `store` with a fresh presence registry.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, auth: Authenticator) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        Self {
            router: MessageRouter::new(store, presence),
            auth,
            require_ws_auth: false,
        }
    }

    /// Sets whether WebSocket clients must present a token.
    #[must_use]
    pub const fn with_ws_auth(mut self, required: bool) -> Self {
        self.require_ws_auth = required;
        self
    }

    /// The process-wide presence registry.
    #[must_use]
    pub const fn presence(&self) -> &Arc<PresenceRegistry> {
        self.router.presence()
    }
}

/// Builds the full axum application: REST API plus the `/ws` endpoint.
pub fn app(state: Arc<AppState>) -> axum::Router {
    api::routes()
        .route("/ws", axum::routing::get(gateway::ws_handler))
        .with_state(state)
}

/// Starts a server with an in-memory store and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
    jwt_secret: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let state = AppState::new(Arc::new(MemoryStore::new()), Authenticator::new(jwt_secret));
    start_server_with_state(addr, Arc::new(state)).await
}

/// Starts the server with a pre-configured [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app(state)).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
