//! `MatchChat` server -- persisted direct messages with live delivery.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store on the default address 0.0.0.0:5000
//! JWT_SECRET=change-me cargo run --bin matchchat-server
//!
//! # SQLite store on a custom address
//! cargo run --bin matchchat-server -- --bind 127.0.0.1:8080 \
//!     --database ./data/messages.db --jwt-secret change-me
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use matchchat_server::auth::Authenticator;
use matchchat_server::config::{ServerCliArgs, ServerConfig};
use matchchat_server::server::{self, AppState};
use matchchat_server::sqlite::SqliteStore;
use matchchat_server::store::{MemoryStore, MessageStore};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    let store: Arc<dyn MessageStore> = match &config.database_path {
        Some(path) => match SqliteStore::open(path, config.max_text_len) {
            Ok(store) => {
                tracing::info!(path = %path.display(), "using sqlite message store");
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to open message store");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("no database configured, messages are kept in memory only");
            Arc::new(MemoryStore::with_max_text_len(config.max_text_len))
        }
    };

    let state = AppState::new(store, Authenticator::new(&config.jwt_secret))
        .with_ws_auth(config.require_ws_auth);

    tracing::info!(addr = %config.bind_addr, "starting matchchat server");

    match server::start_server_with_state(&config.bind_addr, Arc::new(state)).await {
        Ok((bound_addr, mut handle)) => {
            tracing::info!(addr = %bound_addr, "server listening");
            tokio::select! {
                result = &mut handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    handle.abort();
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}

/// Initialize logging to stdout, or to a file when one is configured.
///
/// The returned [`WorkerGuard`] must be held until shutdown so buffered file
/// output is flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((path, file_name)) = file_path.and_then(|p| Some((p, p.file_name()?))) else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };
    let log_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
