//! Portico connector host daemon.
//!
//! Loads connector instances from the manifest directory, connects the
//! remote control-plane session, and serves uniform operations until
//! interrupted.

mod config;
mod logging;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use config::Config;
use portico_connector::cache::TtlCache;
use portico_connector::loader::{ConnectorLoader, FactoryCatalog};
use portico_connector::registry::ConnectorRegistry;
use portico_session::{Dispatcher, OAuthConfig, SessionConfig, SessionManager, TokenProvider};

/// Portico connector host.
#[derive(Debug, Parser)]
#[command(name = "porticod", version, about)]
struct Args {
    /// Connectors directory (overrides CONNECTORS_DIR).
    #[arg(long = "connectors", value_name = "DIR")]
    connectors: Option<PathBuf>,
}

/// Factories for the connector crates this host links against.
///
/// Each linked connector crate contributes one `register` call keyed by
/// the `entry` name its manifests use.
fn builtin_catalog() -> FactoryCatalog {
    FactoryCatalog::new()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load(args.connectors) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        connectors_dir = %config.connectors_dir.display(),
        server_url = %config.ws_url,
        "starting porticod"
    );

    let registry = Arc::new(ConnectorRegistry::new());
    let catalog = builtin_catalog();
    let loader = ConnectorLoader::new(&catalog, &registry);

    match loader.load_dir(&config.connectors_dir).await {
        Ok(report) => {
            info!(
                registered = report.registered.len(),
                initialized = report.initialized.len(),
                skipped = report.skipped_manifests.len(),
                failed_instances = report.failed_instances.len(),
                "connector loading complete"
            );
            if report.initialized.is_empty() {
                warn!("no connector instances initialized; the session will report an empty connector list");
            }
        }
        Err(e) => {
            error!(error = %e, "connector loading failed");
            std::process::exit(1);
        }
    }

    let cache = Arc::new(TtlCache::with_defaults());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), cache));
    let tokens = Arc::new(TokenProvider::new(OAuthConfig {
        token_url: config.token_url,
        client_id: config.client_id,
        client_secret: config.client_secret,
        scope: config.scope,
        audience: config.audience,
        resource: config.resource,
    }));

    let session = Arc::new(SessionManager::new(
        SessionConfig {
            server_url: config.ws_url,
            service_name: "portico".to_string(),
        },
        tokens,
        dispatcher,
    ));
    session.start().await;

    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    session.shutdown().await;
    info!("porticod stopped");
}
