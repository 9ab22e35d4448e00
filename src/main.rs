//! ledger-authority - Binary Entry Point
//!
//! Serves the remote authority log that devices sync against.

use std::sync::Arc;

use tracing::info;

use life_ledger::api::http::create_router;
use life_ledger::config::AuthorityConfig;
use life_ledger::logging;
use life_ledger::sync::MemoryAuthority;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init();

    let config = AuthorityConfig::from_env()?;
    let authority = match &config.log_path {
        Some(path) => MemoryAuthority::open(path)?,
        None => {
            info!("no LEDGER_AUTHORITY_LOG set; events are kept in memory only");
            MemoryAuthority::new()
        }
    };
    let app = create_router(Arc::new(authority));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, version = life_ledger::VERSION, "authority listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
