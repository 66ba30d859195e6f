//! # Trestle
//!
//! Process bootstrap: load `.env`, load configuration, initialise
//! logging, connect the database when one is configured, register the
//! routes and serve until Ctrl-C.
//!
//! Usage: `trestle [config.toml]`

mod routes;

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::info;
use trestle_core::config::{load_dotenv, AppConfig};
use trestle_core::logging::init_tracing;
use trestle_core::{Database, Router, Server};

/// Load `path` into the process environment when it exists
///
/// Must run before any thread is spawned: it calls `std::env::set_var`.
fn load_env_file(path: &Path) -> anyhow::Result<Option<usize>> {
    if !path.exists() {
        return Ok(None);
    }
    let count = load_dotenv(path).with_context(|| format!("loading {}", path.display()))?;
    Ok(Some(count))
}

fn main() -> anyhow::Result<()> {
    let loaded = load_env_file(Path::new(".env"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;
    runtime.block_on(run(loaded))
}

async fn run(loaded: Option<usize>) -> anyhow::Result<()> {
    init_tracing(std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")));
    if let Some(count) = loaded {
        info!(variables = count, "Loaded .env");
    }

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("loading configuration")?;

    let db = Database::new();
    if let Some(db_config) = &config.database {
        db.connect(db_config)
            .await
            .with_context(|| format!("connecting to {}", db_config.endpoint()))?;
    }

    let mut router = Router::new();
    routes::register(&mut router, &db, config.database.is_some()).context("registering routes")?;
    info!(routes = router.routes().len(), "Routes registered");

    let server = Server::new(router, config.server);
    let served = server.serve().await;

    db.disconnect().await.context("closing database")?;
    served.context("serving HTTP")?;
    info!("Server stopped");
    Ok(())
}
