//! `gatehoused`: the access decision server.
//!
//! Usage:
//!   gatehoused -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/gatehouse/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use gatehouse_core::Module;
use tracing::info;

use config::ServerConfig;

/// Gatehouse access server.
#[derive(Parser, Debug)]
#[command(name = "gatehoused", about = "Screen access decision server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;
    bootstrap::verify_config(&server_config)?;

    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = gatehouse_core::ServiceConfig {
        data_dir: Some(data_dir),
        sqlite_path: server_config.storage.sqlite_path.as_ref().map(Into::into),
        listen: cli.listen.clone(),
    };

    let sqlite_path = core_config.resolve_sqlite_path();
    let sql: Arc<dyn gatehouse_sql::SQLStore> = Arc::new(
        gatehouse_sql::SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    info!("SQL store opened at {}", sqlite_path.display());

    let access_module = access::AccessModule::new(sql, server_config.access_config())?;
    info!(admin_screen = %server_config.access.admin_screen, "Access module initialized");

    bootstrap::seed_catalog(access_module.service(), &server_config)?;

    let app = routes::build_router(vec![(access_module.name(), access_module.routes())]);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("Gatehouse server listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
