//! Agency Back Office - CRM, content calendar, tasks, inventory and income
//!
//! The binary runs the HTTP API by default. Subcommands cover the one-off
//! jobs:
//! - `setup-db`: create the schema and report table counts
//! - `import-customers`: load the customer spreadsheet
//! - `create-test-user`: add a team member and print a bearer token

mod app;
mod cli;
mod config;
mod http;
mod import;
mod rules;
mod store;
mod util;
mod whatsapp;

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::cli::{Cli, Commands, CreateUserArgs, ImportArgs};
use crate::config::Config;
use crate::http::build_router;
use crate::http::middleware::{sign_jwt, JwtClaims};
use crate::store::db;
use crate::store::{FileStore, UserStore};
use crate::util::time::init_server_time;

/// Lifetime of tokens printed by `create-test-user`
const TEST_TOKEN_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::SetupDb => run_script(setup_db).await,
        Commands::ImportCustomers(args) => run_script(|c| import_customers(c, args)).await,
        Commands::CreateTestUser(args) => run_script(|c| create_test_user(c, args)).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(&config.log_level, config.log_json);
    init_server_time();

    info!("Starting Agency Back Office");
    info!("Server address: {}", config.server_addr);

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;
    let applied = db::apply_schema(&pool).await?;
    info!(files = applied.len(), "Schema up to date");

    if config.whatsapp.is_none() {
        warn!("WhatsApp is not configured; reminders can only be copied by hand");
    }

    let addr: SocketAddr = config.server_addr;
    let state = AppState::new(config, pool);
    let router = build_router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Shared setup for the one-off scripts; failures are logged before exiting
async fn run_script<F, Fut>(script: F) -> anyhow::Result<()>
where
    F: FnOnce(Config) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let config = Config::for_scripts()?;
    init_tracing(&config.log_level, config.log_json);

    let result = script(config).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Script failed");
    }
    result
}

async fn setup_db(config: Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.database_url, 1).await?;

    for file in db::apply_schema(&pool).await? {
        info!(file, "Applied schema file");
    }

    for table in db::verify(&pool).await? {
        info!(table = table.table, rows = table.rows, "Table ready");
    }

    info!("Database setup complete");
    Ok(())
}

async fn import_customers(config: Config, args: ImportArgs) -> anyhow::Result<()> {
    let path = args.path.unwrap_or(config.customer_import_path);
    info!(path = %path.display(), "Reading customer spreadsheet");

    // calamine is blocking
    let rows = {
        let path = path.clone();
        tokio::task::spawn_blocking(move || import::read_rows(&path)).await??
    };

    let pool = db::connect(&config.database_url, 1).await?;
    db::apply_schema(&pool).await?;

    let summary = import::import_customers(&pool, rows)
        .await
        .with_context(|| format!("importing {}", path.display()))?;

    let files = FileStore::new(pool, config.upload_dir);
    let cleared = files.remove_customer_dirs(&summary.removed_customers).await;
    info!(cleared, "Removed uploads of replaced customers");

    for row_error in &summary.errors {
        warn!(line = row_error.line, message = %row_error.message, "Row not imported");
    }
    info!(
        total = summary.total,
        imported = summary.imported,
        failed = summary.failed,
        "Import complete"
    );
    Ok(())
}

async fn create_test_user(config: Config, args: CreateUserArgs) -> anyhow::Result<()> {
    if config.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set to sign the token");
    }

    let pool = db::connect(&config.database_url, 1).await?;
    db::apply_schema(&pool).await?;

    let user = UserStore::new(pool)
        .create(&args.email, &args.name, args.role)
        .await?;
    let claims = JwtClaims::for_user(&user, chrono::Duration::days(TEST_TOKEN_DAYS));
    let token = sign_jwt(&claims, &config.jwt_secret)?;

    info!(user_id = %user.id, email = %user.email, "Test user created");
    println!("{token}");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
