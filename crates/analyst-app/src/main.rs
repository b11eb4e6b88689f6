//! Analyst application binary - composition root.
//!
//! Ties the workspace crates into a single executable:
//! 1. Load `.env`, configuration and CLI overrides
//! 2. Install the tracing subscriber
//! 3. Build the service registry (SQLite, language model, knowledge base)
//! 4. Serve the axum API until Ctrl-C, rebuild the knowledge base with
//!    `analyst index`, or write the config file with `analyst init`

mod cli;
mod services;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use analyst_api::{start_server, AppState};
use analyst_core::config::{expand_home, AnalystConfig};
use analyst_vector::ensure_knowledge_dir;

use crate::cli::{CliArgs, Command};
use crate::services::Services;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply;
    // the outcome is reported once the subscriber is installed.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match AnalystConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (AnalystConfig::default(), Some(e)),
    };
    args.apply(&mut config);

    let filter = match args.log_level {
        Some(ref level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting analyst v{}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read .env file"),
    }
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(_) if !config_file.exists() => {
            tracing::info!(path = %config_file.display(), "No configuration file, using defaults")
        }
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load configuration, using defaults"
        ),
    }

    config.validate()?;

    match args.command() {
        Command::Serve => serve(config).await,
        Command::Index => index(config).await,
        Command::Init { force } => {
            if services::write_config(&config_file, &config, force)? {
                println!("Wrote {}", config_file.display());
            } else {
                println!(
                    "{} already exists (use --force to overwrite)",
                    config_file.display()
                );
            }
            Ok(())
        }
    }
}

async fn serve(config: AnalystConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = expand_home(&config.general.data_dir);
    let services = Services::build(&config, &data_dir).await?;

    let state = AppState::new(
        config.clone(),
        services.database.clone(),
        services.model.clone(),
        services.retriever.clone(),
        services.policy.clone(),
    );

    tracing::info!(
        retrieval = services.knowledge.is_some(),
        "Chat UI at http://{}:{}/",
        config.server.host,
        config.server.port
    );

    let result = start_server(state, shutdown_signal()).await;
    services.shutdown();
    result?;
    Ok(())
}

async fn index(config: AnalystConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = expand_home(&config.general.data_dir);
    let database = services::open_database(&data_dir)?;
    let kb = services::knowledge_base(&config, database.clone())?;

    if ensure_knowledge_dir(kb.dir())? {
        println!("Seeded {} with the default guide", kb.dir().display());
    }
    let report = kb.index_directory().await?;
    println!(
        "Indexed {} chunks from {} files in {}",
        report.chunks,
        report.files,
        kb.dir().display()
    );
    for skipped in &report.skipped {
        println!("  skipped: {}", skipped);
    }

    database.checkpoint()?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
