//! chirp - minimal self-hosted microblog with a provider CLI
//!
//! Main entry point for the chirp command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use chirp::config::Config;
use chirp::provider::ProviderContext;
use chirp::{cli, web, App, ChirpError, Cli, Commands, ProviderRegistry, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet || config.output.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .without_time()
        .init();

    if !config.output.colors {
        colored::control::set_override(false);
    }

    // Run the appropriate command
    match &cli.command {
        Commands::Serve(args) => cmd_serve(&cli, &config, args).await,
        Commands::Init => cmd_init(&cli, &config),
        Commands::Run(args) => cmd_run(&config, args),
        Commands::Providers => cmd_providers(),
        Commands::Build(args) => cmd_build(args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

fn db_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.db.clone().unwrap_or_else(|| config.db_path())
}

fn open_storage(path: &PathBuf) -> Result<Storage> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Storage::open(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

async fn cmd_serve(cli: &Cli, config: &Config, args: &cli::ServeArgs) -> Result<()> {
    let db_path = db_path(cli, config);
    if !db_path.exists() {
        return Err(ChirpError::DatabaseNotFound { path: db_path }.into());
    }
    let storage = open_storage(&db_path)?;
    let app = App::new(storage).with_session_ttl(config.session_ttl());

    let bind = args.bind.clone().unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    println!("{}", "chirp is listening".bold().cyan());
    println!("  Address:  http://{bind}");
    println!("  Database: {}", db_path.display());
    info!(%bind, "server started");

    let router = web::router(Arc::new(Mutex::new(app)));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}

fn cmd_init(cli: &Cli, config: &Config) -> Result<()> {
    let db_path = db_path(cli, config);
    open_storage(&db_path)?;
    println!(
        "{} Database ready at {}",
        "✓".green(),
        db_path.display().to_string().cyan()
    );
    Ok(())
}

fn cmd_run(config: &Config, args: &cli::RunArgs) -> Result<()> {
    let registry = ProviderRegistry::with_builtins();
    let ctx = ProviderContext {
        api_key: config.provider.api_key.clone(),
    };

    let name = args
        .provider
        .as_deref()
        .unwrap_or(&config.provider.default_provider);
    let model = args
        .model
        .as_deref()
        .or(config.provider.default_model.as_deref());

    let result = registry
        .resolve(name, &ctx)
        .and_then(|provider| provider.run(model));
    match result {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(err) => {
            let suggestion = err.suggestion();
            let suggestions: Vec<&str> = suggestion.as_deref().into_iter().collect();
            eprintln!(
                "{}",
                chirp::format_error("Provider dispatch failed", &err.to_string(), &suggestions)
            );
            std::process::exit(1);
        }
    }
}

fn cmd_providers() -> Result<()> {
    let registry = ProviderRegistry::with_builtins();
    println!("{}", "Registered providers".bold().cyan());
    for name in registry.names() {
        println!("  {name}");
    }
    Ok(())
}

fn cmd_build(args: &cli::BuildArgs) -> Result<()> {
    println!(
        "{} {}",
        "Building Docker image".cyan(),
        args.tag.as_str().bold()
    );
    let status = std::process::Command::new("docker")
        .args(["build", "-t", &args.tag, "."])
        .status()
        .context("Failed to invoke docker")?;

    if !status.success() {
        anyhow::bail!("docker build exited with {status}");
    }
    Ok(())
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "chirp", &mut io::stdout());
    Ok(())
}
