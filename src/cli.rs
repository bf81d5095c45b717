//! CLI definitions for chirp.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// chirp - minimal self-hosted microblog with a provider CLI
#[derive(Parser, Debug)]
#[command(name = "chirp")]
#[command(version)]
#[command(about = "Minimal self-hosted microblog server with a pluggable provider CLI")]
#[command(long_about = r#"
chirp - a tiny self-hosted microblog plus a provider-dispatch CLI.

The web half serves user accounts, tweets, and a follow graph over
SQLite. The provider half resolves a named backend from a registry
and dispatches a single run(model) call to it.

Quick start:
  1. Initialize the database: chirp init
  2. Run the server: chirp serve
  3. Dispatch to a provider: chirp run --provider openrouter --model gemini-2.5
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, env = "CHIRP_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the microblog HTTP server
    Serve(ServeArgs),

    /// Create or migrate the database without serving
    Init,

    /// Dispatch a single call to a named provider
    Run(RunArgs),

    /// List registered providers
    Providers,

    /// Build the Docker image (thin wrapper over `docker build`)
    Build(BuildArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (e.g. 127.0.0.1:8000)
    #[arg(long, short = 'b', env = "CHIRP_BIND")]
    pub bind: Option<String>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Provider name to resolve from the registry
    #[arg(long, short = 'p')]
    pub provider: Option<String>,

    /// Model name passed to the provider
    #[arg(long, short = 'm')]
    pub model: Option<String>,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Image tag
    #[arg(long, short = 't', default_value = "chirp")]
    pub tag: String,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
