//! VoiceHero CLI - ingest server and widget session simulator

mod commands;

use clap::{Parser, Subcommand};
use commands::{ServeCommand, SimulateCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "VOICEHERO_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "VOICEHERO_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the analytics ingest API
    Serve(ServeCommand),
    /// Drive one widget session against an API
    Simulate(SimulateCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins when set; otherwise our crates at --log-level and
    // noisy dependencies at warn
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "voicehero={level},\
             voicehero_cli={level},\
             voicehero_core={level},\
             voicehero_widget={level},\
             voicehero_analytics={level},\
             voicehero_database={level},\
             voicehero_migrations={level},\
             tower_http={level},\
             sqlx=warn,\
             sea_orm=warn,\
             sea_orm_migration=warn,\
             h2=warn,\
             tower=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = cli.log_level
        ))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", cli.log_level, e))?
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(),
        Commands::Simulate(simulate_cmd) => simulate_cmd.execute(),
    }
}
