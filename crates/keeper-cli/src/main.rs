mod cmd;
mod signal;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "secret-keeper",
    about = "Secret Keeper backend: anonymous message boxes, stalest first",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML tuning file (defaults apply when omitted)
    #[arg(long, global = true, env = "KEEPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a secret-keeper queue instance
    Queue(cmd::queue::QueueArgs),

    /// Run a secret-keeper server instance against a remote queue
    Server(cmd::server::ServerArgs),

    /// Run the server with an in-process queue
    Standalone(cmd::standalone::StandaloneArgs),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Queue(args) => cmd::queue::run(args, config),
        Commands::Server(args) => cmd::server::run(args, config),
        Commands::Standalone(args) => cmd::standalone::run(args, config),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
