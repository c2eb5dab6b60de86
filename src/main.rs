//! Replicheck CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use replicheck::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check(args) => replicheck::cli::commands::check::execute(args, cli.config).await,
    };

    if let Err(err) = result {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
        std::process::exit(1);
    }
}
