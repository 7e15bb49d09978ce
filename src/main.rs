use clap::Parser;
use tracing_subscriber::EnvFilter;

use mongo_agg::app::{cli::Cli, commands};
use mongo_agg::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // loads .env first so RUST_LOG set there applies
    let settings = Settings::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli, settings).await
}
