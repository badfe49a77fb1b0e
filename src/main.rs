mod cli;
mod format;

use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rsearch_client=info".parse()?),
        )
        .init();

    let cli = cli::Cli::parse();
    info!(url = %cli.service.url, "rsearch-client starting");

    cli::run(cli)
        .await
        .inspect_err(|e| tracing::error!("{e}"))
}
