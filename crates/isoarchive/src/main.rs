use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use isoarchive::{Config, Server, ServerResult};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "isoarchive server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ServerResult<()> {
    let config = Config::from_env()?;
    tracing::info!(
        archive = %config.archive_path.display(),
        download_url = %config.download_url,
        variant_depth = config.variant_depth,
        "starting isoarchive server"
    );

    let mut server = Server::start(&config).await?;
    tracing::info!(addr = %server.addr(), "listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.shutdown()
}
