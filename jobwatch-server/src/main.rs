#![forbid(unsafe_code)]

use color_eyre::eyre::{Result, WrapErr};
use libjobwatch::config::{load_config, AggregatorConfig};
use libjobwatch::log::*;
use tracing_subscriber::util::SubscriberInitExt;

use crate::state::ServerState;

mod http_server;
mod state;

const PORT: u16 = 2345;

fn install_logger() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .finish()
        .try_init()?;
    Ok(())
}

fn port() -> Result<u16> {
    match std::env::var("JOBWATCH_SERVER_PORT") {
        Ok(port) => port
            .parse()
            .wrap_err_with(|| format!("JOBWATCH_SERVER_PORT is not a port: {}", port)),
        Err(_) => Ok(PORT),
    }
}

async fn config() -> Result<AggregatorConfig> {
    match std::env::var("JOBWATCH_CONFIG") {
        Ok(path) => load_config(path).await,
        Err(_) => Ok(AggregatorConfig::default()),
    }
}

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<()> {
    install_color_eyre()?;
    install_logger()?;

    let config = config().await?;
    let port = port()?;
    info!("starting with {:?}", config);
    println!("* jobwatch-server listening on port {port}");

    http_server::run_server(port, ServerState::new(config).shared()).await
}
