use std::path::Path;
use std::sync::Arc;

use leasehold_core::{storage, Broker, BrokerConfig};
use tracing::info;

/// Overrides `storage.url` from the config file.
const DATABASE_URL_ENV: &str = "LEASEHOLD_DATABASE_URL";

/// Returns the configuration and the file it came from. Runs before tracing
/// is installed, so failures go to stderr.
fn load_config() -> (BrokerConfig, Option<&'static str>) {
    let paths = ["leasehold.toml", "/etc/leasehold/leasehold.toml"];

    for path in paths {
        if Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return (config, Some(path)),
                    Err(e) => {
                        eprintln!("error parsing {path}: {e}");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("error reading {path}: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    (BrokerConfig::default(), None)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, source) = load_config();
    if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
        config.storage.url = url;
    }
    if let Err(e) = config.validate() {
        eprintln!("error in configuration: {e}");
        std::process::exit(1);
    }

    leasehold_core::telemetry::init_tracing(&config.telemetry);
    match source {
        Some(path) => info!(path, "loaded configuration"),
        None => info!("no config file found, using defaults"),
    }

    let storage = storage::open(&config.storage).await?;
    let broker = Arc::new(Broker::new(config.lease.clone(), storage));

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "starting HTTP server");

    leasehold_server::serve(listener, broker, shutdown_signal()).await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to install CTRL+C handler");
    }

    info!("received shutdown signal");
}
