//! Long-running server mode.

use anyhow::Context;
use log::{error, info, warn};
use tokio::signal;

use crate::api::RuntipiClient;
use crate::config::ServerConfig;
use crate::notify::{scheme_of, HttpWebhookSender, Notifier, Service};
use crate::poll::Poller;
use crate::store::SqliteStore;

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    info!("Starting Tipimate server {}", env!("CARGO_PKG_VERSION"));

    if Service::from_url(&config.notification_url).is_none() {
        warn!(
            "Notification service {} is not supported, updates will only be logged",
            scheme_of(&config.notification_url)
        );
    }

    info!("Opening database at {}", config.database_path.display());
    let store = SqliteStore::open(&config.database_path).context("Failed to initialize database")?;

    let client = RuntipiClient::new(config.api_url(), &config.jwt_secret, config.insecure)
        .context("Failed to create Runtipi client")?;

    let notifier = Notifier::new(
        config.notification_url.clone(),
        config.runtipi_url.clone(),
        HttpWebhookSender::default(),
    )
    .insecure(config.insecure)
    .server_name(config.server_name.clone());

    info!(
        "Checking {} every {} minutes",
        config.api_url(),
        config.interval
    );
    let poller = Poller::new(client, store, notifier, config.poll_interval());

    tokio::select! {
        _ = poller.run() => {}
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        },
    }

    Ok(())
}
