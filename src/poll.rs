//! The server loop: reconcile, notify, sleep, repeat.

use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;
use tokio::time::sleep;

use crate::api::{ApiError, AppSource};
use crate::appstore;
use crate::notify::{Delivery, Notifier, WebhookSender};
use crate::reconcile::reconcile;
use crate::store::{SqliteStore, StoreError};
use crate::types::UpdateCandidate;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to fetch from runtipi: {0}")]
    Fetch(#[from] ApiError),

    #[error("failed to reconcile app state: {0}")]
    Store(#[from] StoreError),
}

/// What a single pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub installed: usize,
    pub candidates: Vec<UpdateCandidate>,
    pub notified: usize,
    pub failed: usize,
}

pub struct Poller<A, W> {
    source: A,
    store: SqliteStore,
    notifier: Notifier<W>,
    interval: Duration,
}

impl<A, W> Poller<A, W>
where
    A: AppSource,
    W: WebhookSender,
{
    pub fn new(source: A, store: SqliteStore, notifier: Notifier<W>, interval: Duration) -> Self {
        Self {
            source,
            store,
            notifier,
            interval,
        }
    }

    /// Runs passes forever. A failed pass is logged and the loop carries
    /// on after the usual delay.
    pub async fn run(mut self) {
        loop {
            info!("Checking for updates");
            match self.tick().await {
                Ok(report) => info!(
                    "Pass complete: {} installed, {} updates, {} notified, {} failed",
                    report.installed,
                    report.candidates.len(),
                    report.notified,
                    report.failed
                ),
                Err(e) => error!("Pass abandoned: {}", e),
            }

            sleep(self.interval).await;
        }
    }

    /// One full pass. Fetches happen before any state is touched, and the
    /// reconciliation is committed as a whole or not at all.
    pub async fn tick(&mut self) -> Result<TickReport, PollError> {
        let apps = self.source.installed_apps().await?;
        let catalogs = self.source.catalogs().await?;

        let candidates = {
            let mut tx = self.store.transaction()?;
            let candidates = reconcile(&apps, &mut tx)?;
            tx.commit()?;
            candidates
        };

        let mut report = TickReport {
            installed: apps.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            info!(
                "App {} has an update to {} (installed version {})",
                candidate.urn, candidate.docker_version, candidate.version
            );
            let catalog = appstore::resolve(&candidate.urn, &catalogs);
            match self.notifier.send(candidate, &catalog).await {
                Ok(Delivery::Sent(_)) => report.notified += 1,
                Ok(Delivery::Skipped) => {}
                Err(e) => {
                    warn!("Failed to send update alert for {}: {}", candidate.urn, e);
                    report.failed += 1;
                }
            }
        }

        report.candidates = candidates;
        Ok(report)
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &SqliteStore {
        &self.store
    }
}
