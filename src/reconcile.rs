//! Update detection against persisted state.
//!
//! The store is a change detector, not a record of pending updates: whether
//! an update exists comes fresh from the server on every pass, and the store
//! only decides whether that update was already reported.

use std::collections::HashSet;

use log::{debug, info};

use crate::store::{StateStore, StoreError};
use crate::types::{AppRecord, RemoteApp, UpdateCandidate};

/// Runs one reconciliation pass and returns the apps to notify about, in
/// fetch order.
///
/// Records of apps that are no longer installed are deleted first, so an
/// app reinstalled under the same urn starts from scratch.
pub fn reconcile<S>(
    fetched: &[RemoteApp],
    store: &mut S,
) -> Result<Vec<UpdateCandidate>, StoreError>
where
    S: StateStore + ?Sized,
{
    let installed: HashSet<&str> = fetched.iter().map(|app| app.urn.as_str()).collect();
    for record in store.all()? {
        if !installed.contains(record.urn.as_str()) {
            info!("Deleting {} from the database, app is no longer installed", record.urn);
            store.delete(&record.urn)?;
        }
    }

    let mut candidates = Vec::new();
    for app in fetched {
        if !app.has_update() {
            debug!("No update for {}", app.urn);
            continue;
        }

        let observed = AppRecord::from(app);
        match store.find(&app.urn)? {
            None => {
                store.create(&observed)?;
                candidates.push(UpdateCandidate::from(app));
            }
            Some(known) if known != observed => {
                store.update(&observed)?;
                candidates.push(UpdateCandidate::from(app));
            }
            Some(_) => debug!("Update for {} already reported", app.urn),
        }
    }

    Ok(candidates)
}
