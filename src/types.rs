//! Data structures shared across the agent.
//!
//! The `Installed*` and `*Response` types mirror the JSON returned by the
//! Runtipi API and are only used for decoding.  Everything past the API
//! client works on the flattened [`RemoteApp`], the persisted
//! [`AppRecord`] and the [`UpdateCandidate`] handed to the notifier.

use serde::{Deserialize, Serialize};

/// One installed application as observed during a single pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApp {
    /// Catalog-qualified identifier, `{appId}:{catalogSlug}`.
    pub urn: String,
    pub name: String,
    pub installed_version: i64,
    pub latest_version: i64,
    pub latest_docker_version: String,
}

impl RemoteApp {
    /// Whether the server reports a real pending update.
    ///
    /// A `latest_version` of `0` or a docker version of `0.0.0` means the
    /// catalog has not computed update metadata yet.
    pub fn has_update(&self) -> bool {
        self.installed_version != self.latest_version
            && self.latest_version != 0
            && self.latest_docker_version != UNSET_DOCKER_VERSION
    }
}

pub const UNSET_DOCKER_VERSION: &str = "0.0.0";

/// Last observed version state of an app, one row per urn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    pub urn: String,
    pub version: i64,
    pub latest_version: i64,
}

impl From<&RemoteApp> for AppRecord {
    fn from(app: &RemoteApp) -> Self {
        Self {
            urn: app.urn.clone(),
            version: app.installed_version,
            latest_version: app.latest_version,
        }
    }
}

/// An app with a version change worth notifying about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCandidate {
    pub urn: String,
    pub name: String,
    /// Currently installed version.
    pub version: i64,
    /// Human readable form of the newest version.
    pub docker_version: String,
}

impl From<&RemoteApp> for UpdateCandidate {
    fn from(app: &RemoteApp) -> Self {
        Self {
            urn: app.urn.clone(),
            name: app.name.clone(),
            version: app.installed_version,
            docker_version: app.latest_docker_version.clone(),
        }
    }
}

/// An app store (catalog) known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstalledAppsResponse {
    #[serde(default)]
    pub installed: Vec<InstalledApp>,
}

#[derive(Debug, Deserialize)]
pub struct InstalledApp {
    pub app: InstalledAppStatus,
    pub info: InstalledAppInfo,
    #[serde(default)]
    pub metadata: InstalledAppMetadata,
}

#[derive(Debug, Deserialize)]
pub struct InstalledAppStatus {
    pub version: i64,
}

#[derive(Debug, Deserialize)]
pub struct InstalledAppInfo {
    pub name: String,
    pub urn: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstalledAppMetadata {
    pub latest_version: i64,
    pub latest_docker_version: String,
}

impl From<InstalledApp> for RemoteApp {
    fn from(app: InstalledApp) -> Self {
        Self {
            urn: app.info.urn,
            name: app.info.name,
            installed_version: app.app.version,
            latest_version: app.metadata.latest_version,
            latest_docker_version: app.metadata.latest_docker_version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogsResponse {
    #[serde(rename = "appStores", default)]
    pub app_stores: Vec<Catalog>,
}
