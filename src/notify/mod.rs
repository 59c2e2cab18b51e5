//! Update notifications.
//!
//! The [`Notifier`] picks a service from the scheme of the configured
//! notification URL, renders the message for that service and hands the
//! resulting URL and body to a [`WebhookSender`]. Delivery is attempted once.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use thiserror::Error;

use crate::appstore::split_urn;
use crate::types::{Catalog, UpdateCandidate};

pub mod payload;
pub mod webhook;

use payload::{
    DiscordEmbed, DiscordEmbedFooter, DiscordMessage, WebhookParams, DISCORD_COLOR,
    DISCORD_FOOTER, DISCORD_USERNAME,
};
pub use webhook::{HttpWebhookSender, WebhookSender};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid notification url: {0}")]
    InvalidTarget(String),

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Discord,
    Ntfy,
    Gotify,
}

impl Service {
    /// Reads the service from the part of `url` before `://`.
    pub fn from_url(url: &str) -> Option<Self> {
        match scheme_of(url) {
            "discord" => Some(Service::Discord),
            "ntfy" => Some(Service::Ntfy),
            "gotify" => Some(Service::Gotify),
            _ => None,
        }
    }
}

pub(crate) fn scheme_of(url: &str) -> &str {
    url.split_once("://").map(|(scheme, _)| scheme).unwrap_or_default()
}

/// A rendered notification, ready to be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub service: Service,
    pub url: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent(Service),
    /// The notification URL names a service this agent cannot talk to.
    Skipped,
}

pub struct Notifier<W> {
    notification_url: String,
    runtipi_url: String,
    insecure: bool,
    server_name: Option<String>,
    sender: W,
}

impl<W: WebhookSender> Notifier<W> {
    pub fn new(
        notification_url: impl Into<String>,
        runtipi_url: impl Into<String>,
        sender: W,
    ) -> Self {
        Self {
            notification_url: notification_url.into(),
            runtipi_url: runtipi_url.into(),
            insecure: false,
            server_name: None,
            sender,
        }
    }

    /// Use plain HTTP for services that encode the transport in the URL.
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Prefix every title with the name of the server.
    pub fn server_name(mut self, name: Option<String>) -> Self {
        self.server_name = name.filter(|n| !n.is_empty());
        self
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> &W {
        &self.sender
    }

    pub async fn send(
        &self,
        candidate: &UpdateCandidate,
        catalog: &Catalog,
    ) -> Result<Delivery, DispatchError> {
        let Some(notification) = self.build(candidate, catalog, Utc::now())? else {
            warn!(
                "Unsupported notification service: {}",
                scheme_of(&self.notification_url)
            );
            return Ok(Delivery::Skipped);
        };

        debug!("Sending {:?} notification for {}", notification.service, candidate.urn);
        self.sender.send(&notification.url, &notification.body).await?;
        Ok(Delivery::Sent(notification.service))
    }

    /// Renders the notification for `candidate`, or `None` when the
    /// configured service is not supported.
    pub fn build(
        &self,
        candidate: &UpdateCandidate,
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, DispatchError> {
        let Some(service) = Service::from_url(&self.notification_url) else {
            return Ok(None);
        };

        let title = self.title(candidate, catalog);
        let link = self.app_link(candidate, catalog);

        let (params, body) = match service {
            Service::Discord => {
                let message = DiscordMessage {
                    embeds: vec![DiscordEmbed {
                        title,
                        description: format!(
                            "Your app {} from the {} appstore has an available update!\nUpdate to version `{}` ({}).",
                            candidate.name,
                            catalog.name,
                            candidate.docker_version,
                            candidate.version
                        ),
                        url: link,
                        color: DISCORD_COLOR,
                        footer: DiscordEmbedFooter {
                            text: DISCORD_FOOTER.to_string(),
                        },
                        timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
                    }],
                    username: DISCORD_USERNAME.to_string(),
                };
                (
                    WebhookParams::Discord { json: true },
                    serde_json::to_string(&message)?,
                )
            }
            Service::Ntfy => (
                WebhookParams::Ntfy {
                    click: link,
                    title,
                    scheme: if self.insecure { "http" } else { "https" },
                },
                self.summary(candidate, catalog),
            ),
            Service::Gotify => {
                let body = format!(
                    "{}\nVisit {} for more information.",
                    self.summary(candidate, catalog),
                    link
                );
                (
                    WebhookParams::Gotify {
                        disable_tls: self.insecure,
                        title,
                    },
                    body,
                )
            }
        };

        let separator = if self.notification_url.contains('?') { '&' } else { '?' };
        Ok(Some(Notification {
            service,
            url: format!("{}{}{}", self.notification_url, separator, params.encode()),
            body,
        }))
    }

    fn title(&self, candidate: &UpdateCandidate, catalog: &Catalog) -> String {
        match &self.server_name {
            Some(server) => format!("{} - {} ({})", server, candidate.name, catalog.name),
            None => format!("{} ({})", candidate.name, catalog.name),
        }
    }

    fn app_link(&self, candidate: &UpdateCandidate, catalog: &Catalog) -> String {
        let (id, _) = split_urn(&candidate.urn);
        format!(
            "{}/apps/{}/{}",
            self.runtipi_url.trim_end_matches('/'),
            catalog.slug,
            id
        )
    }

    fn summary(&self, candidate: &UpdateCandidate, catalog: &Catalog) -> String {
        format!(
            "Your app {} from the {} appstore has an available update!\nUpdate to version {} ({}).",
            candidate.name, catalog.name, candidate.docker_version, candidate.version
        )
    }
}
