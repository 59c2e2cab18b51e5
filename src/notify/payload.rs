//! Notification bodies and per-service query parameters.

use serde::Serialize;

pub const DISCORD_COLOR: u32 = 3_126_084;
pub const DISCORD_FOOTER: &str = "Updated at";
pub const DISCORD_USERNAME: &str = "Tipimate";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub footer: DiscordEmbedFooter,
    /// RFC3339.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordEmbedFooter {
    pub text: String,
}

/// Query parameters understood by the webhook router, one variant per
/// service. Keys are emitted in sorted order.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookParams {
    Discord { json: bool },
    Ntfy { click: String, title: String, scheme: &'static str },
    Gotify { disable_tls: bool, title: String },
}

impl WebhookParams {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            WebhookParams::Discord { json } => vec![("json", json.to_string())],
            WebhookParams::Ntfy {
                click,
                title,
                scheme,
            } => vec![
                ("click", click.clone()),
                ("scheme", scheme.to_string()),
                ("title", title.clone()),
            ],
            WebhookParams::Gotify { disable_tls, title } => vec![
                ("disableTls", disable_tls.to_string()),
                ("title", title.clone()),
            ],
        }
    }

    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish()
    }
}
