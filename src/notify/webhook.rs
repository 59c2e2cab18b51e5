//! Webhook delivery.
//!
//! Notification URLs use a service scheme (`discord://`, `ntfy://`,
//! `gotify://`) with routing options in the query string. [`WebhookRequest`]
//! turns such a URL into the HTTP request the service actually expects and
//! [`HttpWebhookSender`] performs it.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::json;
use url::Url;

use super::{DispatchError, Service};

const DISCORD_API: &str = "https://discord.com/api/webhooks";

#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Delivers `body` to the service addressed by `url`.
    async fn send(&self, url: &str, body: &str) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
}

/// A plain HTTP POST derived from a service URL.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub endpoint: Url,
    pub basic_auth: Option<(String, String)>,
    pub body: RequestBody,
}

impl WebhookRequest {
    pub fn from_target(target: &str, body: &str) -> Result<Self, DispatchError> {
        let service = Service::from_url(target).ok_or_else(|| {
            DispatchError::InvalidTarget(format!("unsupported service in {target}"))
        })?;
        let url = Url::parse(target).map_err(|e| DispatchError::InvalidTarget(e.to_string()))?;

        match service {
            Service::Discord => discord(&url, body),
            Service::Ntfy => ntfy(&url, body),
            Service::Gotify => gotify(&url, body),
        }
    }
}

fn query_value<'a>(url: &'a Url, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn is_truthy(value: Option<std::borrow::Cow<'_, str>>) -> bool {
    matches!(value.as_deref(), Some("true" | "yes" | "1"))
}

fn host_and_port(url: &Url) -> Result<String, DispatchError> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DispatchError::InvalidTarget("missing host".into()))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn parse_endpoint(raw: &str) -> Result<Url, DispatchError> {
    Url::parse(raw).map_err(|e| DispatchError::InvalidTarget(e.to_string()))
}

// discord://{token}@{webhook_id}
fn discord(url: &Url, body: &str) -> Result<WebhookRequest, DispatchError> {
    let token = url.username();
    let webhook_id = url.host_str().unwrap_or_default();
    if token.is_empty() || webhook_id.is_empty() {
        return Err(DispatchError::InvalidTarget(
            "discord url must look like discord://token@webhook_id".into(),
        ));
    }

    let body = if is_truthy(query_value(url, "json")) {
        serde_json::from_str(body)?
    } else {
        json!({ "content": body })
    };

    Ok(WebhookRequest {
        endpoint: parse_endpoint(&format!("{DISCORD_API}/{webhook_id}/{token}"))?,
        basic_auth: None,
        body: RequestBody::Json(body),
    })
}

// ntfy://[user:pass@]{host}[:port]/{topic}
fn ntfy(url: &Url, body: &str) -> Result<WebhookRequest, DispatchError> {
    let topic = url.path().trim_matches('/');
    if topic.is_empty() {
        return Err(DispatchError::InvalidTarget("ntfy url is missing a topic".into()));
    }

    let scheme = match query_value(url, "scheme").as_deref() {
        Some("http") => "http",
        _ => "https",
    };
    let mut endpoint = parse_endpoint(&format!("{scheme}://{}/{topic}", host_and_port(url)?))?;

    // ntfy reads message options from the query string as well as headers.
    let options: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "scheme")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !options.is_empty() {
        endpoint.query_pairs_mut().extend_pairs(options);
    }

    let basic_auth = (!url.username().is_empty()).then(|| {
        (
            url.username().to_string(),
            url.password().unwrap_or_default().to_string(),
        )
    });

    Ok(WebhookRequest {
        endpoint,
        basic_auth,
        body: RequestBody::Text(body.to_string()),
    })
}

// gotify://{host}[:port][/path]/{token}
fn gotify(url: &Url, body: &str) -> Result<WebhookRequest, DispatchError> {
    let mut segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let token = segments
        .pop()
        .ok_or_else(|| DispatchError::InvalidTarget("gotify url is missing a token".into()))?;

    let scheme = if is_truthy(query_value(url, "disableTls")) {
        "http"
    } else {
        "https"
    };
    let prefix: String = segments.iter().map(|s| format!("/{s}")).collect();
    let mut endpoint = parse_endpoint(&format!(
        "{scheme}://{}{prefix}/message",
        host_and_port(url)?
    ))?;
    endpoint.query_pairs_mut().append_pair("token", token);

    let title = query_value(url, "title").unwrap_or_default();
    let priority: i64 = query_value(url, "priority")
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);

    Ok(WebhookRequest {
        endpoint,
        basic_auth: None,
        body: RequestBody::Json(json!({
            "title": title,
            "message": body,
            "priority": priority
        })),
    })
}

/// Sends webhooks over HTTP with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpWebhookSender {
    client: Client,
}

impl HttpWebhookSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, url: &str, body: &str) -> Result<(), DispatchError> {
        let request = WebhookRequest::from_target(url, body)?;
        debug!("POST {}", request.endpoint.origin().ascii_serialization());

        let mut builder = self.client.post(request.endpoint);
        if let Some((user, password)) = request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        builder = match request.body {
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Text(text) => builder
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(text),
        };

        builder.send().await?.error_for_status()?;
        Ok(())
    }
}
