//! Runtipi API client.

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use log::debug;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::types::{Catalog, CatalogsResponse, InstalledAppsResponse, RemoteApp};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to sign api token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where a pass gets its view of the server from.
#[async_trait]
pub trait AppSource {
    async fn installed_apps(&self) -> Result<Vec<RemoteApp>, ApiError>;

    async fn catalogs(&self) -> Result<Vec<Catalog>, ApiError>;
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
}

/// Signs the HS256 token the Runtipi API expects from CLI clients.
pub fn create_token(secret: &str) -> Result<String, ApiError> {
    let token = jsonwebtoken::encode(
        &Header::default(),
        &Claims { sub: "cli" },
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub struct RuntipiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl RuntipiClient {
    /// `insecure` disables certificate verification, for servers behind a
    /// self-signed certificate.
    pub fn new(base_url: &str, secret: &str, insecure: bool) -> Result<Self, ApiError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: create_token(secret)?,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AppSource for RuntipiClient {
    async fn installed_apps(&self) -> Result<Vec<RemoteApp>, ApiError> {
        let response: InstalledAppsResponse = self.get("/api/apps/installed").await?;
        Ok(response.installed.into_iter().map(RemoteApp::from).collect())
    }

    async fn catalogs(&self) -> Result<Vec<Catalog>, ApiError> {
        let response: CatalogsResponse = self.get("/api/marketplace/enabled").await?;
        Ok(response.app_stores)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{DecodingKey, Validation};
    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn token_is_signed_with_secret() {
        #[derive(Deserialize)]
        struct Decoded {
            sub: String,
        }

        let token = create_token("s3cret").unwrap();
        let mut validation = Validation::default();
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let decoded = jsonwebtoken::decode::<Decoded>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "cli");
    }

    #[tokio::test]
    async fn fetches_installed_apps_with_bearer_token() {
        let server = MockServer::start().await;
        let token = create_token("s3cret").unwrap();
        Mock::given(method("GET"))
            .and(path("/api/apps/installed"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "installed": [{
                    "app": { "version": 3 },
                    "info": { "name": "Jellyfin", "urn": "jellyfin:official" },
                    "metadata": { "latestVersion": 4, "latestDockerVersion": "10.8.0" }
                }]
            })))
            .mount(&server)
            .await;

        let client = RuntipiClient::new(&format!("{}/", server.uri()), "s3cret", false).unwrap();
        let apps = client.installed_apps().await.unwrap();

        assert_eq!(
            apps,
            vec![RemoteApp {
                urn: "jellyfin:official".into(),
                name: "Jellyfin".into(),
                installed_version: 3,
                latest_version: 4,
                latest_docker_version: "10.8.0".into(),
            }]
        );
    }

    #[tokio::test]
    async fn fetches_enabled_catalogs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/marketplace/enabled"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "appStores": [
                    { "slug": "official", "name": "Official", "url": "https://x", "enabled": true }
                ]
            })))
            .mount(&server)
            .await;

        let client = RuntipiClient::new(&server.uri(), "s3cret", false).unwrap();
        let catalogs = client.catalogs().await.unwrap();

        assert_eq!(catalogs.len(), 1);
        assert_eq!(catalogs[0].slug, "official");
        assert_eq!(catalogs[0].name, "Official");
    }

    #[tokio::test]
    async fn unauthorized_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = RuntipiClient::new(&server.uri(), "wrong", false).unwrap();
        assert!(matches!(
            client.installed_apps().await,
            Err(ApiError::Http(_))
        ));
    }
}
