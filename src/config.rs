use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ENV_PREFIX: &str = "TIPIMATE_";
const JSON_FILE: &str = "tipimate.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("failed to read secret file {path}: {source}")]
    SecretFile {
        path: String,
        source: std::io::Error,
    },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Load(Box::new(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub notification_url: String,
    /// Public address of the Runtipi dashboard, used for links.
    pub runtipi_url: String,
    /// Address used for API calls when the agent runs next to Runtipi.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtipi_internal_url: Option<String>,
    pub jwt_secret: String,
    pub database_path: PathBuf,
    /// Minutes between the end of a pass and the start of the next.
    pub interval: u64,
    pub log_level: LogLevel,
    pub insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            notification_url: String::new(),
            runtipi_url: String::new(),
            runtipi_internal_url: None,
            jwt_secret: String::new(),
            database_path: "tipimate.db".into(),
            interval: 30,
            log_level: LogLevel::Info,
            insecure: false,
            server_name: None,
        }
    }
}

impl ServerConfig {
    /// Layers defaults, `file`, `tipimate.json`, `TIPIMATE_*` variables and
    /// finally `overrides` (the command line), then validates the result.
    pub fn load<T: Serialize>(file: &Path, overrides: &T) -> Result<Self, ConfigError> {
        let mut config: ServerConfig = layered(Serialized::defaults(ServerConfig::default()), file)
            .merge(Serialized::defaults(overrides))
            .extract()?;

        if let Some(secret) = secret_from_file()? {
            config.jwt_secret = secret;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require("notification_url", &self.notification_url)?;
        require("runtipi_url", &self.runtipi_url)?;
        require("jwt_secret", &self.jwt_secret)?;

        if !self.notification_url.contains("://") {
            return Err(ConfigError::Invalid {
                field: "notification_url",
                reason: "expected a service url such as discord://token@webhook_id".into(),
            });
        }
        Url::parse(&self.notification_url).map_err(|e| ConfigError::Invalid {
            field: "notification_url",
            reason: e.to_string(),
        })?;

        http_url("runtipi_url", &self.runtipi_url)?;
        if let Some(internal) = self.runtipi_internal_url.as_deref() {
            http_url("runtipi_internal_url", internal)?;
        }

        if self.interval == 0 {
            return Err(ConfigError::Invalid {
                field: "interval",
                reason: "must be at least one minute".into(),
            });
        }
        if self.interval.checked_mul(60).is_none() {
            return Err(ConfigError::Invalid {
                field: "interval",
                reason: format!("{} minutes is too long", self.interval),
            });
        }
        Ok(())
    }

    /// Delay between passes. Saturates for intervals `validate` rejects.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval.saturating_mul(60))
    }

    /// Base URL for API requests.
    pub fn api_url(&self) -> &str {
        self.runtipi_internal_url
            .as_deref()
            .unwrap_or(&self.runtipi_url)
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct CheckConfig {
    pub runtipi_url: String,
    pub jwt_secret: String,
    pub insecure: bool,
    pub log_level: LogLevel,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            runtipi_url: String::new(),
            jwt_secret: String::new(),
            insecure: false,
            log_level: LogLevel::Warn,
        }
    }
}

impl CheckConfig {
    pub fn load<T: Serialize>(file: &Path, overrides: &T) -> Result<Self, ConfigError> {
        let mut config: CheckConfig = layered(Serialized::defaults(CheckConfig::default()), file)
            .merge(Serialized::defaults(overrides))
            .extract()?;

        if let Some(secret) = secret_from_file()? {
            config.jwt_secret = secret;
        }

        require("runtipi_url", &config.runtipi_url)?;
        require("jwt_secret", &config.jwt_secret)?;
        http_url("runtipi_url", &config.runtipi_url)?;
        Ok(config)
    }
}

fn layered<T: Serialize>(defaults: Serialized<T>, file: &Path) -> Figment {
    Figment::from(defaults)
        .merge(Toml::file(file))
        .merge(Json::file(JSON_FILE))
        .merge(Env::prefixed(ENV_PREFIX))
}

// Docker-style secrets
fn secret_from_file() -> Result<Option<String>, ConfigError> {
    let Ok(path) = std::env::var("JWT_SECRET_FILE") else {
        return Ok(None);
    };
    let secret = std::fs::read_to_string(&path)
        .map_err(|source| ConfigError::SecretFile { path, source })?;
    Ok(Some(secret.trim().to_string()))
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    Ok(())
}

fn http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use serde_json::json;

    use super::*;

    fn no_overrides() -> serde_json::Value {
        json!({})
    }

    #[test]
    fn server_config_layers_file_env_and_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tipimate.toml",
                r#"
                notification_url = "discord://token@webhook"
                runtipi_url = "https://tipi.local"
                jwt_secret = "from-file"
                interval = 5
                "#,
            )?;
            jail.set_env("TIPIMATE_SERVER_NAME", "homelab");
            jail.set_env("TIPIMATE_INTERVAL", "10");

            let config = ServerConfig::load(
                Path::new("tipimate.toml"),
                &json!({ "jwt_secret": "from-cli" }),
            )
            .map_err(|e| e.to_string())?;

            assert_eq!(config.notification_url, "discord://token@webhook");
            assert_eq!(config.jwt_secret, "from-cli");
            assert_eq!(config.interval, 10);
            assert_eq!(config.server_name.as_deref(), Some("homelab"));
            assert_eq!(config.database_path, PathBuf::from("tipimate.db"));
            assert_eq!(config.log_level, LogLevel::Info);
            assert_eq!(config.api_url(), "https://tipi.local");
            Ok(())
        });
    }

    #[test]
    fn missing_required_setting_is_reported() {
        Jail::expect_with(|jail| {
            jail.set_env("TIPIMATE_RUNTIPI_URL", "https://tipi.local");
            jail.set_env("TIPIMATE_JWT_SECRET", "secret");

            let Err(err) = ServerConfig::load(Path::new("tipimate.toml"), &no_overrides()) else {
                panic!("config without notification_url was accepted");
            };
            assert!(matches!(err, ConfigError::Missing("notification_url")));
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("TIPIMATE_LOG_LEVEL", "loud");
            let Err(err) = ServerConfig::load(Path::new("tipimate.toml"), &no_overrides()) else {
                panic!("unknown log level was accepted");
            };
            assert!(matches!(err, ConfigError::Load(_)));
            Ok(())
        });
    }

    #[test]
    fn secret_file_wins() {
        Jail::expect_with(|jail| {
            jail.create_file("secret", "  from-secret-file\n")?;
            jail.set_env("JWT_SECRET_FILE", "secret");

            let config = CheckConfig::load(
                Path::new("tipimate.toml"),
                &json!({ "runtipi_url": "http://tipi.local", "jwt_secret": "from-cli" }),
            )
            .map_err(|e| e.to_string())?;
            assert_eq!(config.jwt_secret, "from-secret-file");
            assert_eq!(config.log_level, LogLevel::Warn);
            Ok(())
        });
    }

    fn valid() -> ServerConfig {
        ServerConfig {
            notification_url: "ntfy://ntfy.sh/tipi".into(),
            runtipi_url: "https://tipi.local".into(),
            jwt_secret: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(valid().validate().is_ok());

        let bare = ServerConfig {
            notification_url: "not a url".into(),
            ..valid()
        };
        assert!(matches!(
            bare.validate(),
            Err(ConfigError::Invalid { field: "notification_url", .. })
        ));

        let ftp = ServerConfig {
            runtipi_url: "ftp://tipi.local".into(),
            ..valid()
        };
        assert!(matches!(
            ftp.validate(),
            Err(ConfigError::Invalid { field: "runtipi_url", .. })
        ));

        let zero = ServerConfig {
            interval: 0,
            ..valid()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::Invalid { field: "interval", .. })
        ));
    }

    #[test]
    fn interval_that_overflows_seconds_is_rejected() {
        let huge = ServerConfig {
            interval: u64::MAX / 60 + 1,
            ..valid()
        };
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::Invalid { field: "interval", .. })
        ));
        assert_eq!(huge.poll_interval(), Duration::from_secs(u64::MAX));

        let largest = ServerConfig {
            interval: u64::MAX / 60,
            ..valid()
        };
        assert!(largest.validate().is_ok());
        assert_eq!(valid().poll_interval(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn internal_url_is_used_for_api_calls() {
        let config = ServerConfig {
            runtipi_internal_url: Some("http://runtipi:3000".into()),
            ..valid()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.api_url(), "http://runtipi:3000");
    }
}
