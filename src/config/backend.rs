use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use super::file::BackendSection;
use super::helpers::{optional_env, parse_env};
use crate::error::ConfigError;

const DEFAULT_ENDPOINT: &str = "http://localhost:8000/chat";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the assistant stream is opened.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: Url,
    pub api_key: Option<SecretString>,
    /// Bounds connection setup only; a streaming body may stay open longer.
    pub connect_timeout: Duration,
}

impl BackendConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            api_key: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub(crate) fn resolve(file: &BackendSection) -> Result<Self, ConfigError> {
        let raw_endpoint = optional_env("COPILOT_BACKEND_URL")?
            .or_else(|| file.url.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = parse_endpoint("COPILOT_BACKEND_URL", &raw_endpoint)?;

        let timeout_secs = parse_env(
            "COPILOT_BACKEND_TIMEOUT_SECS",
            file.timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT.as_secs()),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "COPILOT_BACKEND_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            endpoint,
            api_key: optional_env("COPILOT_BACKEND_API_KEY")?.map(SecretString::from),
            connect_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_endpoint(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}' is not a valid URL: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http or https URL, got scheme '{other}'"),
        }),
    }
}
