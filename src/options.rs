use std::path::Path;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;

use crate::{LivyHttpError, MutualAuthentication, Result, RetryPolicyConfig};

/// Cookie a Hadoop-secured Livy server issues once SPNEGO/LDAP succeeds.
pub const DEFAULT_SESSION_COOKIE: &str = "hadoop.auth";

/// Process-wide transport settings, read when a client is constructed.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Skip TLS certificate verification. This exposes the connection to
    /// interception and is logged when a client is built.
    pub ignore_ssl_errors: bool,
    /// Name of the cookie captured as the endpoint's session cookie.
    pub session_cookie_name: String,
    pub retry_policy: RetryPolicyConfig,
    /// Whether Kerberos responses must prove the server's identity.
    pub kerberos_mutual_authentication: MutualAuthentication,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            ignore_ssl_errors: false,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_owned(),
            retry_policy: RetryPolicyConfig::default(),
            kerberos_mutual_authentication: MutualAuthentication::Required,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| LivyHttpError::Config(format!("invalid client config: {err}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            LivyHttpError::Config(format!("could not read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    /// Builds the config from the environment.
    ///
    /// Reads:
    /// - `LIVY_HTTP_CONFIG`: optional path to a JSON config file used as the base
    /// - `LIVY_HTTP_IGNORE_SSL_ERRORS`: `true`/`false`/`1`/`0`
    /// - `LIVY_HTTP_TIMEOUT_MS`: per-request timeout
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("LIVY_HTTP_CONFIG") {
            Some(path) if !path.trim().is_empty() => Self::from_path(path.trim())?,
            _ => Self::default(),
        };

        if let Some(value) = lookup("LIVY_HTTP_IGNORE_SSL_ERRORS") {
            config.ignore_ssl_errors = parse_bool(&value).ok_or_else(|| {
                LivyHttpError::Config(format!(
                    "LIVY_HTTP_IGNORE_SSL_ERRORS must be a boolean, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = lookup("LIVY_HTTP_TIMEOUT_MS") {
            config.timeout_ms = value.trim().parse().map_err(|_| {
                LivyHttpError::Config(format!(
                    "LIVY_HTTP_TIMEOUT_MS must be a number of milliseconds, got '{value}'"
                ))
            })?;
        }
        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Headers a Livy server expects on every call. `X-Requested-By` satisfies
/// Livy's CSRF protection for POST and DELETE.
pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static("x-requested-by"),
        HeaderValue::from_static("livy-http"),
    );
    headers
}
