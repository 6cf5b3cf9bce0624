//! Helper configuration and environment-driven bootstrap.
//!
//! [`HelperConfig`] carries everything the helper needs to locate and poll a
//! single AppConfig profile. It can be filled in directly or derived from the
//! process environment with [`HelperConfig::from_os_env`].

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::client::{ConfigTarget, MIN_SESSION_POLL_INTERVAL};
use crate::http::HttpClientOptions;

/// Environment variable naming the AppConfig application.
const ENV_APPLICATION: &str = "APPCONFIG_APPLICATION";
/// Environment variable naming the AppConfig environment.
const ENV_ENVIRONMENT: &str = "APPCONFIG_ENVIRONMENT";
/// Environment variable naming the AppConfig configuration profile.
const ENV_PROFILE: &str = "APPCONFIG_PROFILE";
/// Environment variable holding the staleness bound in seconds.
const ENV_MAX_CONFIG_AGE: &str = "APPCONFIG_MAX_CONFIG_AGE";
/// Environment variable toggling the eager fetch at construction.
const ENV_FETCH_ON_INIT: &str = "APPCONFIG_FETCH_ON_INIT";
/// Environment variable toggling refresh-on-read.
const ENV_FETCH_ON_READ: &str = "APPCONFIG_FETCH_ON_READ";
/// Environment variable overriding the reported client identifier.
const ENV_CLIENT_ID: &str = "APPCONFIG_CLIENT_ID";
/// Environment variable holding the fetch timeout in seconds.
const ENV_FETCH_TIMEOUT: &str = "APPCONFIG_FETCH_TIMEOUT";
/// Environment variable overriding the AppConfig Data endpoint.
const ENV_ENDPOINT_URL: &str = "APPCONFIG_ENDPOINT_URL";
/// Primary AWS region variable.
const ENV_REGION: &str = "AWS_REGION";
/// Fallback AWS region variable.
const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
/// Hostname variable consulted before asking the OS.
const ENV_HOSTNAME: &str = "HOSTNAME";

/// Default staleness bound.
pub const DEFAULT_MAX_CONFIG_AGE: Duration = Duration::from_secs(60);
/// Default upper bound for a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Hard configuration errors detected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// One of the application/environment/profile identifiers is blank.
    #[error("{0} must not be empty")]
    MissingIdentifier(&'static str),
    /// A zero fetch timeout would fail every attempt immediately.
    #[error("fetch timeout must be greater than zero")]
    ZeroFetchTimeout,
    /// The client identifier is blank.
    #[error("client id must not be empty")]
    EmptyClientId,
    /// The unsigned HTTP client was requested without an explicit endpoint.
    #[error("an explicit endpoint is required for the unsigned HTTP client")]
    MissingEndpoint,
}

/// Settings for a single [`crate::AppConfigHelper`].
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// AppConfig application name or ID.
    pub application: String,
    /// AppConfig environment name or ID.
    pub environment: String,
    /// AppConfig configuration profile name or ID.
    pub profile: String,
    /// Minimum interval between refresh attempts. Zero refreshes on every read.
    pub max_config_age: Duration,
    /// Fetch once during construction and fail construction if that fetch fails.
    pub fetch_on_init: bool,
    /// Whether reads trigger refreshes. When false the host calls `update_config`.
    pub fetch_on_read: bool,
    /// Identifier reported to the service (defaults to the hostname).
    pub client_id: String,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// AWS region used to derive the default endpoint.
    pub region: String,
    /// Explicit AppConfig Data endpoint, overriding the region-derived one.
    pub endpoint: Option<String>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            application: String::new(),
            environment: String::new(),
            profile: String::new(),
            max_config_age: DEFAULT_MAX_CONFIG_AGE,
            fetch_on_init: false,
            fetch_on_read: true,
            client_id: default_client_id(env::var(ENV_HOSTNAME).ok().filter(|name| !name.is_empty())),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
        }
    }
}

impl HelperConfig {
    /// Convenience constructor for the three identifiers plus the staleness bound.
    pub fn new(
        application: impl Into<String>,
        environment: impl Into<String>,
        profile: impl Into<String>,
        max_config_age: Duration,
    ) -> Self {
        Self {
            application: application.into(),
            environment: environment.into(),
            profile: profile.into(),
            max_config_age,
            ..Default::default()
        }
    }

    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| map.get(key).and_then(|value| sanitize_non_empty(value));

        let client_id = get(ENV_CLIENT_ID)
            .unwrap_or_else(|| default_client_id(get(ENV_HOSTNAME)));
        let region = get(ENV_REGION)
            .or_else(|| get(ENV_DEFAULT_REGION))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Self {
            application: get(ENV_APPLICATION).unwrap_or_default(),
            environment: get(ENV_ENVIRONMENT).unwrap_or_default(),
            profile: get(ENV_PROFILE).unwrap_or_default(),
            max_config_age: parse_seconds(
                ENV_MAX_CONFIG_AGE,
                get(ENV_MAX_CONFIG_AGE),
                DEFAULT_MAX_CONFIG_AGE,
            ),
            fetch_on_init: parse_bool(get(ENV_FETCH_ON_INIT).as_deref(), false),
            fetch_on_read: parse_bool(get(ENV_FETCH_ON_READ).as_deref(), true),
            client_id,
            fetch_timeout: parse_seconds(
                ENV_FETCH_TIMEOUT,
                get(ENV_FETCH_TIMEOUT),
                DEFAULT_FETCH_TIMEOUT,
            ),
            region,
            endpoint: get(ENV_ENDPOINT_URL),
        }
    }

    /// Base URL of the AppConfig Data API for this configuration.
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://appconfigdata.{}.amazonaws.com", self.region),
        }
    }

    /// HTTP client options. Plaintext is only allowed for an explicit endpoint
    /// (for instance a local AppConfig agent or a test server).
    pub fn http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            allow_plaintext: self.endpoint.is_some(),
            accept_invalid_certs: false,
        }
    }

    /// Fails unless an explicit endpoint is configured.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or(ConfigError::MissingEndpoint)
    }

    /// The document this configuration points at.
    pub fn target(&self) -> ConfigTarget {
        ConfigTarget {
            application: self.application.clone(),
            environment: self.environment.clone(),
            profile: self.profile.clone(),
        }
    }

    /// Rejects settings that cannot work at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, value) in [
            ("application", &self.application),
            ("environment", &self.environment),
            ("profile", &self.profile),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingIdentifier(label));
            }
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::ZeroFetchTimeout);
        }
        Ok(())
    }

    /// Trims identifiers and warns about settings the service will not honour.
    pub(crate) fn sanitise(mut self) -> Self {
        self.application = self.application.trim().to_string();
        self.environment = self.environment.trim().to_string();
        self.profile = self.profile.trim().to_string();
        self.client_id = self.client_id.trim().to_string();

        if self.max_config_age < MIN_SESSION_POLL_INTERVAL {
            warn!(
                "appconfig: max config age {:?} is below the service minimum poll interval {:?}; \
                 refreshes may be throttled",
                self.max_config_age, MIN_SESSION_POLL_INTERVAL
            );
        }
        if self.fetch_timeout > self.max_config_age && !self.max_config_age.is_zero() {
            warn!(
                "appconfig: fetch timeout {:?} exceeds max config age {:?}",
                self.fetch_timeout, self.max_config_age
            );
        }
        self
    }
}

/// Resolves the default client identifier: the given hostname if present,
/// then the OS hostname.
fn default_client_id(hostname: Option<String>) -> String {
    hostname
        .or_else(system_hostname)
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name
            .to_str()
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        Err(err) => {
            warn!("appconfig: failed to get system hostname: {err}");
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    env::var("COMPUTERNAME").ok().filter(|name| !name.is_empty())
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}

/// Parses a whole number of seconds, warning and falling back on bad input.
fn parse_seconds(name: &str, value: Option<String>, default: Duration) -> Duration {
    match value {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!("appconfig: ignoring invalid {name}={raw:?}; using {default:?}");
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ensures defaults are usable once identifiers are supplied.
    #[test]
    fn defaults_match_documented_values() {
        let config = HelperConfig::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert_eq!(config.max_config_age, DEFAULT_MAX_CONFIG_AGE);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert!(!config.fetch_on_init);
        assert!(config.fetch_on_read);
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(!config.client_id.is_empty());
        assert_eq!(
            config.base_url(),
            "https://appconfigdata.us-east-1.amazonaws.com"
        );
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingIdentifier("application"))
        );
    }

    /// Confirms environment-derived settings respect overrides.
    #[test]
    fn env_overrides_are_honoured() {
        let config = HelperConfig::from_env_iter([
            (ENV_APPLICATION, " orders "),
            (ENV_ENVIRONMENT, "prod"),
            (ENV_PROFILE, "limits"),
            (ENV_MAX_CONFIG_AGE, "120"),
            (ENV_FETCH_ON_INIT, "yes"),
            (ENV_FETCH_ON_READ, "0"),
            (ENV_CLIENT_ID, "worker-7"),
            (ENV_FETCH_TIMEOUT, "3"),
            (ENV_REGION, "eu-west-1"),
        ]);
        assert_eq!(config.application, "orders");
        assert_eq!(config.environment, "prod");
        assert_eq!(config.profile, "limits");
        assert_eq!(config.max_config_age, Duration::from_secs(120));
        assert!(config.fetch_on_init);
        assert!(!config.fetch_on_read);
        assert_eq!(config.client_id, "worker-7");
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(
            config.base_url(),
            "https://appconfigdata.eu-west-1.amazonaws.com"
        );
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            config.target(),
            ConfigTarget {
                application: "orders".into(),
                environment: "prod".into(),
                profile: "limits".into(),
            }
        );
    }

    /// Verifies region and client id fallbacks.
    #[test]
    fn falls_back_to_default_region_and_hostname() {
        let config = HelperConfig::from_env_iter([
            (ENV_DEFAULT_REGION, "ap-south-1"),
            (ENV_HOSTNAME, "container-abc"),
        ]);
        assert_eq!(config.region, "ap-south-1");
        assert_eq!(config.client_id, "container-abc");
    }

    /// Ensures an explicit endpoint wins over the region.
    #[test]
    fn endpoint_override_wins() {
        let config = HelperConfig::from_env_iter([
            (ENV_REGION, "eu-west-1"),
            (ENV_ENDPOINT_URL, "http://localhost:2772/"),
        ]);
        assert_eq!(config.base_url(), "http://localhost:2772");
        assert_eq!(config.require_endpoint(), Ok("http://localhost:2772/"));
        assert!(config.http_options().allow_plaintext);
        assert!(!HelperConfig::default().http_options().allow_plaintext);
        assert_eq!(
            HelperConfig::default().require_endpoint(),
            Err(ConfigError::MissingEndpoint)
        );
    }

    /// Ensures malformed numbers fall back to defaults instead of failing.
    #[test]
    fn invalid_numbers_use_defaults() {
        let config = HelperConfig::from_env_iter([
            (ENV_MAX_CONFIG_AGE, "soon"),
            (ENV_FETCH_TIMEOUT, "-1"),
        ]);
        assert_eq!(config.max_config_age, DEFAULT_MAX_CONFIG_AGE);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
    }

    /// Confirms boolean parsing honours common truthy/falsy spellings.
    #[test]
    fn parse_bool_permits_common_variants() {
        assert!(parse_bool(Some("true"), false));
        assert!(parse_bool(Some("Y"), false));
        assert!(!parse_bool(Some("no"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }

    /// Validates the hard-error checks.
    #[test]
    fn validate_rejects_unusable_settings() {
        let mut config = HelperConfig::new("app", "env", " ", Duration::from_secs(30));
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingIdentifier("profile"))
        );

        config.profile = "profile".into();
        config.fetch_timeout = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroFetchTimeout));

        config.fetch_timeout = Duration::from_secs(1);
        config.client_id = String::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyClientId));
    }

    /// Ensures sanitising trims identifiers and keeps a short staleness bound.
    #[test]
    #[tracing_test::traced_test]
    fn sanitise_trims_and_warns_on_short_age() {
        let config = HelperConfig::new(" app ", "env ", " profile", Duration::ZERO).sanitise();
        assert_eq!(config.application, "app");
        assert_eq!(config.environment, "env");
        assert_eq!(config.profile, "profile");
        assert_eq!(config.max_config_age, Duration::ZERO);
        assert!(logs_contain("below the service minimum poll interval"));
    }
}
