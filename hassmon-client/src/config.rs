//! Monitor configuration
//!
//! Holds the endpoint, the access token and the ordered entity set, plus the
//! helpers that normalise a user-supplied host into the WebSocket URL.

use hassmon_core::{EntitySpec, Error, Result, SemanticType, Tz};
use std::fmt;
use std::time::Duration;

/// Path of the Home Assistant WebSocket API
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// How long `StateMonitor::stop` waits for the background task by default
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable names read by [`MonitorConfig::from_env`]
pub const ENV_HOSTNAME: &str = "HA_HOSTNAME";
pub const ENV_TOKEN: &str = "HA_TOKEN";
pub const ENV_TIMEZONE: &str = "HA_TIMEZONE";

/// Turn a host, `http(s)://` or `ws(s)://` address into the WebSocket URL
///
/// ```rust
/// use hassmon_client::websocket_url;
///
/// assert_eq!(
///     websocket_url("homeassistant.local:8123").unwrap(),
///     "ws://homeassistant.local:8123/api/websocket"
/// );
/// assert_eq!(
///     websocket_url("https://ha.example.com/").unwrap(),
///     "wss://ha.example.com/api/websocket"
/// );
/// ```
pub fn websocket_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(Error::Config("endpoint must not be empty".to_string()));
    }

    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest)) => {
            let scheme = match scheme.to_ascii_lowercase().as_str() {
                "ws" | "http" => "ws",
                "wss" | "https" => "wss",
                other => {
                    return Err(Error::Config(format!(
                        "unsupported endpoint scheme '{}'",
                        other
                    )))
                }
            };
            (scheme, rest)
        }
        None => ("ws", endpoint),
    };

    let rest = rest.trim_end_matches('/');
    if rest.is_empty() || rest.starts_with('/') {
        return Err(Error::Config(format!(
            "endpoint '{}' has no host",
            endpoint
        )));
    }

    if rest.ends_with(WEBSOCKET_PATH) {
        Ok(format!("{}://{}", scheme, rest))
    } else {
        Ok(format!("{}://{}{}", scheme, rest, WEBSOCKET_PATH))
    }
}

/// Entity declarations in the order they were made
///
/// Subscription ids are handed out in this order. Declaring the same entity
/// twice keeps its original position and replaces its type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    specs: Vec<EntitySpec>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity_id: impl Into<String>, semantic_type: SemanticType) {
        let entity_id = entity_id.into();
        match self.specs.iter_mut().find(|s| s.entity_id == entity_id) {
            Some(existing) => existing.semantic_type = semantic_type,
            None => self.specs.push(EntitySpec::new(entity_id, semantic_type)),
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<SemanticType> {
        self.specs
            .iter()
            .find(|s| s.entity_id == entity_id)
            .map(|s| s.semantic_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl FromIterator<EntitySpec> for Entities {
    fn from_iter<I: IntoIterator<Item = EntitySpec>>(iter: I) -> Self {
        let mut entities = Entities::new();
        for spec in iter {
            entities.insert(spec.entity_id, spec.semantic_type);
        }
        entities
    }
}

/// Everything a monitor needs to open sessions
#[derive(Clone)]
pub struct MonitorConfig {
    pub endpoint: String,
    pub token: String,
    pub entities: Entities,
    pub timezone: Option<Tz>,
    pub shutdown_timeout: Duration,
    pub stop_on_auth_failure: bool,
}

impl MonitorConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            entities: Entities::new(),
            timezone: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            stop_on_auth_failure: false,
        }
    }

    /// Read `HA_HOSTNAME`, `HA_TOKEN` and the optional `HA_TIMEZONE`
    ///
    /// Entities are left empty; add them before building a monitor.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup(ENV_HOSTNAME)
            .ok_or_else(|| Error::Config(format!("{} is not set", ENV_HOSTNAME)))?;
        let token =
            lookup(ENV_TOKEN).ok_or_else(|| Error::Config(format!("{} is not set", ENV_TOKEN)))?;

        let mut config = Self::new(endpoint, token);
        if let Some(name) = lookup(ENV_TIMEZONE).filter(|n| !n.trim().is_empty()) {
            config.timezone = Some(parse_timezone(&name)?);
        }
        Ok(config)
    }

    /// The normalised WebSocket URL
    pub fn url(&self) -> Result<String> {
        websocket_url(&self.endpoint)
    }

    /// Check the configuration errors that must fail at setup time
    pub fn validate(&self) -> Result<()> {
        self.url()?;
        if self.token.trim().is_empty() {
            return Err(Error::Config("access token must not be empty".to_string()));
        }
        if self.entities.is_empty() {
            return Err(Error::Config("at least one entity must be declared".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("entities", &self.entities)
            .field("timezone", &self.timezone)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("stop_on_auth_failure", &self.stop_on_auth_failure)
            .finish()
    }
}

/// Parse an IANA zone name such as `Australia/Sydney`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::InvalidTimezone(name.to_string()))
}
