use crate::error::{Error, Result};
use crate::http::Timeouts;
use crate::routing::{FallbackRouter, FallbackSupport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODELS_ENDPOINT: &str = "https://api.openai.com/v1/models";

/// Environment variables consulted when no key is configured, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["OPENAI_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
    /// Chat completions endpoint.
    pub endpoint: String,
    pub models_endpoint: String,

    /// Sent with every request. Overrides the defaults on collision.
    pub headers: HashMap<String, String>,

    /// Whether model candidate lists are sent as-is or collapsed to the first entry.
    pub fallback: FallbackSupport,
    /// Additional hosts that accept candidate lists in `auto` mode.
    pub fallback_hosts: Vec<String>,

    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two reads of a response body.
    pub read_timeout_secs: u64,
    /// Total time for a non-streaming request. Streams are not bounded.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let timeouts = Timeouts::default();

        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            models_endpoint: DEFAULT_MODELS_ENDPOINT.to_string(),
            headers: HashMap::new(),
            fallback: FallbackSupport::Auto,
            fallback_hosts: Vec::new(),
            connect_timeout_secs: timeouts.connect.as_secs(),
            read_timeout_secs: timeouts.read.as_secs(),
            request_timeout_secs: timeouts.request.as_secs(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("llm-chat-openai").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".llm-chat-openai/config.toml"))
    }

    /// Load from the default location, or defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Configured key, else the first non-empty environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }

        API_KEY_ENV_VARS
            .iter()
            .find_map(|name| env(name).filter(|k| !k.is_empty()))
            .ok_or_else(|| Error::MissingApiKey {
                env_vars: API_KEY_ENV_VARS.iter().map(|s| (*s).to_string()).collect(),
            })
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        parse_url(&self.endpoint)
    }

    pub fn models_url(&self) -> Result<Url> {
        parse_url(&self.models_endpoint)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            read: Duration::from_secs(self.read_timeout_secs),
            request: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn fallback_router(&self) -> FallbackRouter {
        self.fallback_hosts
            .iter()
            .fold(FallbackRouter::new(self.fallback), |router, host| {
                router.with_host(host.clone())
            })
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("invalid endpoint URL {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.models_endpoint, DEFAULT_MODELS_ENDPOINT);
        assert_eq!(config.fallback, FallbackSupport::Auto);
        assert_eq!(config.timeouts(), Timeouts::default());
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
api_key = "sk-or-test"
endpoint = "https://openrouter.ai/api/v1/chat/completions"
fallback = "always"
fallback_hosts = ["gateway.internal"]
request_timeout_secs = 30

[headers]
"HTTP-Referer" = "https://example.com"
"X-Title" = "Example"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-or-test"));
        assert_eq!(config.fallback, FallbackSupport::Always);
        assert_eq!(config.headers.len(), 2);
        assert_eq!(config.timeouts().request, Duration::from_secs(30));
        // Unset fields keep their defaults.
        assert_eq!(config.models_endpoint, DEFAULT_MODELS_ENDPOINT);
        assert_eq!(config.connect_timeout_secs, 10);

        let url = config.endpoint_url().unwrap();
        assert_eq!(url.host_str(), Some("openrouter.ai"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "fallback = \"sometimes\"").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_api_key_resolution() {
        let env = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-env".to_string());

        let configured = Config {
            api_key: Some("sk-config".into()),
            ..Config::default()
        };
        assert_eq!(configured.resolve_api_key_with(env).unwrap(), "sk-config");

        let unset = Config::default();
        assert_eq!(unset.resolve_api_key_with(env).unwrap(), "sk-env");

        let empty = Config {
            api_key: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(empty.resolve_api_key_with(env).unwrap(), "sk-env");

        let err = unset.resolve_api_key_with(|_| None).unwrap_err();
        assert!(matches!(err, Error::MissingApiKey { ref env_vars } if env_vars == &["OPENAI_API_KEY"]));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = Config {
            endpoint: "not a url".into(),
            ..Config::default()
        };
        assert!(matches!(config.endpoint_url(), Err(Error::Config(_))));
    }

    #[test]
    fn test_fallback_router_from_config() {
        let config = Config {
            fallback_hosts: vec!["gateway.internal".into()],
            ..Config::default()
        };
        let router = config.fallback_router();
        assert!(router.supports(&Url::parse("http://gateway.internal/v1/chat/completions").unwrap()));
        assert!(!router.supports(&Url::parse(DEFAULT_ENDPOINT).unwrap()));
    }
}
