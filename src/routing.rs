//! Model fallback routing.
//!
//! Some OpenAI-compatible gateways accept an ordered `models` array and try each
//! candidate in turn. Everyone else only understands a single `model`, so candidate
//! lists are collapsed to their first entry for them.

use serde::{Deserialize, Serialize};
use url::Url;

/// Hosts known to accept `models` + `route: "fallback"`.
pub const FALLBACK_HOSTS: &[&str] = &["openrouter.ai"];

/// Whether `host` is on the built-in fallback allow-list.
#[must_use]
pub fn supports_fallback(host: &str) -> bool {
    FALLBACK_HOSTS
        .iter()
        .any(|known| host.eq_ignore_ascii_case(known))
}

/// How the client decides fallback capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSupport {
    /// Consult the host allow-list.
    #[default]
    Auto,
    /// Always send candidate lists (custom gateways).
    Always,
    /// Always collapse to the first candidate.
    Never,
}

/// Per-client fallback capability, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackRouter {
    support: FallbackSupport,
    extra_hosts: Vec<String>,
}

impl FallbackRouter {
    pub fn new(support: FallbackSupport) -> Self {
        Self {
            support,
            extra_hosts: Vec::new(),
        }
    }

    /// Treat `host` as fallback-capable in `Auto` mode.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.extra_hosts.push(host.into());
        self
    }

    #[must_use]
    pub fn support(&self) -> FallbackSupport {
        self.support
    }

    /// Decide for a concrete endpoint.
    #[must_use]
    pub fn supports(&self, endpoint: &Url) -> bool {
        match self.support {
            FallbackSupport::Always => true,
            FallbackSupport::Never => false,
            FallbackSupport::Auto => endpoint.host_str().is_some_and(|host| {
                supports_fallback(host)
                    || self
                        .extra_hosts
                        .iter()
                        .any(|extra| host.eq_ignore_ascii_case(extra))
            }),
        }
    }
}
