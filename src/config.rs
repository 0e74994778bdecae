use std::env;

use serde::{Deserialize, Serialize};

/// Default settle deadline applied when a call does not override it.
pub const DEFAULT_DOM_SETTLE_TIMEOUT_MS: u64 = 60_000;

/// Model used when neither the call nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Where the browser comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Env {
    /// Launch a Chrome instance on this machine.
    Local,
    /// Connect to an already-running browser over websocket
    /// (`PAGEPILOT_WS_URL`).
    Remote,
}

impl std::str::FromStr for Env {
    type Err = crate::error::PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOCAL" => Ok(Env::Local),
            "REMOTE" => Ok(Env::Remote),
            other => Err(crate::error::PilotError::Config(format!(
                "Unknown environment: {}",
                other
            ))),
        }
    }
}

/// Session configuration. Immutable after construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub env: Env,
    /// 0 = silent, 1 = info, 2 = debug. Gates mirroring into the page console.
    pub verbose: u8,
    /// Enables the in-page debug overlay around each DOM pass.
    pub debug_dom: bool,
    pub default_model: String,
    /// Forces a 1280x720 viewport on init.
    pub headless: bool,
    pub dom_settle_timeout_ms: u64,
    /// Enables per-request LLM cache eviction on failure.
    pub enable_caching: bool,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            env: env::var("PAGEPILOT_ENV")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Env::Local),
            verbose: env::var("PAGEPILOT_VERBOSE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            debug_dom: env::var("PAGEPILOT_DEBUG_DOM")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            default_model: env::var("PAGEPILOT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            headless: env::var("PAGEPILOT_HEADLESS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            dom_settle_timeout_ms: env::var("PAGEPILOT_DOM_SETTLE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DOM_SETTLE_TIMEOUT_MS),
            enable_caching: env::var("PAGEPILOT_ENABLE_CACHING")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_debug_dom(mut self, debug_dom: bool) -> Self {
        self.debug_dom = debug_dom;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_dom_settle_timeout_ms(mut self, ms: u64) -> Self {
        self.dom_settle_timeout_ms = ms;
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            env: Env::Local,
            verbose: 0,
            debug_dom: false,
            default_model: DEFAULT_MODEL.to_string(),
            headless: true,
            dom_settle_timeout_ms: DEFAULT_DOM_SETTLE_TIMEOUT_MS,
            enable_caching: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_headless_local() {
        let config = SessionConfig::default();
        assert_eq!(config.env, Env::Local);
        assert!(config.headless);
        assert_eq!(config.dom_settle_timeout_ms, DEFAULT_DOM_SETTLE_TIMEOUT_MS);
        assert!(!config.enable_caching);
    }

    #[test]
    fn env_parses_case_insensitively() {
        assert_eq!("local".parse::<Env>().unwrap(), Env::Local);
        assert_eq!("REMOTE".parse::<Env>().unwrap(), Env::Remote);
        assert!("cloud".parse::<Env>().is_err());
    }
}
