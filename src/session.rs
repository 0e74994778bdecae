use std::sync::Arc;

use serde_json::Value;

use crate::agent::act::{run_act, ActParams};
use crate::agent::extract::{run_extract, ExtractParams};
use crate::agent::observe::{run_observe, ObserveParams};
use crate::agent::AgentContext;
use crate::browser::bridge::DomBridge;
use crate::browser::cdp::CdpDriver;
use crate::browser::driver::PageDriver;
use crate::config::SessionConfig;
use crate::error::{PilotError, Result};
use crate::llm::cache::ResponseCache;
use crate::llm::client::{GenAiClient, LlmClient};
use crate::llm::types::{ActResult, ObservedElement, UseVision};
use crate::mirror::ConsoleMirror;
use crate::recording::Recorder;

/// Options for [`Session::act`].
#[derive(Debug, Clone)]
pub struct ActOptions {
    pub action: String,
    /// Defaults to the session's configured model.
    pub model_name: Option<String>,
    pub use_vision: UseVision,
}

impl ActOptions {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            model_name: None,
            use_vision: UseVision::Fallback,
        }
    }
}

/// Options for [`Session::extract`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub instruction: String,
    /// JSON-Schema-shaped description of the desired result.
    pub schema: Value,
    pub model_name: Option<String>,
}

/// Options for [`Session::observe`].
#[derive(Debug, Clone, Default)]
pub struct ObserveOptions {
    /// Defaults to a generic find-interactive-elements prompt.
    pub instruction: Option<String>,
    pub model_name: Option<String>,
    pub use_vision: bool,
    /// Serialize the whole page instead of the first chunk.
    pub full_page: bool,
}

/// A browser automation session: one page, one recorder, one LLM cache.
///
/// Public calls may run concurrently in principle but share the page and
/// its focus; callers must serialize acts. See the concurrency notes in the
/// crate docs.
pub struct Session {
    driver: Arc<dyn PageDriver>,
    llm: Arc<dyn LlmClient>,
    bridge: DomBridge,
    recorder: Recorder,
    cache: Option<Arc<ResponseCache>>,
    mirror: ConsoleMirror,
    config: SessionConfig,
}

impl Session {
    /// Provision a browser per `config.env` and a genai-backed LLM client.
    pub async fn new(config: SessionConfig) -> Result<Self> {
        let cache = config
            .enable_caching
            .then(|| Arc::new(ResponseCache::new()));
        let driver: Arc<dyn PageDriver> = Arc::new(
            CdpDriver::create(&config)
                .await
                .map_err(|e| PilotError::Browser(e.to_string()))?,
        );
        let llm: Arc<dyn LlmClient> = Arc::new(GenAiClient::new(cache.clone()));
        Ok(Self::assemble(driver, llm, cache, config))
    }

    /// Build a session over caller-supplied driver and LLM implementations.
    /// This is the seam custom integrations and the test suite plug into.
    pub fn with_parts(
        driver: Arc<dyn PageDriver>,
        llm: Arc<dyn LlmClient>,
        config: SessionConfig,
    ) -> Self {
        let cache = config
            .enable_caching
            .then(|| Arc::new(ResponseCache::new()));
        Self::assemble(driver, llm, cache, config)
    }

    fn assemble(
        driver: Arc<dyn PageDriver>,
        llm: Arc<dyn LlmClient>,
        cache: Option<Arc<ResponseCache>>,
        config: SessionConfig,
    ) -> Self {
        let bridge = DomBridge::new(
            Arc::clone(&driver),
            config.dom_settle_timeout_ms,
            config.debug_dom,
        );
        let mirror = ConsoleMirror::new(config.verbose);
        Self {
            driver,
            llm,
            bridge,
            recorder: Recorder::new(),
            cache,
            mirror,
            config,
        }
    }

    /// Random base-36 request ID.
    fn fresh_request_id() -> String {
        let mut n = uuid::Uuid::new_v4().as_u128();
        let alphabet = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut out = Vec::new();
        while n > 0 {
            out.push(alphabet[(n % 36) as usize]);
            n /= 36;
        }
        if out.is_empty() {
            out.push(b'0');
        }
        out.reverse();
        String::from_utf8(out).expect("base36 digits are ascii")
    }

    fn context(&self) -> AgentContext<'_> {
        AgentContext {
            driver: &*self.driver,
            llm: &*self.llm,
            bridge: &self.bridge,
            recorder: &self.recorder,
            cache: self.cache.as_deref(),
            mirror: &self.mirror,
        }
    }

    fn resolve_model(&self, requested: Option<String>) -> String {
        requested.unwrap_or_else(|| self.config.default_model.clone())
    }

    /// Navigate and wait until the page has settled.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| PilotError::Browser(e.to_string()))?;
        self.bridge.wait_for_settled(None).await;
        Ok(())
    }

    /// Perform a natural-language instruction against the live page.
    ///
    /// Never errors: failures come back as `success: false` with an
    /// explanatory message and the original action echoed.
    pub async fn act(&self, options: ActOptions) -> ActResult {
        let request_id = Self::fresh_request_id();
        let model_name = self.resolve_model(options.model_name);
        self.mirror.log(
            1,
            "act",
            &format!("Running act: {} [{}]", options.action, request_id),
        );
        self.mirror.drain(&*self.driver).await;

        let outcome = run_act(
            &self.context(),
            ActParams {
                action: options.action.clone(),
                steps: String::new(),
                chunks_seen: Vec::new(),
                model_name,
                use_vision: options.use_vision,
                verifier_use_vision: true,
                request_id: request_id.clone(),
            },
        )
        .await;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.mirror
                    .log(1, "act", &format!("Error performing act: {}", e));
                if let Some(cache) = &self.cache {
                    cache.purge_request(&request_id);
                }
                ActResult {
                    success: false,
                    message: format!("Internal error: Error performing act: {}", e),
                    action: options.action,
                }
            }
        };
        self.mirror.drain(&*self.driver).await;
        result
    }

    /// Pull structured data conforming to `options.schema` out of the page.
    pub async fn extract(&self, options: ExtractOptions) -> Result<Value> {
        let request_id = Self::fresh_request_id();
        let model_name = self.resolve_model(options.model_name);
        self.mirror.log(
            1,
            "extract",
            &format!("Running extract: {} [{}]", options.instruction, request_id),
        );
        self.mirror.drain(&*self.driver).await;

        let outcome = run_extract(
            &self.context(),
            ExtractParams {
                instruction: options.instruction,
                schema: options.schema,
                model_name,
                request_id: request_id.clone(),
            },
        )
        .await;

        self.mirror.drain(&*self.driver).await;
        outcome.inspect_err(|e| {
            self.mirror
                .log(1, "extract", &format!("Error extracting: {}", e));
            if let Some(cache) = &self.cache {
                cache.purge_request(&request_id);
            }
        })
    }

    /// Enumerate candidate interactive elements. Every returned selector is
    /// an `xpath=`-prefixed string.
    pub async fn observe(&self, options: ObserveOptions) -> Result<Vec<ObservedElement>> {
        let request_id = Self::fresh_request_id();
        let model_name = self.resolve_model(options.model_name);
        self.mirror
            .log(1, "observe", &format!("Running observe [{}]", request_id));
        self.mirror.drain(&*self.driver).await;

        let outcome = run_observe(
            &self.context(),
            ObserveParams {
                instruction: options.instruction.unwrap_or_default(),
                use_vision: options.use_vision,
                full_page: options.full_page,
                model_name,
                request_id: request_id.clone(),
            },
        )
        .await;

        self.mirror.drain(&*self.driver).await;
        outcome.inspect_err(|e| {
            self.mirror
                .log(1, "observe", &format!("Error observing: {}", e));
            if let Some(cache) = &self.cache {
                cache.purge_request(&request_id);
            }
        })
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shut the underlying browser down.
    pub async fn close(&self) -> Result<()> {
        self.driver
            .close()
            .await
            .map_err(|e| PilotError::Browser(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_base36() {
        let id = Session::fresh_request_id();
        assert!(!id.is_empty());
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn request_ids_are_distinct() {
        assert_ne!(Session::fresh_request_id(), Session::fresh_request_id());
    }
}
