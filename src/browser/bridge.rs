use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout};

use crate::browser::driver::PageDriver;
use crate::browser::types::{ChunkSnapshot, FullDomSnapshot};
use crate::error::{PilotError, Result};

const READY_STATE_POLL_MS: u64 = 100;

/// Typed wrapper around the pre-injected page scripts, plus the settle
/// synchronizer. One bridge per session, shared by all loops.
pub struct DomBridge {
    driver: Arc<dyn PageDriver>,
    settle_timeout_ms: u64,
    debug_dom: bool,
}

impl DomBridge {
    pub fn new(driver: Arc<dyn PageDriver>, settle_timeout_ms: u64, debug_dom: bool) -> Self {
        Self {
            driver,
            settle_timeout_ms,
            debug_dom,
        }
    }

    /// Serialize the next unseen chunk of the DOM.
    pub async fn process_dom(&self, chunks_seen: &[i64]) -> Result<ChunkSnapshot> {
        let seen = serde_json::to_string(chunks_seen)
            .map_err(|e| PilotError::DomScript(e.to_string()))?;
        let value = self
            .driver
            .evaluate(&format!("window.processDom({})", seen))
            .await
            .map_err(|e| PilotError::DomScript(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| PilotError::DomScript(e.to_string()))
    }

    /// Flat serialization of the whole page, no chunking.
    pub async fn process_all_of_dom(&self) -> Result<FullDomSnapshot> {
        let value = self
            .driver
            .evaluate("window.processAllOfDom()")
            .await
            .map_err(|e| PilotError::DomScript(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| PilotError::DomScript(e.to_string()))
    }

    /// Scroll back to the top of the page. Used by the vision fallback so a
    /// fresh screenshot shows the page from its origin.
    pub async fn scroll_to_top(&self) {
        if let Err(e) = self.driver.evaluate("window.scrollToHeight(0)").await {
            tracing::debug!(error = %e, "scrollToHeight failed, continuing");
        }
    }

    pub async fn debug_start(&self) {
        if !self.debug_dom {
            return;
        }
        if let Err(e) = self.driver.evaluate("window.debugDom()").await {
            tracing::debug!(error = %e, "debugDom failed, continuing");
        }
    }

    pub async fn debug_cleanup(&self) {
        if !self.debug_dom {
            return;
        }
        if let Err(e) = self.driver.evaluate("window.cleanupDebug()").await {
            tracing::debug!(error = %e, "cleanupDebug failed, continuing");
        }
    }

    /// Wait until the page looks safe to inspect.
    ///
    /// Races the injected `waitForDomSettle` promise, the document ready
    /// state, and a queryable `body` against the deadline. Never fails: a
    /// timeout is logged and treated as settled, and script errors inside
    /// any arm only silence that arm.
    pub async fn wait_for_settled(&self, timeout_ms: Option<u64>) {
        let deadline = Duration::from_millis(timeout_ms.unwrap_or(self.settle_timeout_ms));
        let driver = &*self.driver;

        let settled = async {
            tokio::select! {
                biased;
                _ = succeed_or_hang(driver.evaluate("window.waitForDomSettle()")) => {}
                _ = wait_dom_content_loaded(driver) => {}
                _ = wait_body_present(driver) => {}
            }
        };

        if timeout(deadline, settled).await.is_err() {
            tracing::info!(
                timeout_ms = deadline.as_millis() as u64,
                "DOM settle timed out, continuing"
            );
        }
    }
}

/// Resolve only on success; on error, log and park so a sibling arm (or the
/// outer deadline) decides instead.
async fn succeed_or_hang(fut: impl std::future::Future<Output = anyhow::Result<Value>>) {
    match fut.await {
        Ok(_) => {}
        Err(e) => {
            tracing::debug!(error = %e, "settle heuristic errored, ignoring");
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_dom_content_loaded(driver: &dyn PageDriver) {
    loop {
        match driver.evaluate("document.readyState").await {
            Ok(value) => {
                if matches!(value.as_str(), Some("interactive") | Some("complete")) {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "readyState probe errored, ignoring");
                std::future::pending::<()>().await;
            }
        }
        sleep(Duration::from_millis(READY_STATE_POLL_MS)).await;
    }
}

async fn wait_body_present(driver: &dyn PageDriver) {
    loop {
        match driver.evaluate("!!document.body").await {
            Ok(value) => {
                if value.as_bool() == Some(true) {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "body probe errored, ignoring");
                std::future::pending::<()>().await;
            }
        }
        sleep(Duration::from_millis(READY_STATE_POLL_MS)).await;
    }
}
