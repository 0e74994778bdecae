//! Mock driver and mock LLM client used by the loop scenario tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use pagepilot::llm::types::{
    ActCommand, ActRequest, ExtractRequest, ExtractResponse, ObserveRequest, ObserveResponse,
    VerifyRequest,
};
use pagepilot::{LlmClient, PageDriver, Session, SessionConfig};

/// A small valid PNG for screenshot responses.
pub fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(64, 64));
    let mut out = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut out),
        image::ImageFormat::Png,
    )
    .unwrap();
    out
}

/// Scripted stand-in for the browser. Responds to the in-page script
/// contract (`processDom`, `processAllOfDom`, `waitForDomSettle`, ...) and
/// records every primitive call for assertions.
#[derive(Default)]
pub struct MockDriver {
    /// Successive `processDom` results; the last one repeats once exhausted.
    pub chunk_responses: Mutex<Vec<Value>>,
    chunk_cursor: Mutex<usize>,
    pub all_dom_response: Mutex<Value>,
    pub ready_state: Mutex<String>,
    pub body_present: Mutex<bool>,
    /// When set, `waitForDomSettle` never resolves.
    pub hang_settle: Mutex<bool>,
    /// Consumed by the first post-click new-page race.
    pub new_page_url: Mutex<Option<String>>,
    pub url: Mutex<String>,
    /// Scripted outcomes for upcoming click dispatches, one entry per
    /// attempt: `true` makes that attempt fail. Attempts beyond the plan
    /// succeed.
    pub click_failures: Mutex<VecDeque<bool>>,
    /// Primitive calls, in order ("click <selector>", "goto <url>", ...).
    pub calls: Mutex<Vec<String>>,
    /// Every evaluated script, in order.
    pub scripts: Mutex<Vec<String>>,
}

impl MockDriver {
    pub fn new() -> Self {
        let driver = Self::default();
        *driver.ready_state.lock().unwrap() = "complete".to_string();
        *driver.body_present.lock().unwrap() = true;
        *driver.url.lock().unwrap() = "https://start/".to_string();
        driver
    }

    pub fn with_chunks(self, chunks: Vec<Value>) -> Self {
        *self.chunk_responses.lock().unwrap() = chunks;
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls_snapshot(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn scripts_snapshot(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn process_dom_calls(&self) -> usize {
        self.scripts_snapshot()
            .iter()
            .filter(|s| s.starts_with("window.processDom("))
            .count()
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.record(format!("goto {}", url));
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.scripts.lock().unwrap().push(script.to_string());

        if script.starts_with("window.processDom(") {
            let responses = self.chunk_responses.lock().unwrap();
            if responses.is_empty() {
                return Err(anyhow!("processDom is not installed"));
            }
            let mut cursor = self.chunk_cursor.lock().unwrap();
            let index = (*cursor).min(responses.len() - 1);
            *cursor += 1;
            return Ok(responses[index].clone());
        }
        if script.starts_with("window.processAllOfDom") {
            return Ok(self.all_dom_response.lock().unwrap().clone());
        }
        if script.contains("waitForDomSettle") {
            let hang = *self.hang_settle.lock().unwrap();
            if hang {
                std::future::pending::<()>().await;
            }
            return Ok(Value::Null);
        }
        if script == "document.readyState" {
            return Ok(Value::String(self.ready_state.lock().unwrap().clone()));
        }
        if script == "!!document.body" {
            return Ok(Value::Bool(*self.body_present.lock().unwrap()));
        }
        if script.starts_with("window.scrollToHeight") {
            self.record(script.to_string());
            return Ok(Value::Null);
        }
        if script.contains("document.evaluate") {
            // marker box resolution; no layout in the mock
            return Ok(serde_json::json!({}));
        }
        Ok(Value::Null)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let fail = self
            .click_failures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false);
        if fail {
            self.record(format!("click-failed {}", selector));
            return Err(anyhow!("element detached"));
        }
        self.record(format!("click {}", selector));
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.record(format!("fill {} {}", selector, text));
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        self.record(format!("press {}", key));
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<()> {
        self.record(format!("scrollIntoView {}", selector));
        Ok(())
    }

    async fn hover(&self, selector: &str) -> Result<()> {
        self.record(format!("hover {}", selector));
        Ok(())
    }

    async fn check(&self, selector: &str) -> Result<()> {
        self.record(format!("check {}", selector));
        Ok(())
    }

    async fn uncheck(&self, selector: &str) -> Result<()> {
        self.record(format!("uncheck {}", selector));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("selectOption {} {}", selector, value));
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        self.record(format!("screenshot full_page={}", full_page));
        Ok(png_bytes())
    }

    async fn wait_for_dom_content_loaded(&self) -> Result<()> {
        self.record("wait_dom_content_loaded");
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        self.record("wait_network_idle");
        Ok(())
    }

    async fn wait_for_new_page(&self, _timeout: Duration) -> Result<Option<String>> {
        self.record("wait_new_page");
        let url = self.new_page_url.lock().unwrap().take();
        if let Some(ref url) = url {
            self.record(format!("closed_new_page {}", url));
        }
        Ok(url)
    }
}

/// Scripted prompt functions. Responses pop from per-function queues;
/// every request is kept for assertions.
#[derive(Default)]
pub struct MockLlm {
    pub act_responses: Mutex<VecDeque<Option<ActCommand>>>,
    pub extract_responses: Mutex<VecDeque<ExtractResponse>>,
    pub observe_response: Mutex<ObserveResponse>,
    pub verify_responses: Mutex<VecDeque<bool>>,
    pub vision: bool,
    pub act_requests: Mutex<Vec<ActRequest>>,
    pub extract_requests: Mutex<Vec<ExtractRequest>>,
    pub observe_requests: Mutex<Vec<ObserveRequest>>,
    pub verify_requests: Mutex<Vec<VerifyRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            vision: true,
            ..Self::default()
        }
    }

    pub fn with_act(self, responses: Vec<Option<ActCommand>>) -> Self {
        *self.act_responses.lock().unwrap() = responses.into();
        self
    }

    pub fn with_extract(self, responses: Vec<Value>) -> Self {
        *self.extract_responses.lock().unwrap() = responses
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
        self
    }

    pub fn with_observe(self, response: Value) -> Self {
        *self.observe_response.lock().unwrap() = serde_json::from_value(response).unwrap();
        self
    }

    pub fn with_verify(self, responses: Vec<bool>) -> Self {
        *self.verify_responses.lock().unwrap() = responses.into();
        self
    }

    pub fn without_vision(mut self) -> Self {
        self.vision = false;
        self
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn act(&self, request: ActRequest) -> Result<Option<ActCommand>> {
        self.act_requests.lock().unwrap().push(request);
        Ok(self
            .act_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(None))
    }

    async fn extract(&self, request: ExtractRequest) -> Result<ExtractResponse> {
        self.extract_requests.lock().unwrap().push(request);
        self.extract_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected extract call"))
    }

    async fn observe(&self, request: ObserveRequest) -> Result<ObserveResponse> {
        self.observe_requests.lock().unwrap().push(request);
        Ok(self.observe_response.lock().unwrap().clone())
    }

    async fn verify_act_completion(&self, request: VerifyRequest) -> Result<bool> {
        self.verify_requests.lock().unwrap().push(request);
        Ok(self
            .verify_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false))
    }

    fn supports_vision(&self, _model: &str) -> bool {
        self.vision
    }
}

/// A session wired to the given mocks, with a short settle deadline so a
/// misbehaving test fails fast.
pub fn session_with(driver: Arc<MockDriver>, llm: Arc<MockLlm>) -> Session {
    let config = SessionConfig::default().with_dom_settle_timeout_ms(2_000);
    Session::with_parts(driver, llm, config)
}

/// Chunk snapshot literal in the shape `window.processDom` returns.
pub fn chunk(output: &str, selectors: Value, index: i64, all: Vec<i64>) -> Value {
    serde_json::json!({
        "outputString": output,
        "selectorMap": selectors,
        "chunk": index,
        "chunks": all,
    })
}

/// A click command on `element`, marked completed when `completed` is set.
pub fn click_command(element: i64, step: &str, completed: bool) -> ActCommand {
    ActCommand {
        element,
        method: "click".to_string(),
        args: vec![],
        step: step.to_string(),
        why: "btn".to_string(),
        completed,
    }
}
