pub mod act;
pub mod extract;
pub mod observe;

use crate::browser::bridge::DomBridge;
use crate::browser::driver::PageDriver;
use crate::llm::cache::ResponseCache;
use crate::llm::client::LlmClient;
use crate::mirror::ConsoleMirror;
use crate::recording::Recorder;

/// Everything a loop iteration needs, borrowed from the owning session.
pub(crate) struct AgentContext<'a> {
    pub driver: &'a dyn PageDriver,
    pub llm: &'a dyn LlmClient,
    pub bridge: &'a DomBridge,
    pub recorder: &'a Recorder,
    /// Present only when caching is enabled.
    pub cache: Option<&'a ResponseCache>,
    pub mirror: &'a ConsoleMirror,
}
