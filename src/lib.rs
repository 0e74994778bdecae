//! LLM-driven browser automation.
//!
//! A [`Session`] closes a loop between a headless (or headed) browser and a
//! large language model and exposes three operations on the live page:
//!
//! - [`Session::act`] — perform a natural-language instruction;
//! - [`Session::extract`] — pull structured data matching a caller schema;
//! - [`Session::observe`] — enumerate candidate interactive elements.
//!
//! The browser supplies a chunked text serialization of the DOM (and
//! optionally an annotated screenshot); the model returns structured data,
//! element descriptors, or the next elementary UI command; the session
//! executes it and re-enters the loop until completion or exhaustion.
//!
//! # Architecture
//!
//! - **browser**: the page driver seam, the chromiumoxide implementation,
//!   and the bridge over the pre-injected DOM-processing scripts
//! - **llm**: the four prompt functions, the genai client, the response cache
//! - **agent**: the act, extract and observe loops
//! - **recording**: content-addressed store of observations and actions
//! - **vision**: annotated screenshots for vision-capable models
//!
//! # Concurrency
//!
//! A session owns exactly one page and one browser context. Concurrent
//! public calls share them; since the browser has a single focus, callers
//! must serialize acts. The recorder and the LLM cache tolerate
//! interleaving (last writer wins).

pub mod agent;
pub mod browser;
pub mod config;
pub mod error;
pub mod llm;
pub mod mirror;
pub mod recording;
pub mod session;
pub mod vision;

pub use browser::{CdpDriver, ChunkSnapshot, DomBridge, FullDomSnapshot, LocatorMethod, PageDriver};
pub use config::{Env, SessionConfig};
pub use error::{PilotError, Result};
pub use llm::{
    ActCommand, ActRequest, ActResult, ExtractRequest, ExtractResponse, GenAiClient, LlmClient,
    LlmProvider, ObserveRequest, ObserveResponse, ObservedElement, ResponseCache, UseVision,
    VerifyRequest,
};
pub use recording::{content_key, ActionRecord, ObservationRecord, Recorder};
pub use session::{ActOptions, ExtractOptions, ObserveOptions, Session};
