pub mod cache;
pub mod client;
pub mod prompts;
pub mod types;

pub use cache::ResponseCache;
pub use client::{GenAiClient, LlmClient, LlmProvider};
pub use types::{
    ActCommand, ActRequest, ActResult, ExtractMetadata, ExtractRequest, ExtractResponse,
    ObserveRequest, ObserveResponse, ObservedElement, RawObservedElement, UseVision, VerifyRequest,
};
