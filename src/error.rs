use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("DOM script error: {0}")]
    DomScript(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Internal error: Chosen method {0} is invalid")]
    InvalidMethod(String),

    #[error("Screenshot error: {0}")]
    Screenshot(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PilotError>;
