use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The set of element interactions the act loop may dispatch.
///
/// Method names arrive from the model as strings; anything outside this set
/// is rejected as an invalid-method error rather than looked up dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorMethod {
    Click,
    Fill,
    Type,
    Press,
    ScrollIntoView,
    Hover,
    Check,
    Uncheck,
    SelectOption,
}

impl LocatorMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorMethod::Click => "click",
            LocatorMethod::Fill => "fill",
            LocatorMethod::Type => "type",
            LocatorMethod::Press => "press",
            LocatorMethod::ScrollIntoView => "scrollIntoView",
            LocatorMethod::Hover => "hover",
            LocatorMethod::Check => "check",
            LocatorMethod::Uncheck => "uncheck",
            LocatorMethod::SelectOption => "selectOption",
        }
    }
}

impl std::str::FromStr for LocatorMethod {
    type Err = crate::error::PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "click" => Ok(LocatorMethod::Click),
            "fill" => Ok(LocatorMethod::Fill),
            "type" => Ok(LocatorMethod::Type),
            "press" => Ok(LocatorMethod::Press),
            "scrollIntoView" => Ok(LocatorMethod::ScrollIntoView),
            "hover" => Ok(LocatorMethod::Hover),
            "check" => Ok(LocatorMethod::Check),
            "uncheck" => Ok(LocatorMethod::Uncheck),
            "selectOption" => Ok(LocatorMethod::SelectOption),
            other => Err(crate::error::PilotError::InvalidMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for LocatorMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstraction over the active browser tab.
///
/// Selectors are `"xpath="`-prefixed XPath strings; every dispatch targets
/// the first matching element. The production implementation is
/// [`CdpDriver`](crate::browser::CdpDriver); tests substitute their own.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Raw navigation. Callers that need the settled page go through
    /// `Session::goto`, which chains the settle wait.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Evaluate JavaScript in the page, awaiting promises, returning the
    /// JSON value of the result (`null` for undefined).
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Clear the field, click it, then type `text` character by character
    /// with a randomized human-like delay.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    /// Send a key press to the page (the focused element).
    async fn press(&self, key: &str) -> Result<()>;

    async fn scroll_into_view(&self, selector: &str) -> Result<()>;

    async fn hover(&self, selector: &str) -> Result<()>;

    async fn check(&self, selector: &str) -> Result<()>;

    async fn uncheck(&self, selector: &str) -> Result<()>;

    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;

    /// PNG screenshot of the viewport, or of the whole page when
    /// `full_page` is set.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Resolves once `document.readyState` reaches `interactive`.
    async fn wait_for_dom_content_loaded(&self) -> Result<()>;

    /// Resolves once the network has been quiet for a short window, or
    /// errors when `timeout` elapses first.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    /// Race for a newly opened page. When one appears within `timeout` it is
    /// closed and its URL returned; `None` when the race times out.
    async fn wait_for_new_page(&self, timeout: Duration) -> Result<Option<String>>;

    /// Release browser resources. Drivers without anything to release keep
    /// the default no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_methods_round_trip() {
        for name in [
            "click",
            "fill",
            "type",
            "press",
            "scrollIntoView",
            "hover",
            "check",
            "uncheck",
            "selectOption",
        ] {
            let method: LocatorMethod = name.parse().unwrap();
            assert_eq!(method.as_str(), name);
        }
    }

    #[test]
    fn unknown_method_is_an_explicit_error() {
        let err = "dragAndDrop".parse::<LocatorMethod>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal error: Chosen method dragAndDrop is invalid"
        );
    }
}
