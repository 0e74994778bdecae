use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Vision policy for an act invocation.
///
/// `Fallback` keeps planning text-only and replays the last chunk with a
/// screenshot attached once the chunked text pass yields nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UseVision {
    Disabled,
    Enabled,
    #[default]
    Fallback,
}

/// Request for the `act` prompt function: choose the next elementary UI
/// command for `action`, or nothing if this chunk offers no way forward.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActRequest {
    pub action: String,
    pub dom_elements: String,
    pub steps: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub model_name: String,
    pub request_id: String,
}

/// The model's chosen command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActCommand {
    pub element: i64,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub instruction: String,
    pub progress: String,
    pub previously_extracted_content: Value,
    pub dom_elements: String,
    pub schema: Value,
    pub chunks_seen: usize,
    pub chunks_total: usize,
    pub model_name: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractMetadata {
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub completed: bool,
}

/// Extract response: the model's own progress note plus the schema-shaped
/// partial value carried in the remaining fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub metadata: ExtractMetadata,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserveRequest {
    pub instruction: String,
    pub dom_elements: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub model_name: String,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservedElement {
    pub element_id: i64,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObserveResponse {
    #[serde(default)]
    pub elements: Vec<RawObservedElement>,
}

/// Request for the completion verifier: an independent view of the page
/// (screenshot or full DOM) against the claimed goal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub goal: String,
    pub steps: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_elements: Option<String>,
    pub model_name: String,
    pub request_id: String,
}

/// An interactive element surfaced by observe; `selector` is always an
/// `xpath=`-prefixed string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedElement {
    pub selector: String,
    pub description: String,
}

/// Outcome of an act call. `action` echoes the original instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActResult {
    pub success: bool,
    pub message: String,
    pub action: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_response_splits_metadata_from_fields() {
        let response: ExtractResponse = serde_json::from_value(json!({
            "metadata": { "progress": "half", "completed": false },
            "items": ["a"],
            "title": "Hello"
        }))
        .unwrap();
        assert_eq!(response.metadata.progress, "half");
        assert!(!response.metadata.completed);
        assert_eq!(response.fields.get("items"), Some(&json!(["a"])));
        assert_eq!(response.fields.get("title"), Some(&json!("Hello")));
        assert!(!response.fields.contains_key("metadata"));
    }

    #[test]
    fn act_command_defaults_optional_fields() {
        let command: ActCommand = serde_json::from_value(json!({
            "element": 0,
            "method": "click"
        }))
        .unwrap();
        assert!(command.args.is_empty());
        assert!(!command.completed);
    }
}
