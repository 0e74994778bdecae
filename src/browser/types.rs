use serde::Deserialize;
use std::collections::HashMap;

/// One chunk of the serialized DOM, as returned by `window.processDom`.
///
/// `output_string` lists the chunk's elements one per line, each prefixed
/// with the numeric element ID the model uses to refer to it. `selector_map`
/// resolves those IDs back to XPath strings for dispatch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkSnapshot {
    #[serde(default)]
    pub output_string: String,
    #[serde(default)]
    pub selector_map: HashMap<i64, String>,
    #[serde(default)]
    pub chunk: i64,
    #[serde(default)]
    pub chunks: Vec<i64>,
}

impl ChunkSnapshot {
    /// Text of the element line for `element_id`, i.e. the substring after
    /// the first `:` on the line beginning with `<element_id>:`.
    pub fn element_text(&self, element_id: i64) -> Option<&str> {
        let prefix = format!("{}:", element_id);
        self.output_string
            .lines()
            .find(|line| line.starts_with(&prefix))
            .and_then(|line| line.split_once(':'))
            .map(|(_, text)| text)
    }
}

/// Flat full-page serialization, as returned by `window.processAllOfDom`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullDomSnapshot {
    #[serde(default)]
    pub output_string: String,
    #[serde(default)]
    pub selector_map: HashMap<i64, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_text_takes_suffix_after_first_colon() {
        let snapshot = ChunkSnapshot {
            output_string: "0:Login button\n1:Signup: free trial".to_string(),
            ..Default::default()
        };
        assert_eq!(snapshot.element_text(0), Some("Login button"));
        assert_eq!(snapshot.element_text(1), Some("Signup: free trial"));
        assert_eq!(snapshot.element_text(7), None);
    }

    #[test]
    fn snapshot_deserializes_from_page_script_shape() {
        let snapshot: ChunkSnapshot = serde_json::from_value(serde_json::json!({
            "outputString": "0:Login\n",
            "selectorMap": { "0": "/a[1]" },
            "chunk": 0,
            "chunks": [0, 1]
        }))
        .unwrap();
        assert_eq!(snapshot.selector_map.get(&0).map(String::as_str), Some("/a[1]"));
        assert_eq!(snapshot.chunks, vec![0, 1]);
    }
}
