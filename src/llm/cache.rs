use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// LLM response cache, content-addressed by the canonical request JSON and
/// indexed by request ID so a failed public call can evict everything it
/// contributed.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CachedResponse>>,
}

struct CachedResponse {
    request_id: String,
    value: Value,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a prompt call: SHA-256 over the prompt kind and the
    /// request payload, with the per-call `requestId` field removed so
    /// identical prompts hit across invocations.
    pub fn key(kind: &str, payload: &Value) -> String {
        let mut canonical = payload.clone();
        if let Some(object) = canonical.as_object_mut() {
            object.remove("requestId");
        }
        let bytes = serde_json::to_vec(&serde_json::json!({
            "kind": kind,
            "payload": canonical,
        }))
        .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(key)
            .map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: String, request_id: &str, value: Value) {
        self.entries.lock().expect("cache lock poisoned").insert(
            key,
            CachedResponse {
                request_id: request_id.to_string(),
                value,
            },
        );
    }

    /// Drop every entry written under `request_id`.
    pub fn purge_request(&self, request_id: &str) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.retain(|_, entry| entry.request_id != request_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_ignores_request_id() {
        let a = ResponseCache::key("act", &json!({"action": "x", "requestId": "r1"}));
        let b = ResponseCache::key("act", &json!({"action": "x", "requestId": "r2"}));
        assert_eq!(a, b);

        let c = ResponseCache::key("act", &json!({"action": "y", "requestId": "r1"}));
        assert_ne!(a, c);
    }

    #[test]
    fn purge_removes_only_the_failed_request() {
        let cache = ResponseCache::new();
        cache.put("k1".to_string(), "req-a", json!(1));
        cache.put("k2".to_string(), "req-b", json!(2));

        cache.purge_request("req-a");

        assert!(cache.get("k1").is_none());
        assert_eq!(cache.get("k2"), Some(json!(2)));
    }
}
