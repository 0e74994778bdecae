use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::llm::types::ObservedElement;

/// Hex SHA-256 of an instruction or action string; the record key.
pub fn content_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub instruction: String,
    pub result: Vec<ObservedElement>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: String,
    pub result: String,
    pub recorded_at: DateTime<Utc>,
}

/// Content-addressed store of past observations and actions.
///
/// Identical instruction text overwrites the prior record; that collision
/// behavior is deliberate and documented. Records are never deleted during
/// a session.
#[derive(Default)]
pub struct Recorder {
    observations: Mutex<HashMap<String, ObservationRecord>>,
    actions: Mutex<HashMap<String, ActionRecord>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an observation result under the hash of its instruction.
    /// Returns the key for future replay layers.
    pub fn record_observation(&self, instruction: &str, result: &[ObservedElement]) -> String {
        let id = content_key(instruction);
        self.observations.lock().expect("recorder lock poisoned").insert(
            id.clone(),
            ObservationRecord {
                instruction: instruction.to_string(),
                result: result.to_vec(),
                recorded_at: Utc::now(),
            },
        );
        id
    }

    /// Store an action outcome under the hash of the action string.
    pub fn record_action(&self, action: &str, result: &str) -> String {
        let id = content_key(action);
        self.actions.lock().expect("recorder lock poisoned").insert(
            id.clone(),
            ActionRecord {
                action: action.to_string(),
                result: result.to_string(),
                recorded_at: Utc::now(),
            },
        );
        id
    }

    pub fn observation(&self, id: &str) -> Option<ObservationRecord> {
        self.observations
            .lock()
            .expect("recorder lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn action(&self, id: &str) -> Option<ActionRecord> {
        self.actions
            .lock()
            .expect("recorder lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn observation_count(&self) -> usize {
        self.observations.lock().expect("recorder lock poisoned").len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().expect("recorder lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(selector: &str) -> ObservedElement {
        ObservedElement {
            selector: selector.to_string(),
            description: "Login".to_string(),
        }
    }

    #[test]
    fn observation_round_trips_through_its_key() {
        let recorder = Recorder::new();
        let result = vec![element("xpath=/a[1]")];

        let id = recorder.record_observation("find the login button", &result);

        assert_eq!(id, content_key("find the login button"));
        let record = recorder.observation(&id).unwrap();
        assert_eq!(record.instruction, "find the login button");
        assert_eq!(record.result, result);
    }

    #[test]
    fn identical_instructions_overwrite_without_duplicate_keys() {
        let recorder = Recorder::new();

        recorder.record_observation("find links", &[element("xpath=/a[1]")]);
        recorder.record_observation("find links", &[element("xpath=/a[2]")]);

        assert_eq!(recorder.observation_count(), 1);
        let record = recorder.observation(&content_key("find links")).unwrap();
        assert_eq!(record.result[0].selector, "xpath=/a[2]");
    }

    #[test]
    fn action_records_are_keyed_by_action_hash() {
        let recorder = Recorder::new();
        let id = recorder.record_action("click the signup button", "clicked");
        assert_eq!(id, content_key("click the signup button"));
        assert_eq!(recorder.action(&id).unwrap().result, "clicked");
        assert_eq!(recorder.action_count(), 1);
    }
}
