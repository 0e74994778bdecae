pub mod store;

pub use store::{content_key, ActionRecord, ObservationRecord, Recorder};
