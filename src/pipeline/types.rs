//! Core types for the pipeline system

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to an envelope, ordered so logged output is stable
pub type Metadata = BTreeMap<String, String>;

/// Current wall-clock time as Unix seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Envelope carrying one value through the pipeline
///
/// Created by a source at ingestion time, mutated in place by operators
/// (value replaced, metadata appended) and consumed by the sink.
/// `metadata` is always present, possibly empty, so any stage may annotate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    /// Correlation key used for logging and HTTP dedup; may be empty
    pub key: String,

    /// Payload
    pub value: T,

    /// Ingestion time (Unix seconds)
    pub timestamp: i64,

    /// Free-form annotations
    #[serde(default)]
    pub metadata: Metadata,
}

impl<T> Message<T> {
    /// Create an envelope stamped with the current time and empty metadata
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self::at(key, value, unix_now())
    }

    /// Create an envelope with an explicit timestamp
    pub fn at(key: impl Into<String>, value: T, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry, replacing any previous value for `key`
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the payload, keeping key, timestamp and metadata
    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            key: self.key,
            value: f(self.value),
            timestamp: self.timestamp,
            metadata: self.metadata,
        }
    }
}
