//! Object storage event notifications.
//!
//! The document an object store publishes when an object changes: a list
//! of records, each naming the event, the bucket, and the object key.

use serde::{Deserialize, Serialize};

/// Event name for a new object written with a single PUT.
pub const OBJECT_CREATED_PUT: &str = "ObjectCreated:Put";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<ObjectRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    #[serde(rename = "eventName")]
    pub event_name: String,
    #[serde(rename = "eventTime", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<u64>,
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ObjectNotification {
    /// A notification carrying a single record.
    pub fn single(event_name: &str, bucket: &str, key: &str, event_time: Option<u64>) -> Self {
        Self {
            records: vec![ObjectRecord {
                event_name: event_name.to_string(),
                event_time,
                s3: StorageEntity {
                    bucket: BucketRef {
                        name: bucket.to_string(),
                    },
                    object: ObjectRef {
                        key: key.to_string(),
                        size: None,
                    },
                },
            }],
        }
    }

    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ObjectRecord {
    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    pub fn key(&self) -> &str {
        &self.s3.object.key
    }
}

/// Whether `event_name` passes `filter`.
///
/// A filter ending in `:*` matches every event in its family
/// (`ObjectCreated:*` matches `ObjectCreated:Put` and `ObjectCreated:Copy`).
pub fn event_matches(filter: &str, event_name: &str) -> bool {
    match filter.strip_suffix('*') {
        Some(prefix) if prefix.ends_with(':') => event_name.starts_with(prefix),
        _ => filter == event_name,
    }
}
