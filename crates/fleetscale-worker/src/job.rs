//! Rendition jobs derived from an uploaded object key.

use crate::error::{WorkerError, WorkerResult};

/// Extension used when the object key has none.
pub const DEFAULT_EXTENSION: &str = "png";

/// Output variants produced for every upload: suffix and target size.
/// `None` is the signed full-size copy.
pub const RENDITIONS: [(&str, Option<(u32, u32)>); 4] = [
    ("small", Some((100, 200))),
    ("medium", Some((300, 500))),
    ("large", Some((720, 1024))),
    ("text", None),
];

/// One output object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub suffix: &'static str,
    /// `(width, height)`, or `None` for the signed copy.
    pub size: Option<(u32, u32)>,
    pub key: String,
}

/// Everything a worker produces for one uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionJob {
    pub source_bucket: String,
    pub source_key: String,
    pub output_bucket: String,
    /// File name up to the first `.`.
    pub name: String,
    pub extension: String,
    /// Directory part of the key including the trailing `/`, or empty.
    pub prefix: String,
    pub renditions: Vec<Rendition>,
}

impl RenditionJob {
    pub fn from_key(source_bucket: &str, key: &str, output_bucket: &str) -> WorkerResult<Self> {
        let (prefix, file) = match key.rfind('/') {
            Some(i) => key.split_at(i + 1),
            None => ("", key),
        };

        let mut parts = file.split('.');
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(WorkerError::EmptyKey);
        }
        let extension = parts
            .next()
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_EXTENSION);

        let renditions = RENDITIONS
            .iter()
            .map(|&(suffix, size)| Rendition {
                suffix,
                size,
                key: format!("{prefix}{name}_{suffix}.{extension}"),
            })
            .collect();

        Ok(Self {
            source_bucket: source_bucket.to_string(),
            source_key: key.to_string(),
            output_bucket: output_bucket.to_string(),
            name: name.to_string(),
            extension: extension.to_string(),
            prefix: prefix.to_string(),
            renditions,
        })
    }

    pub fn output_keys(&self) -> impl Iterator<Item = &str> {
        self.renditions.iter().map(|r| r.key.as_str())
    }
}
