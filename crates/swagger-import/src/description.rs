//! Loading the API description (swagger document) into a request payload.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::DescriptionLoadError;

/// Where a target's API description comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptionSource {
    /// A file whose bytes are sent verbatim.
    File(PathBuf),
    /// A document embedded in the task file.
    Inline(Map<String, Value>),
}

impl DescriptionSource {
    /// Choose the variant for an untyped task-file value.
    ///
    /// Strings are file paths, resolved against `base_dir` when relative.
    /// Objects are inline documents. Anything else is rejected.
    pub fn from_value(value: Value, base_dir: &Path) -> Result<Self, DescriptionLoadError> {
        match value {
            Value::String(path) => {
                let path = PathBuf::from(path);
                if path.is_absolute() {
                    Ok(DescriptionSource::File(path))
                } else {
                    Ok(DescriptionSource::File(base_dir.join(path)))
                }
            }
            Value::Object(document) => Ok(DescriptionSource::Inline(document)),
            other => Err(DescriptionLoadError::InvalidSourceType(value_kind(&other))),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            DescriptionSource::File(path) => format!("file:{}", path.display()),
            DescriptionSource::Inline(_) => "inline".to_string(),
        }
    }
}

/// Turns a [`DescriptionSource`] into the bytes handed to API Gateway.
pub struct DescriptionLoader;

impl DescriptionLoader {
    /// Load the payload. No local schema validation is performed.
    pub async fn load(source: &DescriptionSource) -> Result<Bytes, DescriptionLoadError> {
        match source {
            DescriptionSource::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        DescriptionLoadError::NotFound(path.clone())
                    } else {
                        DescriptionLoadError::Io {
                            path: path.clone(),
                            source: e,
                        }
                    }
                }),
            DescriptionSource::Inline(document) => Ok(Bytes::from(serde_json::to_vec(document)?)),
        }
    }

    /// Load from an untyped value, relative paths resolved against the
    /// current directory.
    pub async fn load_value(value: &Value) -> Result<Bytes, DescriptionLoadError> {
        let source = DescriptionSource::from_value(value.clone(), Path::new(""))?;
        Self::load(&source).await
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
