//! Inbound appraisal requests.
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// One appraisal request: an image, optional OCR hints, optional owner context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppraisalRequest {
    pub image_reference: String,
    pub ocr_hints: Vec<String>,
    pub context: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    image_reference: Option<String>,
    ocr_hints: Option<Vec<String>>,
    context: Option<BTreeMap<String, Value>>,
}

impl AppraisalRequest {
    pub fn new(
        image_reference: impl Into<String>,
        ocr_hints: Vec<String>,
    ) -> Result<Self, RequestError> {
        let image_reference = image_reference.into();
        if image_reference.trim().is_empty() {
            return Err(RequestError::InvalidArgument(
                "imageReference is required".to_string(),
            ));
        }
        Ok(Self {
            image_reference,
            ocr_hints,
            context: BTreeMap::new(),
        })
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Parse a JSON request body.
    ///
    /// Context values that are not strings are rendered as JSON text; nulls are
    /// dropped.
    pub fn from_json(text: &str) -> Result<Self, RequestError> {
        let raw: RawRequest = serde_json::from_str(text)
            .map_err(|err| RequestError::InvalidArgument(format!("request body: {err}")))?;
        let mut request = Self::new(
            raw.image_reference.unwrap_or_default(),
            raw.ocr_hints.unwrap_or_default(),
        )?;
        for (key, value) in raw.context.unwrap_or_default() {
            let rendered = match value {
                Value::Null => continue,
                Value::String(text) => text,
                other => other.to_string(),
            };
            request.context.insert(key, rendered);
        }
        Ok(request)
    }
}

/// Parse a `KEY=VALUE` command-line pair.
pub fn parse_context_pair(pair: &str) -> Result<(String, String), RequestError> {
    let (key, value) = pair.split_once('=').ok_or_else(|| {
        RequestError::InvalidArgument(format!("context entry {pair:?} is not KEY=VALUE"))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(RequestError::InvalidArgument(format!(
            "context entry {pair:?} has an empty key"
        )));
    }
    Ok((key.to_string(), value.to_string()))
}
