//! Vision-based structured extraction.
//!
//! Turns `(image_reference, ocr_hints)` into a validated
//! [`IdentificationRecord`]: resolve the image, build the constrained prompt,
//! call the vision model once, then strip fences, parse and validate. Each
//! stage has its own failure variant so callers can tell bad input, bad model
//! output and upstream outages apart. There is no retry at this layer.
pub mod image;
pub mod prompt;
pub mod response;
pub mod vision;

use crate::pipeline::ErrorKind;
use crate::schema::{describe_violations, IdentificationRecord, Violation};
use crate::transcript::{Transcript, TranscriptBuilder};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub use image::{resolve_image, ResolvedImage};
pub use prompt::build_identification_prompt;
pub use response::{parse_identification, strip_code_fences};
pub use vision::{GenerationConfig, ModelError, VisionModel};

/// Extraction-stage failures.
///
/// `Display` never includes raw model output; use [`ExtractionError::raw_text`]
/// for diagnosis.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("model output is not valid JSON: {detail}")]
    MalformedOutput { raw_text: String, detail: String },

    #[error("model output violates the identification schema: {}", describe_violations(.violations))]
    SchemaViolation { violations: Vec<Violation> },

    #[error("vision model timed out: {0}")]
    Timeout(String),

    #[error("vision model unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidReference { .. } => ErrorKind::InvalidReference,
            Self::MalformedOutput { .. } => ErrorKind::MalformedOutput,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Raw model text preserved on `MalformedOutput`.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw_text, .. } => Some(raw_text),
            _ => None,
        }
    }
}

impl From<ModelError> for ExtractionError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Timeout(detail) => Self::Timeout(detail),
            ModelError::Unavailable(detail) => Self::UpstreamUnavailable(detail),
        }
    }
}

/// Extraction engine bound to one vision-model handle.
///
/// Holds no per-request state, so one instance can serve concurrent requests.
pub struct Extractor {
    model: Arc<dyn VisionModel>,
    generation: GenerationConfig,
    transcript: Option<Arc<Transcript>>,
}

impl Extractor {
    pub fn new(model: Arc<dyn VisionModel>, generation: GenerationConfig) -> Self {
        Self {
            model,
            generation,
            transcript: None,
        }
    }

    /// Record every attempt (including raw model text) to a JSONL transcript.
    pub fn with_transcript(mut self, transcript: Arc<Transcript>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn extract(
        &self,
        image_reference: &str,
        ocr_hints: &[String],
    ) -> Result<IdentificationRecord, ExtractionError> {
        self.extract_with_context(image_reference, ocr_hints, &BTreeMap::new())
    }

    /// Extract with owner-supplied context appended to the prompt.
    pub fn extract_with_context(
        &self,
        image_reference: &str,
        ocr_hints: &[String],
        context: &BTreeMap<String, String>,
    ) -> Result<IdentificationRecord, ExtractionError> {
        let mut entry = TranscriptBuilder::new(image_reference);
        let result = self.run(image_reference, ocr_hints, context, &mut entry);

        if let Some(transcript) = &self.transcript {
            let entry = match &result {
                Ok(_) => entry.success(),
                Err(err) => entry.failed(err.kind(), err.to_string()),
            };
            transcript.record(&entry);
        }
        result
    }

    fn run(
        &self,
        image_reference: &str,
        ocr_hints: &[String],
        context: &BTreeMap<String, String>,
        entry: &mut TranscriptBuilder,
    ) -> Result<IdentificationRecord, ExtractionError> {
        let image = resolve_image(image_reference)?;
        tracing::debug!(image = %image.describe(), mime = image.mime_type(), "image resolved");

        let prompt = build_identification_prompt(ocr_hints, context);
        entry.set_prompt_preview(&prompt);

        let raw = self.model.generate(&image, &prompt, &self.generation)?;
        entry.set_raw_response(&raw);

        let record = parse_identification(&raw).inspect_err(|err| {
            if let Some(raw_text) = err.raw_text() {
                tracing::debug!(backend = self.model.name(), raw_text, "unparseable model output");
            }
        })?;
        Ok(record)
    }
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
