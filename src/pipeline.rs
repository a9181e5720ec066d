//! Appraisal pipeline: extraction, then valuation, then the response record.
//!
//! The run is linear: `Received -> Identified -> Valued -> Completed`, failing
//! out of `Received` on extraction errors and out of `Identified` on valuation
//! errors. There is no retry loop here; a failed stage ends the request with a
//! stage-tagged [`AppraisalError`] and the caller decides whether to retry.
use crate::extraction::{ExtractionError, Extractor};
use crate::request::AppraisalRequest;
use crate::schema::AppraisalResponse;
use crate::valuation::{ValuationError, ValuationRouter};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Caller-facing failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidReference,
    MalformedOutput,
    SchemaViolation,
    InvalidIdentification,
    Timeout,
    UpstreamUnavailable,
}

impl ErrorKind {
    /// Transient upstream failures may be retried once; validation failures
    /// point at a prompt or parsing defect and never are.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::UpstreamUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidReference => "InvalidReference",
            Self::MalformedOutput => "MalformedOutput",
            Self::SchemaViolation => "SchemaViolation",
            Self::InvalidIdentification => "InvalidIdentification",
            Self::Timeout => "Timeout",
            Self::UpstreamUnavailable => "UpstreamUnavailable",
        };
        f.write_str(label)
    }
}

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Valuation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction => write!(f, "extraction"),
            Self::Valuation => write!(f, "valuation"),
        }
    }
}

/// Position of one request in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Identified,
    Valued,
    Completed,
    Failed(Stage),
}

impl PipelineState {
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Identified)
                | (Self::Identified, Self::Valued)
                | (Self::Valued, Self::Completed)
                | (Self::Received, Self::Failed(Stage::Extraction))
                | (Self::Identified, Self::Failed(Stage::Valuation))
        )
    }

    fn advance(self, next: PipelineState) -> PipelineState {
        debug_assert!(
            self.can_advance_to(next),
            "illegal pipeline transition {self:?} -> {next:?}"
        );
        tracing::debug!(from = ?self, to = ?next, "pipeline transition");
        next
    }
}

/// A failed appraisal, tagged with the stage that failed.
///
/// `Display` and [`AppraisalError::to_public_json`] carry only the cause
/// string; raw model output stays in [`AppraisalError::raw_output`].
#[derive(Debug, Error)]
#[error("{stage} failed ({kind}): {cause}")]
pub struct AppraisalError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub cause: String,
    raw_output: Option<String>,
}

impl AppraisalError {
    pub fn new(stage: Stage, kind: ErrorKind, cause: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            cause: cause.into(),
            raw_output: None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Unparseable model text, for operator diagnosis only.
    pub fn raw_output(&self) -> Option<&str> {
        self.raw_output.as_deref()
    }

    /// Error body safe to return to untrusted callers.
    pub fn to_public_json(&self) -> serde_json::Value {
        json!({
            "error": {
                "stage": self.stage,
                "kind": self.kind,
                "message": self.cause,
            }
        })
    }
}

impl From<ExtractionError> for AppraisalError {
    fn from(err: ExtractionError) -> Self {
        Self {
            stage: Stage::Extraction,
            kind: err.kind(),
            cause: err.to_string(),
            raw_output: err.raw_text().map(str::to_string),
        }
    }
}

impl From<ValuationError> for AppraisalError {
    fn from(err: ValuationError) -> Self {
        Self::new(Stage::Valuation, err.kind(), err.to_string())
    }
}

/// Sequences the extraction engine and the valuation router.
pub struct Appraiser {
    extractor: Extractor,
    router: ValuationRouter,
}

impl Appraiser {
    pub fn new(extractor: Extractor, router: ValuationRouter) -> Self {
        Self { extractor, router }
    }

    pub fn appraise(
        &self,
        image_reference: &str,
        ocr_hints: &[String],
    ) -> Result<AppraisalResponse, AppraisalError> {
        self.run(image_reference, ocr_hints, &BTreeMap::new())
    }

    /// Appraise a validated inbound request, including its context map.
    pub fn appraise_request(
        &self,
        request: &AppraisalRequest,
    ) -> Result<AppraisalResponse, AppraisalError> {
        self.run(&request.image_reference, &request.ocr_hints, &request.context)
    }

    fn run(
        &self,
        image_reference: &str,
        ocr_hints: &[String],
        context: &BTreeMap<String, String>,
    ) -> Result<AppraisalResponse, AppraisalError> {
        let state = PipelineState::Received;
        tracing::info!(
            image_reference,
            ocr_hints = ocr_hints.len(),
            context_entries = context.len(),
            "appraisal received"
        );

        let analysis = match self
            .extractor
            .extract_with_context(image_reference, ocr_hints, context)
        {
            Ok(record) => record,
            Err(err) => {
                state.advance(PipelineState::Failed(Stage::Extraction));
                let err = AppraisalError::from(err);
                tracing::warn!(kind = %err.kind, cause = %err.cause, "identification failed");
                return Err(err);
            }
        };
        let state = state.advance(PipelineState::Identified);
        tracing::info!(
            make = %analysis.make,
            model = %analysis.model,
            confidence = analysis.confidence,
            "identification complete"
        );

        let valuation = match self.router.value(&analysis) {
            Ok(record) => record,
            Err(err) => {
                state.advance(PipelineState::Failed(Stage::Valuation));
                let err = AppraisalError::from(err);
                tracing::warn!(kind = %err.kind, cause = %err.cause, "valuation failed");
                return Err(err);
            }
        };
        let state = state.advance(PipelineState::Valued);
        tracing::info!(
            source = %valuation.source,
            estimated_value = valuation.estimated_value,
            currency = %valuation.currency,
            "valuation complete"
        );

        let response = AppraisalResponse {
            analysis,
            valuation,
            timestamp: Utc::now(),
        };
        state.advance(PipelineState::Completed);
        Ok(response)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
