//! Firearm appraisal pipeline.
//!
//! A photo (plus optional OCR hints) goes through a vision model to produce a
//! validated [`IdentificationRecord`], which the valuation router prices from
//! the matching market into a [`ValuationRecord`]. [`Appraiser`] sequences the
//! two stages and returns an [`AppraisalResponse`].
pub mod config;
pub mod extraction;
pub mod pipeline;
pub mod request;
pub mod schema;
pub mod transcript;
pub mod valuation;

pub use extraction::{ExtractionError, Extractor};
pub use pipeline::{AppraisalError, Appraiser, ErrorKind, PipelineState, Stage};
pub use request::{AppraisalRequest, RequestError};
pub use schema::{
    AppraisalResponse, ConditionGrade, IdentificationRecord, ValuationRecord, ValuationSource,
};
pub use valuation::{PricingConfig, ValuationError, ValuationRouter};
