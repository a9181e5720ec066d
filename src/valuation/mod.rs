//! Valuation routing.
//!
//! The router looks at exactly one field, `isCurrentProduction`, to choose a
//! pricing source, then normalizes the source's quote into a
//! [`ValuationRecord`]. Sources are pluggable behind [`PricingSource`]; the
//! defaults are deterministic stand-ins for a distributor catalog and a
//! completed-listings market.
pub mod distributor;
pub mod secondary;

use crate::pipeline::ErrorKind;
use crate::schema::{
    describe_violations, ConditionGrade, IdentificationRecord, ValuationRecord, ValuationSource,
    Violation, DEFAULT_CURRENCY,
};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use distributor::DistributorCatalog;
pub use secondary::CompletedListings;

/// Valuation-stage failures.
#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("identification is not valid for pricing: {}", describe_violations(.violations))]
    InvalidIdentification { violations: Vec<Violation> },

    #[error("pricing source timed out: {0}")]
    Timeout(String),

    #[error("pricing source unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("{route} source returned an unusable quote: {}", describe_violations(.violations))]
    RejectedQuote {
        route: ValuationSource,
        violations: Vec<Violation>,
    },
}

impl ValuationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentification { .. } => ErrorKind::InvalidIdentification,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::UpstreamUnavailable(_) | Self::RejectedQuote { .. } => {
                ErrorKind::UpstreamUnavailable
            }
        }
    }
}

/// Failures a pricing collaborator may raise.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<PricingError> for ValuationError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::Timeout(detail) => Self::Timeout(detail),
            PricingError::Unavailable(detail) => Self::UpstreamUnavailable(detail),
        }
    }
}

/// Raw answer from a pricing source, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub wholesale_price: Option<f64>,
    pub reference_price: Option<f64>,
    pub estimated_value: f64,
    /// `None` means the router's default currency.
    pub currency: Option<String>,
    pub comparables: Vec<String>,
    pub confidence: f64,
}

/// A place to get a price for an identified item.
pub trait PricingSource: Send + Sync {
    /// Source label for logs.
    fn name(&self) -> &str;

    fn quote(&self, identification: &IdentificationRecord) -> Result<PriceQuote, PricingError>;
}

/// Condition-to-price table for the secondary market.
///
/// Every grade maps to a price; grades without their own tier use `baseline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTiers {
    pub excellent: f64,
    pub good: f64,
    pub baseline: f64,
}

impl ConditionTiers {
    pub fn price_for(&self, grade: ConditionGrade) -> f64 {
        match grade {
            ConditionGrade::Excellent => self.excellent,
            ConditionGrade::Good => self.good,
            ConditionGrade::New
            | ConditionGrade::VeryGood
            | ConditionGrade::Fair
            | ConditionGrade::Poor => self.baseline,
        }
    }
}

impl Default for ConditionTiers {
    fn default() -> Self {
        Self {
            excellent: 1200.0,
            good: 800.0,
            baseline: 800.0,
        }
    }
}

/// Pricing constants.
///
/// These are placeholders pending real source integration; they are
/// configuration, not business logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingConfig {
    /// Base price before the per-character model component.
    pub base_price: f64,
    pub per_character: f64,
    /// Multiplier applied to the base price for anything not `New`.
    pub used_depreciation: f64,
    pub wholesale_ratio: f64,
    pub reference_ratio: f64,
    pub tiers: ConditionTiers,
    pub currency: String,
    pub catalog_url: String,
    pub listings_url: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price: 500.0,
            per_character: 50.0,
            used_depreciation: 0.7,
            wholesale_ratio: 0.8,
            reference_ratio: 1.2,
            tiers: ConditionTiers::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            catalog_url: "https://catalog.example.com/items".to_string(),
            listings_url: "https://listings.example.com/completed".to_string(),
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<()> {
        for (label, amount) in [
            ("basePrice", self.base_price),
            ("tiers.excellent", self.tiers.excellent),
            ("tiers.good", self.tiers.good),
            ("tiers.baseline", self.tiers.baseline),
        ] {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(anyhow!("pricing.{label} must be positive (got {amount})"));
            }
        }
        if !self.per_character.is_finite() || self.per_character < 0.0 {
            return Err(anyhow!(
                "pricing.perCharacter must be non-negative (got {})",
                self.per_character
            ));
        }
        if !(self.used_depreciation > 0.0 && self.used_depreciation <= 1.0) {
            return Err(anyhow!(
                "pricing.usedDepreciation must be within (0, 1] (got {})",
                self.used_depreciation
            ));
        }
        if !(self.wholesale_ratio > 0.0 && self.wholesale_ratio <= 1.0) {
            return Err(anyhow!(
                "pricing.wholesaleRatio must be within (0, 1] (got {})",
                self.wholesale_ratio
            ));
        }
        if !(self.reference_ratio.is_finite() && self.reference_ratio >= 1.0) {
            return Err(anyhow!(
                "pricing.referenceRatio must be at least 1 (got {})",
                self.reference_ratio
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(anyhow!(
                "pricing.currency must be a three-letter ISO code (got {:?})",
                self.currency
            ));
        }
        Ok(())
    }
}

/// Routes identifications to a pricing source and normalizes the result.
pub struct ValuationRouter {
    current_production: Box<dyn PricingSource>,
    secondary_market: Box<dyn PricingSource>,
    currency: String,
}

impl ValuationRouter {
    pub fn new(
        current_production: Box<dyn PricingSource>,
        secondary_market: Box<dyn PricingSource>,
    ) -> Self {
        Self {
            current_production,
            secondary_market,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Router backed by the built-in deterministic sources.
    pub fn from_config(config: &PricingConfig) -> Self {
        Self {
            current_production: Box::new(DistributorCatalog::new(config.clone())),
            secondary_market: Box::new(CompletedListings::new(config.clone())),
            currency: config.currency.clone(),
        }
    }

    /// Source selection; a pure function of `isCurrentProduction`.
    pub fn route(identification: &IdentificationRecord) -> ValuationSource {
        if identification.is_current_production {
            ValuationSource::PrimaryDistributor
        } else {
            ValuationSource::SecondaryMarket
        }
    }

    pub fn value(
        &self,
        identification: &IdentificationRecord,
    ) -> Result<ValuationRecord, ValuationError> {
        let violations = identification.violations();
        if !violations.is_empty() {
            return Err(ValuationError::InvalidIdentification { violations });
        }

        let source = Self::route(identification);
        let pricing = match source {
            ValuationSource::PrimaryDistributor => &self.current_production,
            _ => &self.secondary_market,
        };
        tracing::debug!(%source, pricing_source = pricing.name(), "valuation routed");

        let quote = pricing.quote(identification)?;
        self.normalize(source, identification, quote)
    }

    /// Value an identification that arrives as untyped JSON.
    pub fn value_json(&self, payload: &Value) -> Result<ValuationRecord, ValuationError> {
        let identification = IdentificationRecord::from_json(payload)
            .map_err(|violations| ValuationError::InvalidIdentification { violations })?;
        self.value(&identification)
    }

    fn normalize(
        &self,
        source: ValuationSource,
        identification: &IdentificationRecord,
        quote: PriceQuote,
    ) -> Result<ValuationRecord, ValuationError> {
        let mut comparables: Vec<String> = quote
            .comparables
            .into_iter()
            .map(|reference| reference.trim().to_string())
            .filter(|reference| !reference.is_empty())
            .collect();
        if comparables.is_empty() {
            comparables.push(format!(
                "synthetic:{}",
                slugify(&identification.display_name())
            ));
        }

        let record = ValuationRecord {
            source,
            wholesale_price: quote.wholesale_price,
            reference_price: quote.reference_price,
            estimated_value: quote.estimated_value,
            currency: quote
                .currency
                .map(|code| code.trim().to_ascii_uppercase())
                .unwrap_or_else(|| self.currency.clone()),
            comparables,
            confidence: quote.confidence,
        };

        let violations = record.violations();
        if !violations.is_empty() {
            return Err(ValuationError::RejectedQuote {
                route: source,
                violations,
            });
        }
        Ok(record)
    }
}

/// Lower-case, dash-separated identifier for reference URLs.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
#[path = "valuation_tests.rs"]
mod tests;
