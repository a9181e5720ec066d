//! Current-production pricing from a distributor catalog.
//!
//! Stand-in for a wholesale distributor API. Prices are derived from the model
//! identifier alone so the same model always quotes the same numbers.
use super::{slugify, PriceQuote, PricingConfig, PricingError, PricingSource};
use crate::schema::{ConditionGrade, IdentificationRecord};

const CATALOG_CONFIDENCE: f64 = 0.9;

pub struct DistributorCatalog {
    config: PricingConfig,
}

impl DistributorCatalog {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Deterministic base price for a model identifier.
    pub fn base_price(&self, model: &str) -> f64 {
        self.config.base_price + model.trim().chars().count() as f64 * self.config.per_character
    }
}

impl PricingSource for DistributorCatalog {
    fn name(&self) -> &str {
        "distributor-catalog"
    }

    fn quote(&self, identification: &IdentificationRecord) -> Result<PriceQuote, PricingError> {
        let base_price = self.base_price(&identification.model);
        tracing::info!(
            make = %identification.make,
            model = %identification.model,
            base_price,
            "querying distributor catalog"
        );

        let estimated_value = match identification.condition_grade {
            ConditionGrade::New => base_price,
            _ => base_price * self.config.used_depreciation,
        };
        let item = slugify(&format!("{} {}", identification.make, identification.model));

        Ok(PriceQuote {
            wholesale_price: Some(base_price * self.config.wholesale_ratio),
            reference_price: Some(base_price * self.config.reference_ratio),
            estimated_value,
            currency: Some(self.config.currency.clone()),
            comparables: vec![format!(
                "{}/{item}",
                self.config.catalog_url.trim_end_matches('/')
            )],
            confidence: CATALOG_CONFIDENCE,
        })
    }
}
