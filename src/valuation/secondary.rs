//! Secondary-market pricing for discontinued and vintage items.
//!
//! Stand-in for a completed-listings search: builds the search key a real
//! client would submit and prices from the condition tier table. Real listing
//! retrieval is out of scope; the comparable is a placeholder search reference.
use super::{slugify, PriceQuote, PricingConfig, PricingError, PricingSource};
use crate::schema::IdentificationRecord;

const LISTINGS_CONFIDENCE: f64 = 0.7;

pub struct CompletedListings {
    config: PricingConfig,
}

impl CompletedListings {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }
}

/// `make model variant`, with the optional variant trimmed away when absent.
pub fn search_key(identification: &IdentificationRecord) -> String {
    identification.display_name()
}

impl PricingSource for CompletedListings {
    fn name(&self) -> &str {
        "completed-listings"
    }

    fn quote(&self, identification: &IdentificationRecord) -> Result<PriceQuote, PricingError> {
        let key = search_key(identification);
        tracing::info!(search_key = %key, grade = %identification.condition_grade, "searching completed listings");

        Ok(PriceQuote {
            wholesale_price: None,
            reference_price: None,
            estimated_value: self.config.tiers.price_for(identification.condition_grade),
            currency: Some(self.config.currency.clone()),
            comparables: vec![format!(
                "{}/{}",
                self.config.listings_url.trim_end_matches('/'),
                slugify(&key)
            )],
            confidence: LISTINGS_CONFIDENCE,
        })
    }
}
