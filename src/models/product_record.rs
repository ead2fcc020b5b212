use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, ProcessingStage};
use crate::utils::error::ScoutError;

/// Persistent record of a product that survived extraction.
///
/// Append-only in intent: `processing_stage` only moves forward and
/// `cost_incurred` only grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    pub retailer: String,
    pub url: String,
    pub normalized_url: String,
    pub product_code: Option<String>,
    pub title: String,
    pub price: Decimal,
    pub external_id: Option<String>,
    pub processing_stage: ProcessingStage,
    pub cost_incurred: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProductRecord {
    pub retailer: String,
    pub url: String,
    pub normalized_url: String,
    pub product_code: Option<String>,
    pub title: String,
    pub price: Decimal,
}

impl ProductRecord {
    pub fn new(new_record: NewProductRecord) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            retailer: new_record.retailer,
            url: new_record.url,
            normalized_url: new_record.normalized_url,
            product_code: new_record.product_code,
            title: new_record.title,
            price: new_record.price,
            external_id: None,
            processing_stage: ProcessingStage::Discovered,
            cost_incurred: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the processing stage. Regressions and no-ops are rejected.
    pub fn advance_stage(&mut self, to: ProcessingStage) -> Result<(), ScoutError> {
        if to <= self.processing_stage {
            return Err(ScoutError::StageRegression {
                from: self.processing_stage.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.processing_stage = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn add_cost(&mut self, cost: Decimal) {
        self.cost_incurred += cost;
        self.updated_at = Utc::now();
    }
}
