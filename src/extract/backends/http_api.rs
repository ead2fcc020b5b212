use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::extract::{BackendResponse, ExtractedData, ExtractionBackend};

/// Product payload from the structured extraction API.
#[derive(Debug, Deserialize)]
struct ApiProduct {
    title: Option<String>,
    price: Option<Decimal>,
    original_price: Option<Decimal>,
    product_code: Option<String>,
    description: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

/// Cheapest extraction tier: a third-party API that returns structured
/// product JSON for a URL. Billed per call, so every request counts
/// whether or not it yields usable data.
pub struct HttpApiBackend {
    client: reqwest::Client,
    base_url: String,
    cost_per_call: Decimal,
}

pub const FETCH_API_TIER: &str = "fetch_api";

impl HttpApiBackend {
    pub fn new(base_url: impl Into<String>, cost_per_call: Decimal) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("shopscout/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            cost_per_call,
        }
    }
}

#[async_trait]
impl ExtractionBackend for HttpApiBackend {
    fn tier(&self) -> &str {
        FETCH_API_TIER
    }

    fn nominal_cost(&self) -> Decimal {
        self.cost_per_call
    }

    async fn run(&self, url: &str, retailer: &str) -> BackendResponse {
        let endpoint = format!("{}/v1/extract", self.base_url.trim_end_matches('/'));
        debug!(retailer, url, "calling extraction api");

        let response = match self
            .client
            .get(&endpoint)
            .query(&[("url", url), ("retailer", retailer)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return BackendResponse::failed(
                    format!("extraction api unreachable: {}", e),
                    self.cost_per_call,
                )
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<ApiProduct>().await {
                Ok(product) => BackendResponse::ok(
                    ExtractedData {
                        title: product.title,
                        price: product.price,
                        original_price: product.original_price,
                        product_code: product.product_code,
                        description: product.description,
                        image_urls: product.images,
                    },
                    self.cost_per_call,
                ),
                Err(e) => BackendResponse::failed(
                    format!("extraction api returned malformed JSON: {}", e),
                    self.cost_per_call,
                ),
            },
            // The product page itself no longer exists; no other tier
            // will do better.
            StatusCode::GONE | StatusCode::NOT_FOUND => BackendResponse::gone(
                format!("extraction api reports page gone ({})", response.status()),
                self.cost_per_call,
            ),
            status => BackendResponse::failed(
                format!("extraction api returned {}", status),
                self.cost_per_call,
            ),
        }
    }
}
