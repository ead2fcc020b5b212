use async_trait::async_trait;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::PageCache;
use crate::config::{ScoutConfig, SelectorTable};
use crate::extract::{BackendResponse, ExtractedData, ExtractionBackend};

pub const HTML_SCRAPE_TIER: &str = "html_scrape";

/// Mid-cost tier: download the product page and pull fields out with the
/// retailer's configured CSS selectors. Shares a page cache with other
/// tiers so a fallback never re-downloads a page fetched moments ago.
pub struct HtmlScrapeBackend {
    client: reqwest::Client,
    config: Arc<ScoutConfig>,
    cache: Option<Arc<PageCache>>,
    cost_per_call: Decimal,
    price_regex: Regex,
}

impl HtmlScrapeBackend {
    pub fn new(
        config: Arc<ScoutConfig>,
        cache: Option<Arc<PageCache>>,
        cost_per_call: Decimal,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; shopscout/0.1)")
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            cache,
            cost_per_call,
            // Match decimals with optional thousand separators
            price_regex: Regex::new(r"(\d{1,3}(?:,\d{3})*(?:\.\d+)?|\d+(?:\.\d+)?)").unwrap(),
        }
    }

    fn parse_price(&self, text: &str) -> Option<Decimal> {
        let captures = self.price_regex.captures(text)?;
        let number = captures.get(1)?.as_str().replace(',', "");
        number.parse().ok()
    }

    async fn page_body(&self, url: &str, retailer: &str) -> Result<String, String> {
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(retailer, url).await {
                debug!(retailer, url, "scrape tier served from page cache");
                return Ok(body);
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("page fetch failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("page fetch returned {}", response.status()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("page body unreadable: {}", e))?;

        if let Some(cache) = &self.cache {
            cache.put(retailer, url, body.clone()).await;
        }
        Ok(body)
    }

    fn extract_fields(&self, body: &str, selectors: &SelectorTable) -> ExtractedData {
        let document = Html::parse_document(body);
        let mut data = ExtractedData::default();

        if let Ok(selector) = Selector::parse(&selectors.title) {
            data.title = document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty());
        }

        if let Ok(selector) = Selector::parse(&selectors.price) {
            data.price = document
                .select(&selector)
                .next()
                .and_then(|el| self.parse_price(&el.text().collect::<String>()));
        }

        if let Some(code_selector) = &selectors.product_code {
            if let Ok(selector) = Selector::parse(code_selector) {
                data.product_code = document
                    .select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .filter(|c| !c.is_empty());
            }
        }

        if let Some(images_selector) = &selectors.images {
            if let Ok(selector) = Selector::parse(images_selector) {
                data.image_urls = document
                    .select(&selector)
                    .filter_map(|el| el.value().attr("src"))
                    .map(str::to_string)
                    .collect();
            }
        }

        data
    }
}

#[async_trait]
impl ExtractionBackend for HtmlScrapeBackend {
    fn tier(&self) -> &str {
        HTML_SCRAPE_TIER
    }

    fn nominal_cost(&self) -> Decimal {
        self.cost_per_call
    }

    async fn run(&self, url: &str, retailer: &str) -> BackendResponse {
        let Some(selectors) = self
            .config
            .retailers
            .get(retailer)
            .and_then(|p| p.selectors.as_ref())
        else {
            return BackendResponse::failed(
                format!("no scrape selectors configured for {}", retailer),
                Decimal::ZERO,
            );
        };

        let body = match self.page_body(url, retailer).await {
            Ok(body) => body,
            Err(e) => return BackendResponse::failed(e, self.cost_per_call),
        };

        let data = self.extract_fields(&body, selectors);
        BackendResponse::ok(data, self.cost_per_call)
    }
}
