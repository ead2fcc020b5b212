use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ScoutConfig;
use crate::utils::error::ScoutError;
use crate::Result;

pub mod backends;

pub use backends::html::HtmlScrapeBackend;
pub use backends::http_api::HttpApiBackend;

/// Structured fields pulled from a product page. A result is usable only
/// when the required fields are present; anything less is a structural
/// failure that triggers tier fallback.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExtractedData {
    pub title: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub product_code: Option<String>,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
}

impl ExtractedData {
    /// Title and price are the minimum for a usable record.
    pub fn is_complete(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty()) && self.price.is_some()
    }
}

/// What one backend attempt produced. `should_fallback` lets a backend
/// veto the cascade, e.g. a page that is definitively gone.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub success: bool,
    pub data: Option<ExtractedData>,
    pub should_fallback: bool,
    pub cost: Decimal,
    pub error: Option<String>,
}

impl BackendResponse {
    pub fn ok(data: ExtractedData, cost: Decimal) -> Self {
        Self {
            success: true,
            data: Some(data),
            should_fallback: false,
            cost,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, cost: Decimal) -> Self {
        Self {
            success: false,
            data: None,
            should_fallback: true,
            cost,
            error: Some(error.into()),
        }
    }

    pub fn gone(error: impl Into<String>, cost: Decimal) -> Self {
        Self {
            success: false,
            data: None,
            should_fallback: false,
            cost,
            error: Some(error.into()),
        }
    }
}

/// One extraction method at a known cost level. Backends report their own
/// failures through [`BackendResponse`] rather than error returns so the
/// router can always account for cost.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Tier name referenced by retailer tier lists.
    fn tier(&self) -> &str;

    /// Cost charged when an attempt times out before the backend can
    /// report its own.
    fn nominal_cost(&self) -> Decimal;

    async fn run(&self, url: &str, retailer: &str) -> BackendResponse;
}

#[derive(Debug, Clone)]
pub struct TierAttempt {
    pub tier: String,
    pub cost: Decimal,
    pub error: Option<String>,
}

/// Result of routing one URL through a retailer's tier cascade. Cost is the
/// sum over every attempt, including failed and timed-out ones.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub success: bool,
    pub data: Option<ExtractedData>,
    pub tier_used: Option<String>,
    pub total_cost: Decimal,
    pub attempts: Vec<TierAttempt>,
    pub error: Option<String>,
}

/// Routes extraction through each retailer's ordered tier list, cheapest
/// first, falling back on failure or timeout. Never tries a tier outside
/// the retailer's list and never repeats a tier within one extraction.
pub struct TierRouter {
    backends: HashMap<String, Arc<dyn ExtractionBackend>>,
    config: Arc<ScoutConfig>,
}

impl TierRouter {
    pub fn new(config: Arc<ScoutConfig>) -> Self {
        Self {
            backends: HashMap::new(),
            config,
        }
    }

    pub fn register(&mut self, backend: Arc<dyn ExtractionBackend>) {
        self.backends.insert(backend.tier().to_string(), backend);
    }

    /// Fail at startup if any configured tier has no registered backend.
    pub fn validate_tiers(&self) -> Result<()> {
        for (retailer, policy) in &self.config.retailers {
            if policy.tiers.is_empty() {
                return Err(ScoutError::MissingTierList {
                    retailer: retailer.clone(),
                });
            }
            for tier in &policy.tiers {
                if !self.backends.contains_key(tier) {
                    return Err(ScoutError::UnknownTier {
                        retailer: retailer.clone(),
                        tier: tier.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub async fn extract(&self, url: &str, retailer: &str) -> Result<ExtractionOutcome> {
        let policy = self.config.policy(retailer)?;
        let tier_timeout = policy.tier_timeout();

        let mut attempts = Vec::new();
        let mut total_cost = Decimal::ZERO;
        let mut last_error = None;

        for tier in &policy.tiers {
            let Some(backend) = self.backends.get(tier) else {
                return Err(ScoutError::UnknownTier {
                    retailer: retailer.to_string(),
                    tier: tier.clone(),
                });
            };

            debug!(retailer, url, %tier, "attempting extraction tier");
            let response = match timeout(tier_timeout, backend.run(url, retailer)).await {
                Ok(response) => response,
                Err(_) => {
                    // The work was started, so the attempt still costs.
                    BackendResponse::failed(
                        format!("tier {} timed out after {:?}", tier, tier_timeout),
                        backend.nominal_cost(),
                    )
                }
            };

            total_cost += response.cost;

            if response.success {
                match response.data {
                    Some(data) if data.is_complete() => {
                        info!(retailer, url, %tier, %total_cost, "extraction succeeded");
                        attempts.push(TierAttempt {
                            tier: tier.clone(),
                            cost: response.cost,
                            error: None,
                        });
                        return Ok(ExtractionOutcome {
                            success: true,
                            data: Some(data),
                            tier_used: Some(tier.clone()),
                            total_cost,
                            attempts,
                            error: None,
                        });
                    }
                    _ => {
                        // Fetched fine but missing required fields.
                        let error = format!("tier {} returned incomplete data", tier);
                        warn!(retailer, url, %tier, "incomplete extraction, falling back");
                        attempts.push(TierAttempt {
                            tier: tier.clone(),
                            cost: response.cost,
                            error: Some(error.clone()),
                        });
                        last_error = Some(error);
                    }
                }
            } else {
                let error = response
                    .error
                    .unwrap_or_else(|| format!("tier {} failed", tier));
                warn!(retailer, url, %tier, %error, "extraction tier failed");
                attempts.push(TierAttempt {
                    tier: tier.clone(),
                    cost: response.cost,
                    error: Some(error.clone()),
                });
                last_error = Some(error);
                if !response.should_fallback {
                    break;
                }
            }
        }

        Ok(ExtractionOutcome {
            success: false,
            data: None,
            tier_used: None,
            total_cost,
            attempts,
            error: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetailerPolicy, UrlRules};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_with_tiers(tiers: &[&str], timeout_secs: u64) -> Arc<ScoutConfig> {
        let mut config = ScoutConfig::default();
        config.retailers.insert(
            "shopco".to_string(),
            RetailerPolicy {
                url_rules: UrlRules::default(),
                tiers: tiers.iter().map(|t| t.to_string()).collect(),
                early_stop_threshold: 3,
                title_similarity_threshold: 0.90,
                price_tolerance: Decimal::ONE,
                tier_timeout_secs: timeout_secs,
                selectors: None,
            },
        );
        Arc::new(config)
    }

    fn complete_data() -> ExtractedData {
        ExtractedData {
            title: Some("Blue Midi Dress".to_string()),
            price: Some("49.99".parse().unwrap()),
            ..Default::default()
        }
    }

    enum Script {
        Succeed,
        Incomplete,
        Fail,
        Hang,
        Gone,
    }

    struct ScriptedBackend {
        name: String,
        cost: Decimal,
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(name: &str, cost: &str, script: Script) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                cost: cost.parse().unwrap(),
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        fn tier(&self) -> &str {
            &self.name
        }

        fn nominal_cost(&self) -> Decimal {
            self.cost
        }

        async fn run(&self, _url: &str, _retailer: &str) -> BackendResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Succeed => BackendResponse::ok(complete_data(), self.cost),
                Script::Incomplete => BackendResponse::ok(
                    ExtractedData {
                        title: Some("Blue Midi Dress".to_string()),
                        ..Default::default()
                    },
                    self.cost,
                ),
                Script::Fail => BackendResponse::failed("500 from upstream", self.cost),
                Script::Gone => BackendResponse::gone("page removed", self.cost),
                Script::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    BackendResponse::failed("unreachable", self.cost)
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cheapest_tier_wins_when_it_works() {
        let mut router = TierRouter::new(config_with_tiers(&["a", "b"], 45));
        let a = ScriptedBackend::new("a", "0.01", Script::Succeed);
        let b = ScriptedBackend::new("b", "0.25", Script::Succeed);
        router.register(a.clone());
        router.register(b.clone());

        let outcome = router.extract("https://s.example/p/1", "shopco").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tier_used.as_deref(), Some("a"));
        assert_eq!(outcome.total_cost, "0.01".parse().unwrap());
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_then_structural_then_success_sums_cost() {
        // Tier a times out, tier b fetches but misses fields, tier c works.
        // Every attempt is charged.
        let mut router = TierRouter::new(config_with_tiers(&["a", "b", "c"], 1));
        router.register(ScriptedBackend::new("a", "0.01", Script::Hang));
        router.register(ScriptedBackend::new("b", "0.05", Script::Incomplete));
        router.register(ScriptedBackend::new("c", "0.25", Script::Succeed));

        let outcome = router.extract("https://s.example/p/1", "shopco").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.tier_used.as_deref(), Some("c"));
        assert_eq!(outcome.total_cost, "0.31".parse().unwrap());
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts[0].error.as_deref().unwrap().contains("timed out"));
        assert!(outcome.attempts[1].error.as_deref().unwrap().contains("incomplete"));
        assert!(outcome.attempts[2].error.is_none());
    }

    #[tokio::test]
    async fn test_all_tiers_fail() {
        let mut router = TierRouter::new(config_with_tiers(&["a", "b"], 45));
        router.register(ScriptedBackend::new("a", "0.01", Script::Fail));
        router.register(ScriptedBackend::new("b", "0.25", Script::Fail));

        let outcome = router.extract("https://s.example/p/1", "shopco").await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.tier_used.is_none());
        assert_eq!(outcome.total_cost, "0.26".parse().unwrap());
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_gone_page_stops_the_cascade() {
        let mut router = TierRouter::new(config_with_tiers(&["a", "b"], 45));
        router.register(ScriptedBackend::new("a", "0.01", Script::Gone));
        let b = ScriptedBackend::new("b", "0.25", Script::Succeed);
        router.register(b.clone());

        let outcome = router.extract("https://s.example/p/1", "shopco").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_router_never_leaves_the_tier_list() {
        // "b" is registered but not in shopco's list
        let mut router = TierRouter::new(config_with_tiers(&["a"], 45));
        router.register(ScriptedBackend::new("a", "0.01", Script::Fail));
        let b = ScriptedBackend::new("b", "0.25", Script::Succeed);
        router.register(b.clone());

        let outcome = router.extract("https://s.example/p/1", "shopco").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validate_tiers_rejects_unregistered_tier() {
        let router = TierRouter::new(config_with_tiers(&["a", "missing"], 45));
        let err = router.validate_tiers().unwrap_err();
        assert!(matches!(err, ScoutError::UnknownTier { .. }));
    }

    #[tokio::test]
    async fn test_unknown_retailer_is_an_error() {
        let router = TierRouter::new(config_with_tiers(&["a"], 45));
        let err = router.extract("https://s.example/p/1", "nobody").await.unwrap_err();
        assert!(matches!(err, ScoutError::UnknownRetailer { .. }));
    }
}
