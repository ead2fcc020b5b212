use std::sync::Arc;
use strsim::normalized_levenshtein;
use tracing::{debug, warn};

use crate::config::ScoutConfig;
use crate::models::{BaselineSnapshot, CatalogEntry, MatchMethod, MatchResult, ProductRecord};
use crate::store::ProductStore;

/// Ceiling applied when only one of the two record stores answered.
/// Below the confirm threshold, so a degraded query can flag a likely
/// duplicate for external disposition but never auto-confirms it.
const DEGRADED_CEILING: f64 = 0.80;

/// Hard cap for the fuzzy method, keeping it clear of the exact-match 1.0.
const FUZZY_CAP: f64 = 0.92;
const FUZZY_BASE: f64 = 0.85;

/// Classifies a discovered catalog entry as new, confirmed existing, or a
/// suspected duplicate, against the latest baseline snapshot and the live
/// product store.
///
/// Strategy cascade, first confident hit short-circuits; the fuzzy scan is
/// the only non-O(1) step and runs last. Read-only: callers persist results.
#[derive(Clone)]
pub struct MatchEngine {
    config: Arc<ScoutConfig>,
}

struct FuzzyScan {
    /// Best candidate meeting the similarity bar, with its ratio.
    hit: Option<(f64, Option<String>, String)>,
    /// Strongest below-bar ratio, feeding the no-match confidence.
    best_partial: f64,
}

impl MatchEngine {
    pub fn new(config: Arc<ScoutConfig>) -> Self {
        Self { config }
    }

    /// Case-insensitive title similarity in [0, 1].
    pub fn title_similarity(a: &str, b: &str) -> f64 {
        normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
    }

    pub async fn classify(
        &self,
        entry: &CatalogEntry,
        baseline: Option<&BaselineSnapshot>,
        products: &dyn ProductStore,
    ) -> MatchResult {
        let (threshold, tolerance) = match self.config.retailers.get(&entry.retailer) {
            Some(policy) => (policy.title_similarity_threshold, policy.price_tolerance),
            // Matching still works for retailers without a policy; the
            // session layer is what rejects unknown retailers outright.
            None => (0.90, rust_decimal::Decimal::ONE),
        };

        let mut degraded = false;

        // 1. Exact URL equality
        let store_hit = self
            .store_lookup(
                products.find_by_url(&entry.retailer, &entry.source_url).await,
                &mut degraded,
            )
            .flatten();
        let baseline_hit = baseline.is_some_and(|b| b.contains_url(&entry.source_url));
        if store_hit.is_some() || baseline_hit {
            return self.finish(
                1.0,
                store_hit.map(|r| r.id),
                MatchMethod::ExactUrl,
                "source URL already known",
                degraded,
            );
        }

        // 2. Normalized-URL equality
        let store_hit = self
            .store_lookup(
                products
                    .find_by_normalized_url(&entry.retailer, &entry.normalized_url)
                    .await,
                &mut degraded,
            )
            .flatten();
        let baseline_hit =
            baseline.and_then(|b| b.find_by_normalized_url(&entry.normalized_url));
        if store_hit.is_some() || baseline_hit.is_some() {
            return self.finish(
                0.95,
                store_hit.map(|r| r.id),
                MatchMethod::NormalizedUrl,
                "normalized URL already known",
                degraded,
            );
        }

        // 3. Product-code equality, both sides non-null
        if let Some(code) = entry.product_code.as_deref() {
            let store_hit = self
                .store_lookup(
                    products.find_by_product_code(&entry.retailer, code).await,
                    &mut degraded,
                )
                .flatten();
            let baseline_hit = baseline.and_then(|b| b.find_by_product_code(code));
            if store_hit.is_some() || baseline_hit.is_some() {
                return self.finish(
                    0.90,
                    store_hit.map(|r| r.id),
                    MatchMethod::ProductCode,
                    format!("product code {} already known", code),
                    degraded,
                );
            }
        }

        // 4. Title+price fuzzy over same-retailer candidates in the price window
        let candidates = self
            .store_lookup(
                products
                    .price_window(&entry.retailer, entry.price, tolerance)
                    .await,
                &mut degraded,
            )
            .unwrap_or_default();
        let scan = self.fuzzy_scan(entry, baseline, &candidates, threshold, tolerance);

        if let Some((ratio, matched_id, matched_title)) = scan.hit {
            let confidence = (FUZZY_BASE + (ratio - threshold) * 0.5).min(FUZZY_CAP);
            return self.finish(
                confidence,
                matched_id,
                MatchMethod::TitlePriceFuzzy,
                format!(
                    "title {:.0}% similar to '{}' at matching price",
                    ratio * 100.0,
                    matched_title
                ),
                degraded,
            );
        }

        // 5. No strategy matched
        debug!(
            retailer = %entry.retailer,
            url = %entry.normalized_url,
            best_partial = scan.best_partial,
            "no match found"
        );
        let rationale = if degraded {
            "no match found (product store degraded)".to_string()
        } else if scan.best_partial > 0.0 {
            format!("no match; best near-miss similarity {:.2}", scan.best_partial)
        } else {
            "no candidate in either store".to_string()
        };
        MatchResult::unmatched(scan.best_partial, rationale)
    }

    fn fuzzy_scan(
        &self,
        entry: &CatalogEntry,
        baseline: Option<&BaselineSnapshot>,
        store_candidates: &[ProductRecord],
        threshold: f64,
        tolerance: rust_decimal::Decimal,
    ) -> FuzzyScan {
        let mut hit: Option<(f64, Option<String>, String)> = None;
        let mut best_partial: f64 = 0.0;

        let mut consider = |ratio: f64, id: Option<String>, title: &str| {
            if ratio > threshold {
                if hit.as_ref().map_or(true, |(best, _, _)| ratio > *best) {
                    hit = Some((ratio, id, title.to_string()));
                }
            } else {
                best_partial = best_partial.max(ratio);
            }
        };

        for candidate in store_candidates {
            // price_window already filtered by retailer and tolerance
            let ratio = Self::title_similarity(&entry.title, &candidate.title);
            consider(ratio, Some(candidate.id.clone()), &candidate.title);
        }

        if let Some(baseline) = baseline {
            for candidate in &baseline.entries {
                if candidate.retailer != entry.retailer {
                    continue;
                }
                if (candidate.price - entry.price).abs() > tolerance {
                    continue;
                }
                let ratio = Self::title_similarity(&entry.title, &candidate.title);
                consider(ratio, None, &candidate.title);
            }
        }

        FuzzyScan { hit, best_partial }
    }

    fn store_lookup<T>(&self, result: crate::Result<T>, degraded: &mut bool) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if !*degraded {
                    warn!("product store unreachable, classifying degraded: {}", e);
                }
                *degraded = true;
                None
            }
        }
    }

    fn finish(
        &self,
        confidence: f64,
        matched_record_id: Option<String>,
        method: MatchMethod,
        rationale: impl Into<String>,
        degraded: bool,
    ) -> MatchResult {
        let mut rationale = rationale.into();
        let confidence = if degraded {
            rationale.push_str(" (degraded: one store unreachable)");
            confidence.min(DEGRADED_CEILING)
        } else {
            confidence
        };
        MatchResult::matched(confidence, matched_record_id, method, rationale)
    }
}
