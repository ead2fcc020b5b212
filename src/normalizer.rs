use regex::Regex;
use std::collections::HashMap;
use url::Url;

use crate::config::ScoutConfig;

/// Canonicalizes catalog URLs for stable comparison.
///
/// Total and idempotent: `normalize(normalize(u, r), r) == normalize(u, r)`
/// for every input, and unparseable input normalizes to itself. Per-retailer
/// stable-identifier extraction comes from configuration, compiled once here.
#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    stable_id_patterns: HashMap<String, Regex>,
}

impl UrlNormalizer {
    /// Compile per-retailer rules. Invalid patterns were already rejected by
    /// config validation; any that slip through are ignored rather than
    /// turning normalization into a fallible operation.
    pub fn from_config(config: &ScoutConfig) -> Self {
        let stable_id_patterns = config
            .retailers
            .iter()
            .filter_map(|(retailer, policy)| {
                let pattern = policy.url_rules.stable_id_pattern.as_deref()?;
                Regex::new(pattern).ok().map(|re| (retailer.clone(), re))
            })
            .collect();
        Self { stable_id_patterns }
    }

    pub fn empty() -> Self {
        Self {
            stable_id_patterns: HashMap::new(),
        }
    }

    pub fn normalize(&self, url: &str, retailer: &str) -> String {
        let trimmed = url.trim();

        let Ok(mut parsed) = Url::parse(trimmed) else {
            return trimmed.to_string();
        };
        if parsed.host_str().is_none() {
            return trimmed.to_string();
        }

        parsed.set_query(None);
        parsed.set_fragment(None);

        if let Some(re) = self.stable_id_patterns.get(retailer) {
            if let Some(captures) = re.captures(parsed.path()) {
                if let Some(stable) = captures.get(1) {
                    let path = stable.as_str().to_string();
                    parsed.set_path(&path);
                }
            }
        }

        let mut out = parsed.to_string();
        while out.ends_with('/') && !out.ends_with("//") {
            out.pop();
        }
        out
    }
}
