//! Cache keys and per-domain freshness windows.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use pos_core::config::CacheConfig;
use serde::Serialize;

/// Analytics family a cached response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDomain {
    Revenue,
    Product,
    Traffic,
    Customer,
    Inventory,
    /// Yearly and seasonal views.
    Yearly,
}

impl CacheDomain {
    pub fn ttl(&self, config: &CacheConfig) -> Duration {
        let secs = match self {
            Self::Revenue => config.revenue_ttl_secs,
            Self::Product => config.product_ttl_secs,
            Self::Traffic => config.traffic_ttl_secs,
            Self::Customer => config.customer_ttl_secs,
            Self::Inventory => config.inventory_ttl_secs,
            Self::Yearly => config.yearly_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

/// `endpoint?name=value&...` with parameters sorted by name, so the same
/// request always renders the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            endpoint: endpoint.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glob match where `*` stands for any run of characters.
    pub fn matches(&self, pattern: &str) -> bool {
        glob_match(pattern.as_bytes(), self.0.as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct CacheKeyBuilder {
    endpoint: String,
    params: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Adds the parameter only when present.
    pub fn opt_param<V: fmt::Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    pub fn build(self) -> CacheKey {
        if self.params.is_empty() {
            return CacheKey(self.endpoint);
        }
        let query: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        CacheKey(format!("{}?{}", self.endpoint, query.join("&")))
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some((c, rest)) => text.first() == Some(c) && glob_match(rest, &text[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_render_sorted() {
        let key = CacheKey::new("revenue/metrics")
            .param("startDate", "2024-03-01")
            .param("endDate", "2024-03-31")
            .opt_param::<u8>("dayOfWeek", None)
            .build();
        assert_eq!(
            key.as_str(),
            "revenue/metrics?endDate=2024-03-31&startDate=2024-03-01"
        );
        assert_eq!(CacheKey::new("inventory").build().as_str(), "inventory");
    }

    #[test]
    fn test_glob_patterns() {
        let key = CacheKey::new("traffic/hourly").param("dayOfWeek", 2).build();
        assert!(key.matches("traffic/*"));
        assert!(key.matches("*dayOfWeek=2"));
        assert!(key.matches("*"));
        assert!(!key.matches("revenue/*"));
        assert!(!key.matches("traffic/hourly"));
    }

    #[test]
    fn test_domain_ttls_follow_config() {
        let config = CacheConfig::default();
        assert_eq!(CacheDomain::Revenue.ttl(&config), Duration::from_secs(300));
        assert_eq!(CacheDomain::Customer.ttl(&config), Duration::from_secs(1200));
        assert_eq!(CacheDomain::Yearly.ttl(&config), Duration::from_secs(3600));
    }
}
