use serde::Deserialize;

/// Root configuration. Loaded from an optional TOML file and environment
/// variables with the prefix `POS_INSIGHTS__`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub products: ProductConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_order_cost")]
    pub order_cost: f64,
    #[serde(default = "default_holding_cost_rate")]
    pub holding_cost_rate: f64,
    #[serde(default = "default_lead_time_days")]
    pub lead_time_days: u32,
    #[serde(default = "default_forecast_window_days")]
    pub forecast_window_days: usize,
    #[serde(default = "default_forecast_horizon_days")]
    pub forecast_horizon_days: usize,
    /// Upper bound for a requested forecast horizon.
    #[serde(default = "default_max_horizon_days")]
    pub max_horizon_days: usize,
    /// Standard deviations of demand held as buffer (~95% service level).
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
    /// Share of average demand used as volatility when fewer than two
    /// demand points exist.
    #[serde(default = "default_fallback_volatility_ratio")]
    pub fallback_volatility_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficConfig {
    #[serde(default = "default_staffing_threshold_ratio")]
    pub staffing_threshold_ratio: f64,
    #[serde(default = "default_transactions_per_staff")]
    pub transactions_per_staff: u32,
    #[serde(default = "default_max_capacity_per_hour")]
    pub default_max_capacity_per_hour: u32,
    #[serde(default = "default_peak_hour_count")]
    pub peak_hour_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
    #[serde(default = "default_product_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_product_limit")]
    pub max_limit: usize,
}

/// Response cache TTLs per analytics domain, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_revenue_ttl")]
    pub revenue_ttl_secs: u64,
    #[serde(default = "default_product_ttl")]
    pub product_ttl_secs: u64,
    #[serde(default = "default_traffic_ttl")]
    pub traffic_ttl_secs: u64,
    #[serde(default = "default_customer_ttl")]
    pub customer_ttl_secs: u64,
    #[serde(default = "default_inventory_ttl")]
    pub inventory_ttl_secs: u64,
    #[serde(default = "default_yearly_ttl")]
    pub yearly_ttl_secs: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

// Default functions
fn default_order_cost() -> f64 {
    10.0
}
fn default_holding_cost_rate() -> f64 {
    0.2
}
fn default_lead_time_days() -> u32 {
    2
}
fn default_forecast_window_days() -> usize {
    7
}
fn default_forecast_horizon_days() -> usize {
    7
}
fn default_safety_factor() -> f64 {
    2.0
}
fn default_max_horizon_days() -> usize {
    90
}
fn default_fallback_volatility_ratio() -> f64 {
    0.2
}
fn default_staffing_threshold_ratio() -> f64 {
    1.5
}
fn default_transactions_per_staff() -> u32 {
    10
}
fn default_max_capacity_per_hour() -> u32 {
    50
}
fn default_peak_hour_count() -> usize {
    3
}
fn default_product_limit() -> usize {
    10
}
fn default_max_product_limit() -> usize {
    100
}
fn default_revenue_ttl() -> u64 {
    300
}
fn default_product_ttl() -> u64 {
    600
}
fn default_traffic_ttl() -> u64 {
    900
}
fn default_customer_ttl() -> u64 {
    1200
}
fn default_inventory_ttl() -> u64 {
    1800
}
fn default_yearly_ttl() -> u64 {
    3600
}
fn default_cache_max_entries() -> usize {
    10_000
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            order_cost: default_order_cost(),
            holding_cost_rate: default_holding_cost_rate(),
            lead_time_days: default_lead_time_days(),
            forecast_window_days: default_forecast_window_days(),
            forecast_horizon_days: default_forecast_horizon_days(),
            max_horizon_days: default_max_horizon_days(),
            safety_factor: default_safety_factor(),
            fallback_volatility_ratio: default_fallback_volatility_ratio(),
        }
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            staffing_threshold_ratio: default_staffing_threshold_ratio(),
            transactions_per_staff: default_transactions_per_staff(),
            default_max_capacity_per_hour: default_max_capacity_per_hour(),
            peak_hour_count: default_peak_hour_count(),
        }
    }
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            default_limit: default_product_limit(),
            max_limit: default_max_product_limit(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            revenue_ttl_secs: default_revenue_ttl(),
            product_ttl_secs: default_product_ttl(),
            traffic_ttl_secs: default_traffic_ttl(),
            customer_ttl_secs: default_customer_ttl(),
            inventory_ttl_secs: default_inventory_ttl(),
            yearly_ttl_secs: default_yearly_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl AppConfig {
    /// Load from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load from an optional TOML file, with environment variables taking
    /// precedence over file values.
    pub fn load_from(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("POS_INSIGHTS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = AppConfig::default();
        assert_eq!(config.inventory.order_cost, 10.0);
        assert_eq!(config.inventory.holding_cost_rate, 0.2);
        assert_eq!(config.inventory.lead_time_days, 2);
        assert_eq!(config.traffic.transactions_per_staff, 10);
        assert_eq!(config.cache.revenue_ttl_secs, 300);
        assert_eq!(config.cache.yearly_ttl_secs, 3600);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"inventory": {"order_cost": 25.0}}"#).unwrap();
        assert_eq!(config.inventory.order_cost, 25.0);
        assert_eq!(config.inventory.holding_cost_rate, 0.2);
        assert_eq!(config.products.default_limit, 10);
    }
}
