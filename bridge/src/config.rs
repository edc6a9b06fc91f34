//! Bridge configuration.
//!
//! Configuration values are provided by the embedding application; the
//! defaults match the App Store flavour of the backend.

use billing_bridge_core::ProductKind;
use billing_bridge_runtime::StoreConfig;

/// Default subscription-management deep link.
pub const DEFAULT_MANAGEMENT_URL: &str = "itms-apps://apps.apple.com/account/subscriptions";

/// Default platform label reported in purchase results.
pub const DEFAULT_PLATFORM: &str = "iOS";

/// Default currency symbol when the storefront locale has none.
pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";

/// Bridge configuration.
///
/// # Example
///
/// ```
/// use billing_bridge::BridgeConfig;
/// use billing_bridge_core::ProductKind;
///
/// let config = BridgeConfig::new()
///     .with_platform("android")
///     .with_default_product_kind(ProductKind::Subs);
/// assert_eq!(config.platform, "android");
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Platform label reported in every `PurchaseResultView`.
    ///
    /// Default: `"iOS"`
    pub platform: String,

    /// URL opened by `manage subscriptions`.
    pub management_url: String,

    /// Product kind used when a catalog load does not name one.
    ///
    /// Default: `inapp`
    pub default_product_kind: ProductKind,

    /// Currency symbol used when the storefront locale has none.
    ///
    /// Default: `"$"`
    pub fallback_currency_symbol: String,

    /// Runtime configuration for the underlying store.
    pub store: StoreConfig,
}

impl BridgeConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the platform label.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Set the subscription-management URL.
    #[must_use]
    pub fn with_management_url(mut self, url: impl Into<String>) -> Self {
        self.management_url = url.into();
        self
    }

    /// Set the default product kind.
    #[must_use]
    pub const fn with_default_product_kind(mut self, kind: ProductKind) -> Self {
        self.default_product_kind = kind;
        self
    }

    /// Set the fallback currency symbol.
    #[must_use]
    pub fn with_fallback_currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.fallback_currency_symbol = symbol.into();
        self
    }

    /// Set the store runtime configuration.
    #[must_use]
    pub fn with_store_config(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            management_url: DEFAULT_MANAGEMENT_URL.to_string(),
            default_product_kind: ProductKind::InApp,
            fallback_currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
            store: StoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.platform, "iOS");
        assert_eq!(config.management_url, DEFAULT_MANAGEMENT_URL);
        assert_eq!(config.default_product_kind, ProductKind::InApp);
        assert_eq!(config.fallback_currency_symbol, "$");
    }

    #[test]
    fn test_builders() {
        let config = BridgeConfig::new()
            .with_management_url("https://play.google.com/store/account/subscriptions")
            .with_fallback_currency_symbol("€")
            .with_store_config(StoreConfig::default().with_shutdown_timeout(Duration::from_secs(2)));

        assert!(config.management_url.starts_with("https://"));
        assert_eq!(config.fallback_currency_symbol, "€");
        assert_eq!(config.store.default_shutdown_timeout, Duration::from_secs(2));
    }
}
