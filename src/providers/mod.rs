//! Concrete upstream providers.
//!
//! Each provider is behind a cargo feature of the same name, all enabled by default.

use std::sync::Arc;

use super::config::StockpileConfig;
use super::error::{Result, StockpileError};
use super::traits::{Provider, ProviderKey};

#[cfg(feature = "alpha-vantage")]
pub mod alpha_vantage;
#[cfg(feature = "sec")]
pub mod sec;
#[cfg(feature = "yahoo")]
pub mod yahoo;

/// Builds the provider for `key` from the configuration.
///
/// # Errors
///
/// `StockpileError::ConfigError` when the provider is missing required settings (an
/// API key, a user agent) or was compiled out.
pub fn build(key: ProviderKey, config: &StockpileConfig) -> Result<Arc<dyn Provider>> {
    config.require(&[key])?;

    match key {
        #[cfg(feature = "yahoo")]
        ProviderKey::Yahoo => Ok(Arc::new(yahoo::YahooFinance::from_config(config)?)),
        #[cfg(feature = "sec")]
        ProviderKey::Sec => Ok(Arc::new(sec::SecEdgar::from_config(config)?)),
        #[cfg(feature = "alpha-vantage")]
        ProviderKey::AlphaVantage => Ok(Arc::new(alpha_vantage::AlphaVantage::from_config(
            config,
        )?)),
        #[allow(unreachable_patterns)]
        other => Err(StockpileError::ConfigError(format!(
            "provider {other} is not compiled in"
        ))),
    }
}
