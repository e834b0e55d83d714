use clap::{Parser, ValueEnum};
use stockpile::ProviderKey;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Randomize the order of jobs in every batch.
    #[arg(long)]
    pub shuffle: bool,

    /// Log at DEBUG level instead of INFO.
    #[arg(long)]
    pub debug: bool,

    /// Providers to fetch from; may be repeated.
    ///
    /// If no providers are given, market data and SEC filings are collected.
    #[arg(short, long = "provider", value_name = "PROVIDER")]
    pub providers: Vec<Provider>,

    /// Drain a single batch and exit instead of polling forever.
    #[arg(long)]
    pub once: bool,

    /// Refetch entities even when today's snapshot is already cached.
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Requested providers, de-duplicated, with the default set applied.
    pub fn provider_keys(&self) -> Vec<ProviderKey> {
        let mut keys: Vec<ProviderKey> = if self.providers.is_empty() {
            vec![ProviderKey::Yahoo, ProviderKey::Sec]
        } else {
            self.providers.iter().copied().map(ProviderKey::from).collect()
        };
        keys.sort();
        keys.dedup();
        keys
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    /// Yahoo Finance market data.
    Yahoo,

    /// SEC EDGAR filings.
    Sec,

    /// Alpha Vantage fundamentals and time series.
    AlphaVantage,
}

impl From<Provider> for ProviderKey {
    fn from(provider: Provider) -> Self {
        match provider {
            Provider::Yahoo => ProviderKey::Yahoo,
            Provider::Sec => ProviderKey::Sec,
            Provider::AlphaVantage => ProviderKey::AlphaVantage,
        }
    }
}
