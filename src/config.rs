use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::{Result, StockpileError};
use super::traits::ProviderKey;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.101 Safari/537.3";

/// Configuration for the whole fetch pipeline.
///
/// Every component takes what it needs from this struct at construction time; nothing
/// reads the process environment after startup.
#[derive(Debug, Clone)]
pub struct StockpileConfig {
    /// Root of all cached output
    pub data_dir: PathBuf,
    /// Number of jobs in flight at once
    pub workers: usize,
    /// Sleep between two batches in worker mode
    pub poll_interval: Duration,
    /// HTTP request timeout, applied to every request
    pub timeout: Duration,
    /// Token bucket size for each HTTP client, in requests per second
    pub requests_per_second: u32,
    /// User agent for market-data and Alpha Vantage requests
    pub user_agent: String,
    /// SEC.gov-required user agent ("AppName contact@example.com")
    pub sec_user_agent: Option<String>,
    /// Alpha Vantage API key
    pub alpha_vantage_api_key: Option<String>,
    /// Minimum delay between two entity fetches against the same provider
    pub min_intervals: HashMap<ProviderKey, Duration>,
    /// Tickers always included in the batch
    pub tickers: Vec<String>,
    /// CSV file with a `Symbol` column listing additional tickers
    pub tickers_file: Option<PathBuf>,
    /// Base URLs of the upstream services
    pub base_urls: ProviderUrls,
}

/// Base URLs of the upstream services.
#[derive(Debug, Clone)]
pub struct ProviderUrls {
    /// Chart, options and search endpoints
    pub yahoo_query: String,
    /// quoteSummary and crumb endpoints
    pub yahoo_summary: String,
    /// Endpoint that hands out the session cookie
    pub yahoo_cookie: String,
    /// Base URL for EDGAR data API
    pub sec_data: String,
    /// Base URL for EDGAR files
    pub sec_files: String,
    /// Base URL for EDGAR archives
    pub sec_archives: String,
    /// Alpha Vantage query endpoint
    pub alpha_vantage: String,
}

impl Default for ProviderUrls {
    fn default() -> Self {
        Self {
            yahoo_query: "https://query1.finance.yahoo.com".to_string(),
            yahoo_summary: "https://query2.finance.yahoo.com".to_string(),
            yahoo_cookie: "https://fc.yahoo.com".to_string(),
            sec_data: "https://data.sec.gov".to_string(),
            sec_files: "https://www.sec.gov/files".to_string(),
            sec_archives: "https://www.sec.gov/Archives/edgar".to_string(),
            alpha_vantage: "https://www.alphavantage.co/query".to_string(),
        }
    }
}

impl Default for StockpileConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            workers: 1,
            poll_interval: Duration::from_secs(24 * 60 * 60),
            timeout: Duration::from_secs(30),
            requests_per_second: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sec_user_agent: None,
            alpha_vantage_api_key: None,
            min_intervals: default_intervals(),
            tickers: vec!["RXT".to_string()],
            tickers_file: None,
            base_urls: ProviderUrls::default(),
        }
    }
}

fn default_intervals() -> HashMap<ProviderKey, Duration> {
    HashMap::from([
        (ProviderKey::Yahoo, Duration::from_secs(2)),
        (ProviderKey::Sec, Duration::from_secs(1)),
        (ProviderKey::AlphaVantage, Duration::from_secs(15)),
    ])
}

impl StockpileConfig {
    /// Reads the configuration from the process environment, honoring a `.env` file.
    ///
    /// Recognized variables: `DATA_DIR` (required), `WORKERS`, `POLL_HOURS`,
    /// `HTTP_TIMEOUT_SECS`, `REQUESTS_PER_SECOND`, `USER_AGENT`, `SEC_USER_AGENT`,
    /// `ALPHA_VANTAGE_API_KEY`, `TICKERS`, `TICKERS_FILE`, `YAHOO_INTERVAL_SECS`,
    /// `SEC_INTERVAL_SECS` and `ALPHA_VANTAGE_INTERVAL_SECS`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// ```rust
    /// # use stockpile::StockpileConfig;
    /// let config = StockpileConfig::from_lookup(|key| match key {
    ///     "DATA_DIR" => Some("/tmp/stockpile".to_string()),
    ///     "WORKERS" => Some("4".to_string()),
    ///     _ => None,
    /// })?;
    /// assert_eq!(config.workers, 4);
    /// # Ok::<(), stockpile::StockpileError>(())
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        config.data_dir = var("DATA_DIR")
            .map(PathBuf::from)
            .ok_or_else(|| StockpileError::ConfigError("DATA_DIR is not set".to_string()))?;

        if let Some(workers) = parse_var::<usize>(&var, "WORKERS")? {
            if workers == 0 {
                return Err(StockpileError::ConfigError(
                    "WORKERS must be greater than zero".to_string(),
                ));
            }
            config.workers = workers;
        }
        if let Some(hours) = parse_var::<u64>(&var, "POLL_HOURS")? {
            let secs = hours.checked_mul(60 * 60).ok_or_else(|| {
                StockpileError::ConfigError(format!("POLL_HOURS={hours} is too large"))
            })?;
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&var, "HTTP_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(rps) = parse_var::<u32>(&var, "REQUESTS_PER_SECOND")? {
            config.requests_per_second = rps;
        }
        if let Some(user_agent) = var("USER_AGENT") {
            config.user_agent = user_agent;
        }
        config.sec_user_agent = var("SEC_USER_AGENT");
        config.alpha_vantage_api_key = var("ALPHA_VANTAGE_API_KEY");

        for (provider, key) in [
            (ProviderKey::Yahoo, "YAHOO_INTERVAL_SECS"),
            (ProviderKey::Sec, "SEC_INTERVAL_SECS"),
            (ProviderKey::AlphaVantage, "ALPHA_VANTAGE_INTERVAL_SECS"),
        ] {
            if let Some(secs) = parse_var::<f64>(&var, key)? {
                let interval = Duration::try_from_secs_f64(secs).map_err(|_| {
                    StockpileError::ConfigError(format!("{key} must be a non-negative number"))
                })?;
                config.min_intervals.insert(provider, interval);
            }
        }

        if let Some(tickers) = var("TICKERS") {
            config.tickers = tickers
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.tickers_file = match var("TICKERS_FILE") {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let fallback = config.data_dir.join("500.csv");
                fallback.exists().then_some(fallback)
            }
        };

        Ok(config)
    }

    /// Checks that everything the given providers need is configured.
    pub fn require(&self, providers: &[ProviderKey]) -> Result<()> {
        if self.workers == 0 {
            return Err(StockpileError::ConfigError(
                "workers must be greater than zero".to_string(),
            ));
        }
        for provider in providers {
            match provider {
                ProviderKey::Sec if self.sec_user_agent.is_none() => {
                    return Err(StockpileError::ConfigError(
                        "SEC_USER_AGENT is not set (SEC.gov requires \"AppName contact@example.com\")"
                            .to_string(),
                    ));
                }
                ProviderKey::AlphaVantage if self.alpha_vantage_api_key.is_none() => {
                    return Err(StockpileError::ConfigError(
                        "ALPHA_VANTAGE_API_KEY is not set".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Cache root of one provider, `{data_dir}/{namespace}`.
    pub fn cache_root(&self, provider: ProviderKey) -> PathBuf {
        self.data_dir.join(provider.namespace())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                StockpileError::ConfigError(format!("{key} has an invalid value: {raw:?}"))
            })
        })
        .transpose()
}
