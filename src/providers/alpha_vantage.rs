//! Fundamentals and price series from Alpha Vantage.
//!
//! Every field is one call to the `query` endpoint with a different `function`. The
//! free tier is limited to a handful of calls per minute; when exceeded, Alpha Vantage
//! still answers `200 OK` with a `Note` or `Information` message instead of data, so
//! payloads are checked before they are stored.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::StockpileConfig;
use crate::document::Field;
use crate::entity::EntityId;
use crate::error::{Result, StockpileError};
use crate::http::HttpClient;
use crate::traits::{Handle, Provider, ProviderKey};

const FIELDS: &[Field] = &[
    Field::Overview,
    Field::GlobalQuote,
    Field::DailySeries,
    Field::WeeklySeries,
    Field::MonthlySeries,
    Field::IncomeStatement,
    Field::BalanceSheet,
    Field::Cashflow,
    Field::Earnings,
];

/// The `function` query parameter serving a field.
fn function_name(field: Field) -> Option<&'static str> {
    Some(match field {
        Field::Overview => "OVERVIEW",
        Field::GlobalQuote => "GLOBAL_QUOTE",
        Field::DailySeries => "TIME_SERIES_DAILY",
        Field::WeeklySeries => "TIME_SERIES_WEEKLY",
        Field::MonthlySeries => "TIME_SERIES_MONTHLY",
        Field::IncomeStatement => "INCOME_STATEMENT",
        Field::BalanceSheet => "BALANCE_SHEET",
        Field::Cashflow => "CASH_FLOW",
        Field::Earnings => "EARNINGS",
        _ => return None,
    })
}

#[derive(Debug)]
pub struct AlphaVantage {
    http: HttpClient,
    url: String,
    api_key: String,
}

impl AlphaVantage {
    pub fn new(http: HttpClient, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &StockpileConfig) -> Result<Self> {
        let api_key = config.alpha_vantage_api_key.as_deref().ok_or_else(|| {
            StockpileError::ConfigError("ALPHA_VANTAGE_API_KEY is not set".to_string())
        })?;
        let http = HttpClient::new(
            &config.user_agent,
            config.timeout,
            config.requests_per_second,
        )?;
        Ok(Self::new(http, &config.base_urls.alpha_vantage, api_key))
    }
}

#[async_trait]
impl Provider for AlphaVantage {
    fn key(&self) -> ProviderKey {
        ProviderKey::AlphaVantage
    }

    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    async fn resolve(&self, entity: &EntityId) -> Result<Handle> {
        Ok(Handle::direct(entity))
    }

    async fn fetch_field(&self, handle: &Handle, field: Field) -> Result<Value> {
        let function = function_name(field).ok_or(StockpileError::UnsupportedField {
            provider: "alpha-vantage",
            field: field.as_str(),
        })?;

        let query = [
            ("function", function),
            ("symbol", handle.upstream_id.as_str()),
            ("apikey", self.api_key.as_str()),
        ];
        let payload: Value = self.http.get_json(&self.url, &query).await?;
        check_payload(payload)
    }
}

/// Turns Alpha Vantage's in-band error messages into errors.
///
/// - `{"Error Message": ...}`: the symbol or function was rejected;
/// - `{"Note": ...}` / `{"Information": ...}`: call frequency or daily quota exceeded;
/// - `{}`: nothing known about the symbol.
pub fn check_payload(payload: Value) -> Result<Value> {
    if let Some(object) = payload.as_object() {
        if object.is_empty() {
            return Err(StockpileError::NotFound);
        }
        if let Some(message) = object.get("Error Message").and_then(Value::as_str) {
            return Err(StockpileError::Upstream(message.to_string()));
        }
        let notice = object
            .get("Note")
            .or_else(|| object.get("Information"))
            .and_then(Value::as_str);
        if let Some(message) = notice.filter(|_| object.len() == 1) {
            tracing::warn!("Alpha Vantage quota message: {message}");
            return Err(StockpileError::RateLimitExceeded);
        }
    }
    Ok(payload)
}
