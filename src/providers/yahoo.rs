//! Market data from Yahoo Finance; field coverage modeled on Python's [yfinance].
//!
//! Endpoint families used:
//! - `v8/finance/chart` for price history, its metadata and corporate actions. At most
//!   two charts are requested per entity; the fields share them through the handle's
//!   [`Memo`](crate::Memo);
//! - `v10/finance/quoteSummary` for profile, statements, holders and analyst data
//!   (needs a session cookie plus crumb, acquired once per process);
//! - `ws/fundamentals-timeseries` for the full shares-outstanding series;
//! - `v7/finance/options` and `v1/finance/search` for option expirations and news.
//!
//! [yfinance]: https://github.com/ranaroussi/yfinance/

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;

use crate::config::{ProviderUrls, StockpileConfig};
use crate::document::Field;
use crate::entity::EntityId;
use crate::error::{Result, StockpileError};
use crate::http::HttpClient;
use crate::traits::{Handle, Provider, ProviderKey};

const FIELDS: &[Field] = &[
    Field::Info,
    Field::History,
    Field::HistoryMetadata,
    Field::Actions,
    Field::Dividends,
    Field::Splits,
    Field::CapitalGains,
    Field::IncomeStatement,
    Field::QuarterlyIncomeStatement,
    Field::BalanceSheet,
    Field::QuarterlyBalanceSheet,
    Field::Cashflow,
    Field::QuarterlyCashflow,
    Field::MajorHolders,
    Field::InstitutionalHolders,
    Field::MutualFundHolders,
    Field::InsiderTransactions,
    Field::InsiderPurchases,
    Field::InsiderRoster,
    Field::Recommendations,
    Field::UpgradesDowngrades,
    Field::Options,
    Field::News,
    Field::SharesOutstanding,
];

const RECENT_CHART: &str = "chart:1mo";
const RECENT_CHART_QUERY: &[(&str, &str)] = &[("range", "1mo"), ("interval", "1d")];
const EVENTS_CHART: &str = "chart:max";
const EVENTS_CHART_QUERY: &[(&str, &str)] = &[
    ("range", "max"),
    ("interval", "1mo"),
    ("events", "div,splits,capitalGains"),
];

/// Start of the shares-outstanding series, 2022-01-01T00:00:00Z.
const SHARES_SINCE: i64 = 1_640_995_200;

const INFO_MODULES: &str =
    "assetProfile,summaryProfile,summaryDetail,price,defaultKeyStatistics,financialData";

/// quoteSummary module serving a single field.
fn summary_module(field: Field) -> Option<&'static str> {
    Some(match field {
        Field::IncomeStatement => "incomeStatementHistory",
        Field::QuarterlyIncomeStatement => "incomeStatementHistoryQuarterly",
        Field::BalanceSheet => "balanceSheetHistory",
        Field::QuarterlyBalanceSheet => "balanceSheetHistoryQuarterly",
        Field::Cashflow => "cashflowStatementHistory",
        Field::QuarterlyCashflow => "cashflowStatementHistoryQuarterly",
        Field::MajorHolders => "majorHoldersBreakdown",
        Field::InstitutionalHolders => "institutionOwnership",
        Field::MutualFundHolders => "fundOwnership",
        Field::InsiderTransactions => "insiderTransactions",
        Field::InsiderPurchases => "netSharePurchaseActivity",
        Field::InsiderRoster => "insiderHolders",
        Field::Recommendations => "recommendationTrend",
        Field::UpgradesDowngrades => "upgradeDowngradeHistory",
        _ => return None,
    })
}

/// Kind of corporate action inside a chart's `events` object.
fn event_kind(field: Field) -> Option<&'static str> {
    match field {
        Field::Dividends => Some("dividends"),
        Field::Splits => Some("splits"),
        Field::CapitalGains => Some("capitalGains"),
        _ => None,
    }
}

/// Yahoo Finance market-data provider.
#[derive(Debug)]
pub struct YahooFinance {
    http: HttpClient,
    urls: ProviderUrls,
    crumb: OnceCell<String>,
}

impl YahooFinance {
    pub fn new(http: HttpClient, urls: ProviderUrls) -> Self {
        Self {
            http,
            urls,
            crumb: OnceCell::new(),
        }
    }

    pub fn from_config(config: &StockpileConfig) -> Result<Self> {
        let http = HttpClient::new(
            &config.user_agent,
            config.timeout,
            config.requests_per_second,
        )?;
        Ok(Self::new(http, config.base_urls.clone()))
    }

    async fn chart(&self, symbol: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/v8/finance/chart/{symbol}", self.urls.yahoo_query);
        self.http.get_json(&url, query).await
    }

    /// A chart response, requested at most once per handle.
    async fn memoized_chart(
        &self,
        handle: &Handle,
        key: &str,
        query: &[(&str, &str)],
    ) -> Result<Value> {
        handle
            .memo
            .get_or_try_insert_with(key, || self.chart(&handle.upstream_id, query))
            .await
    }

    async fn shares_outstanding(&self, symbol: &str) -> Result<Value> {
        let url = format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{symbol}",
            self.urls.yahoo_query
        );
        let since = SHARES_SINCE.to_string();
        let until = Utc::now().timestamp().to_string();
        let response: Value = self
            .http
            .get_json(
                &url,
                &[
                    ("symbol", symbol),
                    ("period1", since.as_str()),
                    ("period2", until.as_str()),
                ],
            )
            .await?;
        shares_from_timeseries(&response)
    }

    async fn crumb(&self) -> Result<&str> {
        let crumb = self
            .crumb
            .get_or_try_init(|| async {
                self.http.touch(&self.urls.yahoo_cookie).await?;
                let url = format!("{}/v1/test/getcrumb", self.urls.yahoo_summary);
                let crumb = self.http.get(&url, &[]).await?;
                let crumb = crumb.trim().to_string();
                if crumb.is_empty() || crumb.starts_with('<') || crumb.starts_with('{') {
                    return Err(StockpileError::InvalidResponse(
                        "Yahoo did not hand out a crumb".to_string(),
                    ));
                }
                tracing::debug!("acquired Yahoo crumb");
                Ok::<_, StockpileError>(crumb)
            })
            .await?;
        Ok(crumb.as_str())
    }

    async fn quote_summary(&self, symbol: &str, modules: &str) -> Result<Value> {
        let crumb = self.crumb().await?;
        let url = format!(
            "{}/v10/finance/quoteSummary/{symbol}",
            self.urls.yahoo_summary
        );
        let response: Value = self
            .http
            .get_json(&url, &[("modules", modules), ("crumb", crumb)])
            .await?;
        summary_result(&response)
    }
}

#[async_trait]
impl Provider for YahooFinance {
    fn key(&self) -> ProviderKey {
        ProviderKey::Yahoo
    }

    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    async fn resolve(&self, entity: &EntityId) -> Result<Handle> {
        let response = match self.chart(entity.as_str(), RECENT_CHART_QUERY).await {
            Ok(response) => response,
            Err(StockpileError::NotFound) => {
                return Err(StockpileError::EntityNotFound(entity.to_string()));
            }
            Err(err) => return Err(err),
        };
        chart_result(&response).map_err(|err| match err {
            StockpileError::NotFound => StockpileError::EntityNotFound(entity.to_string()),
            other => other,
        })?;

        let handle = Handle::direct(entity);
        handle.memo.insert(RECENT_CHART, response).await;
        Ok(handle)
    }

    async fn fetch_field(&self, handle: &Handle, field: Field) -> Result<Value> {
        let symbol = handle.upstream_id.as_str();
        tracing::trace!("fetching Yahoo Finance {field} for {symbol}");

        match field {
            Field::Info => self.quote_summary(symbol, INFO_MODULES).await,
            Field::History => {
                let chart = self
                    .memoized_chart(handle, RECENT_CHART, RECENT_CHART_QUERY)
                    .await?;
                history_from_chart(&chart)
            }
            Field::HistoryMetadata => {
                let chart = self
                    .memoized_chart(handle, RECENT_CHART, RECENT_CHART_QUERY)
                    .await?;
                Ok(chart_result(&chart)?
                    .get("meta")
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            Field::Actions | Field::Dividends | Field::Splits | Field::CapitalGains => {
                let chart = self
                    .memoized_chart(handle, EVENTS_CHART, EVENTS_CHART_QUERY)
                    .await?;
                match event_kind(field) {
                    Some(kind) => events_from_chart(&chart, kind),
                    None => actions_from_chart(&chart),
                }
            }
            Field::Options => {
                let crumb = self.crumb().await?;
                let url = format!("{}/v7/finance/options/{symbol}", self.urls.yahoo_query);
                let response: Value = self.http.get_json(&url, &[("crumb", crumb)]).await?;
                option_expirations(&response)
            }
            Field::News => {
                let url = format!("{}/v1/finance/search", self.urls.yahoo_query);
                let response: Value = self
                    .http
                    .get_json(
                        &url,
                        &[("q", symbol), ("quotesCount", "0"), ("newsCount", "10")],
                    )
                    .await?;
                news_from_search(&response)
            }
            Field::SharesOutstanding => self.shares_outstanding(symbol).await,
            other => match summary_module(other) {
                Some(module) => {
                    let result = self.quote_summary(symbol, module).await?;
                    Ok(result.get(module).cloned().unwrap_or(Value::Null))
                }
                None => Err(StockpileError::UnsupportedField {
                    provider: "yahoo",
                    field: other.as_str(),
                }),
            },
        }
    }
}

/// Unwraps `{"<root>": {"result": [..], "error": ..}}`, the envelope shared by the
/// chart, quoteSummary and options endpoints.
fn first_result<'a>(response: &'a Value, root: &str) -> Result<&'a Value> {
    let envelope = response.get(root).ok_or_else(|| {
        StockpileError::InvalidResponse(format!("Missing '{root}' object"))
    })?;

    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if code.eq_ignore_ascii_case("Not Found") {
            return Err(StockpileError::NotFound);
        }
        return Err(StockpileError::Upstream(format!("{code}: {description}")));
    }

    envelope
        .get("result")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .ok_or(StockpileError::NotFound)
}

/// First result of a chart response.
pub fn chart_result(response: &Value) -> Result<&Value> {
    first_result(response, "chart")
}

/// First result of a quoteSummary response, holding one object per module.
pub fn summary_result(response: &Value) -> Result<Value> {
    first_result(response, "quoteSummary").cloned()
}

/// Daily bars of a chart response as columns:
/// `{"timestamp": [..], "open": [..], "high": [..], "low": [..], "close": [..],
/// "volume": [..], "adjclose": [..]}`.
pub fn history_from_chart(response: &Value) -> Result<Value> {
    let result = chart_result(response)?;
    let quote = result
        .pointer("/indicators/quote/0")
        .ok_or_else(|| StockpileError::InvalidResponse("Missing quote indicators".to_string()))?;

    let column = |value: Option<&Value>| value.cloned().unwrap_or_else(|| json!([]));

    Ok(json!({
        "timestamp": column(result.get("timestamp")),
        "open": column(quote.get("open")),
        "high": column(quote.get("high")),
        "low": column(quote.get("low")),
        "close": column(quote.get("close")),
        "volume": column(quote.get("volume")),
        "adjclose": column(result.pointer("/indicators/adjclose/0/adjclose")),
    }))
}

/// One kind of corporate action (`dividends`, `splits`, `capitalGains`) keyed by
/// timestamp, or an empty object when the security has none.
pub fn events_from_chart(response: &Value, kind: &str) -> Result<Value> {
    let result = chart_result(response)?;
    Ok(result
        .pointer(&format!("/events/{kind}"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new())))
}

/// All corporate actions, one object per kind.
pub fn actions_from_chart(response: &Value) -> Result<Value> {
    let mut actions = Map::new();
    for kind in ["dividends", "splits", "capitalGains"] {
        actions.insert(kind.to_string(), events_from_chart(response, kind)?);
    }
    Ok(Value::Object(actions))
}

/// Option expiration dates (unix timestamps) from an options response.
pub fn option_expirations(response: &Value) -> Result<Value> {
    let result = first_result(response, "optionChain")?;
    Ok(result
        .get("expirationDates")
        .cloned()
        .unwrap_or_else(|| json!([])))
}

/// Shares outstanding over time from a fundamentals-timeseries response:
/// `{"timestamp": [..], "shares_out": [..]}`, oldest first. A security Yahoo keeps no
/// share counts for yields empty columns.
pub fn shares_from_timeseries(response: &Value) -> Result<Value> {
    let result = first_result(response, "timeseries")?;
    let column = |name: &str| {
        result
            .get(name)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };
    let shares = column("shares_out");
    let timestamps = if shares.is_empty() {
        Vec::new()
    } else {
        column("timestamp")
    };

    if timestamps.len() != shares.len() {
        return Err(StockpileError::InvalidResponse(format!(
            "{} timestamps but {} share counts",
            timestamps.len(),
            shares.len()
        )));
    }
    Ok(json!({ "timestamp": timestamps, "shares_out": shares }))
}

/// News items from a search response.
pub fn news_from_search(response: &Value) -> Result<Value> {
    response
        .get("news")
        .cloned()
        .ok_or_else(|| StockpileError::InvalidResponse("Missing 'news' array".to_string()))
}
