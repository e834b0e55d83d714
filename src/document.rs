//! Result documents: the per-entity, per-day snapshot with partial-failure markers.
//!
//! Every field a provider exposes is represented, successful or not. A field that
//! failed to fetch keeps its slot and holds a [`FieldError`], which is persisted as an
//! error marker string:
//!
//! ```text
//! {
//!   "history": "ERROR[request]: HTTP request failed: operation timed out",
//!   "info": { "longName": "Apple Inc.", ... }
//! }
//! ```
//!
//! Consumers can therefore detect partial results without a schema change, and the
//! in-memory representation stays a tagged `Ok(value) | Err(reason)` per field.
//!
//! A successful string value that would itself read as a marker is written with one
//! extra leading backslash, which is removed again on load.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::StockpileError;

const MARKER_PREFIX: &str = "ERROR[";
const MARKER_SEPARATOR: &str = "]: ";
const MARKER_ESCAPE: char = '\\';

/// Every field any provider can fetch.
///
/// Providers expose a fixed, ordered subset of these through
/// [`Provider::fields`](crate::Provider::fields). The wire name (see [`Field::as_str`])
/// is the key used in persisted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    // market data
    Info,
    History,
    HistoryMetadata,
    Actions,
    Dividends,
    Splits,
    CapitalGains,
    IncomeStatement,
    QuarterlyIncomeStatement,
    BalanceSheet,
    QuarterlyBalanceSheet,
    Cashflow,
    QuarterlyCashflow,
    MajorHolders,
    InstitutionalHolders,
    MutualFundHolders,
    InsiderTransactions,
    InsiderPurchases,
    InsiderRoster,
    Recommendations,
    UpgradesDowngrades,
    Options,
    News,
    SharesOutstanding,
    // filings
    Submissions,
    CompanyFacts,
    Form10K,
    Form10Q,
    Form13FHR,
    FilingDocuments,
    // fundamentals & time series
    Overview,
    GlobalQuote,
    DailySeries,
    WeeklySeries,
    MonthlySeries,
    Earnings,
}

impl Field {
    pub const ALL: &'static [Field] = &[
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
        Field::Submissions,
        Field::CompanyFacts,
        Field::Form10K,
        Field::Form10Q,
        Field::Form13FHR,
        Field::FilingDocuments,
        Field::Overview,
        Field::GlobalQuote,
        Field::DailySeries,
        Field::WeeklySeries,
        Field::MonthlySeries,
        Field::Earnings,
    ];

    /// Stable snake_case name used as the key in persisted documents.
    pub const fn as_str(self) -> &'static str {
        match self {
            Field::Info => "info",
            Field::History => "history",
            Field::HistoryMetadata => "history_metadata",
            Field::Actions => "actions",
            Field::Dividends => "dividends",
            Field::Splits => "splits",
            Field::CapitalGains => "capital_gains",
            Field::IncomeStatement => "income_stmt",
            Field::QuarterlyIncomeStatement => "quarterly_income_stmt",
            Field::BalanceSheet => "balance_sheet",
            Field::QuarterlyBalanceSheet => "quarterly_balance_sheet",
            Field::Cashflow => "cashflow",
            Field::QuarterlyCashflow => "quarterly_cashflow",
            Field::MajorHolders => "major_holders",
            Field::InstitutionalHolders => "institutional_holders",
            Field::MutualFundHolders => "mutualfund_holders",
            Field::InsiderTransactions => "insider_transactions",
            Field::InsiderPurchases => "insider_purchases",
            Field::InsiderRoster => "insider_roster_holders",
            Field::Recommendations => "recommendations",
            Field::UpgradesDowngrades => "upgrades_downgrades",
            Field::Options => "options",
            Field::News => "news",
            Field::SharesOutstanding => "shares_full",
            Field::Submissions => "submissions",
            Field::CompanyFacts => "company_facts",
            Field::Form10K => "10-K",
            Field::Form10Q => "10-Q",
            Field::Form13FHR => "13F-HR",
            Field::FilingDocuments => "filing_documents",
            Field::Overview => "overview",
            Field::GlobalQuote => "global_quote",
            Field::DailySeries => "time_series_daily",
            Field::WeeklySeries => "time_series_weekly",
            Field::MonthlySeries => "time_series_monthly",
            Field::Earnings => "earnings",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = StockpileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| StockpileError::InvalidResponse(format!("Unknown field '{s}'")))
    }
}

/// Why a field (or a whole entity) could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldErrorKind {
    /// Transport failure: connection, timeout, TLS.
    Request,
    /// The upstream has no such resource (HTTP 404).
    NotFound,
    /// The upstream kept throttling us.
    RateLimited,
    /// The upstream answered with something we could not interpret.
    InvalidResponse,
    /// The upstream answered with an explicit error payload.
    Upstream,
    /// The entity itself could not be resolved, so the field was never attempted.
    Unresolved,
    /// The provider does not serve this field.
    Unsupported,
    Internal,
}

impl FieldErrorKind {
    const ALL: &'static [FieldErrorKind] = &[
        FieldErrorKind::Request,
        FieldErrorKind::NotFound,
        FieldErrorKind::RateLimited,
        FieldErrorKind::InvalidResponse,
        FieldErrorKind::Upstream,
        FieldErrorKind::Unresolved,
        FieldErrorKind::Unsupported,
        FieldErrorKind::Internal,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            FieldErrorKind::Request => "request",
            FieldErrorKind::NotFound => "not_found",
            FieldErrorKind::RateLimited => "rate_limited",
            FieldErrorKind::InvalidResponse => "invalid_response",
            FieldErrorKind::Upstream => "upstream",
            FieldErrorKind::Unresolved => "unresolved",
            FieldErrorKind::Unsupported => "unsupported",
            FieldErrorKind::Internal => "internal",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }
}

impl From<&StockpileError> for FieldErrorKind {
    fn from(error: &StockpileError) -> Self {
        match error {
            StockpileError::RequestError(_) => FieldErrorKind::Request,
            StockpileError::NotFound => FieldErrorKind::NotFound,
            StockpileError::RateLimitExceeded => FieldErrorKind::RateLimited,
            StockpileError::InvalidResponse(_)
            | StockpileError::JsonError(_)
            | StockpileError::UnexpectedContentType { .. } => FieldErrorKind::InvalidResponse,
            StockpileError::Upstream(_) => FieldErrorKind::Upstream,
            StockpileError::EntityNotFound(_) | StockpileError::InvalidEntity(_) => {
                FieldErrorKind::Unresolved
            }
            StockpileError::UnsupportedField { .. } => FieldErrorKind::Unsupported,
            _ => FieldErrorKind::Internal,
        }
    }
}

/// A failed field: the kind of failure and the stringified upstream error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn new(kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The string persisted in place of the field's value.
    pub fn marker(&self) -> String {
        format!(
            "{MARKER_PREFIX}{}{MARKER_SEPARATOR}{}",
            self.kind.as_str(),
            self.message
        )
    }

    /// Parses a persisted error marker. Strings that are not markers yield `None`.
    pub fn from_marker(s: &str) -> Option<Self> {
        let rest = s.strip_prefix(MARKER_PREFIX)?;
        let (kind, message) = rest.split_once(MARKER_SEPARATOR)?;
        Some(Self::new(FieldErrorKind::parse(kind)?, message))
    }
}

/// True for strings that would be taken for a marker once their leading escapes are
/// removed.
fn shadows_marker(s: &str) -> bool {
    FieldError::from_marker(s.trim_start_matches(MARKER_ESCAPE)).is_some()
}

impl From<&StockpileError> for FieldError {
    fn from(error: &StockpileError) -> Self {
        Self::new(FieldErrorKind::from(error), error.to_string())
    }
}

impl From<StockpileError> for FieldError {
    fn from(error: StockpileError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marker())
    }
}

/// The value slot of one field in a [`ResultDocument`].
pub type FieldOutcome = std::result::Result<Value, FieldError>;

/// Per-entity snapshot mapping field names to values or error markers.
///
/// Keys are kept as wire names rather than [`Field`] so that documents written by a
/// build with a different field set still load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDocument {
    fields: BTreeMap<String, FieldOutcome>,
}

impl ResultDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// A document in which every field failed for the same reason, used when the
    /// entity cannot be resolved upstream at all.
    pub fn all_failed(fields: &[Field], error: &FieldError) -> Self {
        let mut document = Self::new();
        for field in fields {
            document.insert(*field, Err(error.clone()));
        }
        document
    }

    pub fn insert(&mut self, field: Field, outcome: FieldOutcome) {
        self.fields.insert(field.as_str().to_string(), outcome);
    }

    pub fn get(&self, field: Field) -> Option<&FieldOutcome> {
        self.fields.get(field.as_str())
    }

    /// Successful value of a field, if it was fetched.
    pub fn value(&self, field: Field) -> Option<&Value> {
        self.get(field).and_then(|outcome| outcome.as_ref().ok())
    }

    /// Error of a field, if it failed.
    pub fn error(&self, field: Field) -> Option<&FieldError> {
        self.get(field).and_then(|outcome| outcome.as_ref().err())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldOutcome)> {
        self.fields.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.fields.values().filter(|outcome| outcome.is_err()).count()
    }

    /// True when the document holds at least one field and none of them succeeded.
    pub fn is_total_failure(&self) -> bool {
        !self.is_empty() && self.failures() == self.len()
    }
}

impl Serialize for ResultDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, outcome) in &self.fields {
            match outcome {
                Ok(Value::String(text)) if shadows_marker(text) => {
                    map.serialize_entry(name, &format!("{MARKER_ESCAPE}{text}"))?
                }
                Ok(value) => map.serialize_entry(name, value)?,
                Err(error) => map.serialize_entry(name, &error.marker())?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let fields = raw
            .into_iter()
            .map(|(name, value)| (name, outcome_from_value(value)))
            .collect();
        Ok(Self { fields })
    }
}

fn outcome_from_value(value: Value) -> FieldOutcome {
    let Value::String(text) = value else {
        return Ok(value);
    };
    match text.strip_prefix(MARKER_ESCAPE) {
        Some(escaped) if shadows_marker(escaped) => {
            return Ok(Value::String(escaped.to_string()));
        }
        _ => {}
    }
    match FieldError::from_marker(&text) {
        Some(error) => Err(error),
        None => Ok(Value::String(text)),
    }
}
