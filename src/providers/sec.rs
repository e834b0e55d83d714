//! SEC EDGAR filings.
//!
//! Tickers are resolved to a Central Index Key (CIK) through the SEC's
//! `company_tickers.json`, fetched once per process. Every field is then addressed by
//! the zero-padded CIK:
//! - `submissions`: the company's submissions document (`/submissions/CIK##########.json`);
//! - `company_facts`: every XBRL fact the company reported;
//! - `10-K`, `10-Q`, `13F-HR`: the most recent filings of that form, amendments
//!   included, each with a link to its primary document in the archives;
//! - `filing_documents`: the primary documents of those same filings, downloaded.
//!
//! The submissions document backs five of these fields and is requested once per
//! entity through the handle's [`Memo`](crate::Memo).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::OnceCell;

use crate::config::{ProviderUrls, StockpileConfig};
use crate::document::Field;
use crate::entity::EntityId;
use crate::error::{Result, StockpileError};
use crate::http::HttpClient;
use crate::traits::{Handle, Provider, ProviderKey};

const FIELDS: &[Field] = &[
    Field::Submissions,
    Field::CompanyFacts,
    Field::Form10K,
    Field::Form10Q,
    Field::Form13FHR,
    Field::FilingDocuments,
];

/// Filings kept per form.
pub const FILING_LIMIT: usize = 4;

/// Forms whose primary documents are downloaded for `filing_documents`.
pub const DOCUMENT_FORMS: &[&str] = &["10-K", "10-Q", "13F-HR"];

const SUBMISSIONS: &str = "submissions";

/// Mapping between stock ticker symbols and company CIKs.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyTicker {
    #[serde(rename = "cik_str")]
    pub cik: u64,
    pub ticker: String,
    pub title: String,
}

/// Column-oriented `filings.recent` block of a submissions document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFilings {
    pub accession_number: Vec<String>,
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub report_date: Vec<String>,
    pub form: Vec<String>,
    #[serde(default)]
    pub primary_document: Vec<String>,
}

/// One filing as stored in a result document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingRef {
    pub accession_number: String,
    pub form: String,
    pub filing_date: String,
    pub report_date: Option<String>,
    pub primary_document: Option<String>,
    pub url: String,
}

/// A filing together with the text of its primary document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilingDocument {
    #[serde(flatten)]
    pub filing: FilingRef,
    pub content: String,
}

/// SEC EDGAR filings provider.
#[derive(Debug)]
pub struct SecEdgar {
    http: HttpClient,
    urls: ProviderUrls,
    tickers: OnceCell<HashMap<String, u64>>,
}

impl SecEdgar {
    pub fn new(http: HttpClient, urls: ProviderUrls) -> Self {
        Self {
            http,
            urls,
            tickers: OnceCell::new(),
        }
    }

    pub fn from_config(config: &StockpileConfig) -> Result<Self> {
        let user_agent = config.sec_user_agent.as_deref().ok_or_else(|| {
            StockpileError::ConfigError("SEC_USER_AGENT is not set".to_string())
        })?;
        let http = HttpClient::new(user_agent, config.timeout, config.requests_per_second)?;
        Ok(Self::new(http, config.base_urls.clone()))
    }

    async fn tickers(&self) -> Result<&HashMap<String, u64>> {
        self.tickers
            .get_or_try_init(|| async {
                let url = format!("{}/company_tickers.json", self.urls.sec_files);
                let raw: HashMap<String, CompanyTicker> = self.http.get_json(&url, &[]).await?;
                tracing::debug!("loaded {} SEC tickers", raw.len());
                Ok::<_, StockpileError>(ticker_index(raw.into_values()))
            })
            .await
    }

    /// CIK of a ticker, per the SEC's ticker list.
    pub async fn company_cik(&self, ticker: &str) -> Result<u64> {
        self.tickers()
            .await?
            .get(&ticker.to_uppercase())
            .copied()
            .ok_or_else(|| StockpileError::EntityNotFound(ticker.to_string()))
    }

    async fn submissions(&self, handle: &Handle) -> Result<Value> {
        let url = format!(
            "{}/submissions/CIK{}.json",
            self.urls.sec_data, handle.upstream_id
        );
        handle
            .memo
            .get_or_try_insert_with(SUBMISSIONS, || self.http.get_json(&url, &[]))
            .await
    }

    async fn filing_documents(&self, handle: &Handle) -> Result<Value> {
        let submissions = self.submissions(handle).await?;
        let filings = documents_to_fetch(&submissions, FILING_LIMIT, &self.urls.sec_archives)?;
        tracing::debug!(
            "downloading {} primary documents for {}",
            filings.len(),
            handle.entity
        );

        let mut documents = Vec::with_capacity(filings.len());
        for filing in filings {
            let content = self.http.get(&filing.url, &[]).await?;
            documents.push(FilingDocument { filing, content });
        }
        documents_by_form(documents)
    }
}

#[async_trait]
impl Provider for SecEdgar {
    fn key(&self) -> ProviderKey {
        ProviderKey::Sec
    }

    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    async fn resolve(&self, entity: &EntityId) -> Result<Handle> {
        let cik = self.company_cik(entity.as_str()).await?;
        Ok(Handle::new(entity.clone(), format_cik(cik)))
    }

    async fn fetch_field(&self, handle: &Handle, field: Field) -> Result<Value> {
        let cik = handle.upstream_id.as_str();
        tracing::trace!("fetching SEC {field} for {} (CIK {cik})", handle.entity);

        match field {
            Field::Submissions => self.submissions(handle).await,
            Field::CompanyFacts => {
                let url = format!(
                    "{}/api/xbrl/companyfacts/CIK{cik}.json",
                    self.urls.sec_data
                );
                self.http.get_json(&url, &[]).await
            }
            Field::Form10K | Field::Form10Q | Field::Form13FHR => {
                let submissions = self.submissions(handle).await?;
                let filings = recent_filings(
                    &submissions,
                    field.as_str(),
                    FILING_LIMIT,
                    &self.urls.sec_archives,
                )?;
                Ok(serde_json::to_value(filings)?)
            }
            Field::FilingDocuments => self.filing_documents(handle).await,
            other => Err(StockpileError::UnsupportedField {
                provider: "sec",
                field: other.as_str(),
            }),
        }
    }
}

/// Ticker → CIK lookup table, keyed by uppercase ticker.
pub fn ticker_index(tickers: impl IntoIterator<Item = CompanyTicker>) -> HashMap<String, u64> {
    tickers
        .into_iter()
        .map(|t| (t.ticker.to_uppercase(), t.cik))
        .collect()
}

/// Ten-digit, zero-padded CIK as used in EDGAR data URLs.
pub fn format_cik(cik: u64) -> String {
    format!("{cik:010}")
}

/// The `limit` most recent filings of `form` (and its `/A` amendments) in a
/// submissions document, newest first.
pub fn recent_filings(
    submissions: &Value,
    form: &str,
    limit: usize,
    archives_url: &str,
) -> Result<Vec<FilingRef>> {
    let cik: u64 = submissions
        .get("cik")
        .and_then(|c| match c {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        })
        .ok_or_else(|| StockpileError::InvalidResponse("Missing 'cik'".to_string()))?;

    let recent: RecentFilings = submissions
        .pointer("/filings/recent")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .ok_or_else(|| StockpileError::InvalidResponse("Missing 'filings.recent'".to_string()))?;

    let amendment = format!("{form}/A");
    let filings = (0..recent.accession_number.len())
        .filter(|&idx| {
            recent
                .form
                .get(idx)
                .is_some_and(|f| f == form || *f == amendment)
        })
        .take(limit)
        .map(|idx| {
            let accession_number = recent.accession_number[idx].clone();
            let primary_document = recent
                .primary_document
                .get(idx)
                .filter(|doc| !doc.is_empty())
                .cloned();
            let folder = format!(
                "{archives_url}/data/{cik}/{}",
                accession_number.replace('-', "")
            );
            let url = match &primary_document {
                Some(doc) => format!("{folder}/{doc}"),
                None => format!("{folder}/{accession_number}.txt"),
            };

            FilingRef {
                form: recent.form[idx].clone(),
                filing_date: recent.filing_date.get(idx).cloned().unwrap_or_default(),
                report_date: recent
                    .report_date
                    .get(idx)
                    .filter(|date| !date.is_empty())
                    .cloned(),
                primary_document,
                url,
                accession_number,
            }
        })
        .collect();

    Ok(filings)
}

/// Recent filings of every form in [`DOCUMENT_FORMS`], `limit` per form with
/// amendments counted, in form order.
pub fn documents_to_fetch(
    submissions: &Value,
    limit: usize,
    archives_url: &str,
) -> Result<Vec<FilingRef>> {
    let mut filings = Vec::new();
    for form in DOCUMENT_FORMS {
        filings.extend(recent_filings(submissions, form, limit, archives_url)?);
    }
    Ok(filings)
}

/// Groups downloaded documents under their base form (`10-Q/A` goes with `10-Q`).
/// Every form in [`DOCUMENT_FORMS`] gets a key, even without filings.
pub fn documents_by_form(documents: Vec<FilingDocument>) -> Result<Value> {
    let mut grouped: BTreeMap<&str, Vec<FilingDocument>> =
        DOCUMENT_FORMS.iter().map(|form| (*form, Vec::new())).collect();
    for document in documents {
        let base = document
            .filing
            .form
            .strip_suffix("/A")
            .unwrap_or(&document.filing.form);
        let form = DOCUMENT_FORMS
            .iter()
            .copied()
            .find(|form| *form == base)
            .ok_or_else(|| {
                StockpileError::InvalidResponse(format!(
                    "unexpected form {}",
                    document.filing.form
                ))
            })?;
        grouped.entry(form).or_default().push(document);
    }
    Ok(serde_json::to_value(grouped)?)
}
