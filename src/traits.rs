//! The provider seam.
//!
//! Each upstream data source implements [`Provider`]. The orchestrator only ever talks
//! to a provider through this trait, which keeps it testable with in-memory fakes and
//! lets the binary mix market data, filings and fundamentals in one batch.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::document::Field;
use super::entity::EntityId;
use super::error::Result;

/// Identifies an upstream provider. Rate limits and cache namespaces are tracked
/// per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKey {
    /// Market data (quotes, history, statements, holders, options, news).
    Yahoo,
    /// SEC EDGAR filings.
    Sec,
    /// Alpha Vantage fundamentals and time series.
    AlphaVantage,
}

impl ProviderKey {
    pub const ALL: &'static [ProviderKey] =
        &[ProviderKey::Yahoo, ProviderKey::Sec, ProviderKey::AlphaVantage];

    pub const fn as_str(self) -> &'static str {
        match self {
            ProviderKey::Yahoo => "yahoo",
            ProviderKey::Sec => "sec",
            ProviderKey::AlphaVantage => "alpha-vantage",
        }
    }

    /// Sub-directory of the data directory holding this provider's cache.
    pub const fn namespace(self) -> &'static str {
        match self {
            ProviderKey::Yahoo => "market",
            ProviderKey::Sec => "sec",
            ProviderKey::AlphaVantage => "alpha-vantage",
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream responses shared by the field fetches of one resolved entity.
///
/// Several fields are often cut from the same response (a price chart serves history,
/// its metadata and every corporate action). Successful responses are kept here under
/// a provider-chosen key; failures are not, so each field still makes its own attempt.
#[derive(Debug, Clone, Default)]
pub struct Memo {
    responses: Arc<Mutex<HashMap<String, Value>>>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the response stored under `key`, calling `fetch` to obtain it on first
    /// use. Concurrent callers for the same memo wait for the one in flight.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let mut responses = self.responses.lock().await;
        if let Some(response) = responses.get(key) {
            return Ok(response.clone());
        }
        let response = fetch().await?;
        responses.insert(key.to_string(), response.clone());
        Ok(response)
    }

    pub async fn insert(&self, key: &str, response: Value) {
        self.responses.lock().await.insert(key.to_string(), response);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.responses.lock().await.contains_key(key)
    }
}

/// A resolved upstream reference for one entity.
///
/// `upstream_id` is whatever the provider needs to address the entity: the symbol
/// itself for market data, a zero-padded CIK for SEC EDGAR. `memo` lives as long as
/// the handle, i.e. one entity fetch; it takes no part in equality.
#[derive(Debug, Clone)]
pub struct Handle {
    pub entity: EntityId,
    pub upstream_id: String,
    pub memo: Memo,
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.upstream_id == other.upstream_id
    }
}

impl Eq for Handle {}

impl Handle {
    pub fn new(entity: EntityId, upstream_id: impl Into<String>) -> Self {
        Self {
            entity,
            upstream_id: upstream_id.into(),
            memo: Memo::new(),
        }
    }

    /// A handle whose upstream id is the entity id itself.
    pub fn direct(entity: &EntityId) -> Self {
        Self::new(entity.clone(), entity.as_str())
    }
}

/// Fetches one entity's data from an external source, one field at a time.
///
/// Field fetches are independent: implementations must not let the failure of one
/// field affect another, and must not retry failed fields themselves.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Which provider this is, for rate limiting and cache placement.
    fn key(&self) -> ProviderKey;

    /// Human readable provider name.
    fn name(&self) -> &str;

    /// The fixed, ordered set of fields this provider fetches for every entity.
    fn fields(&self) -> &'static [Field];

    /// Constructs the upstream handle for an entity. An error here means no field
    /// can be fetched for the entity at all.
    async fn resolve(&self, entity: &EntityId) -> Result<Handle>;

    /// Fetches a single field for a resolved entity.
    async fn fetch_field(&self, handle: &Handle, field: Field) -> Result<Value>;
}
