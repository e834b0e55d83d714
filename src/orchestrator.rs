//! Cache-first fetching of one entity from one provider.

use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

use super::cache::FileCache;
use super::document::{FieldError, FieldErrorKind, ResultDocument};
use super::entity::EntityId;
use super::error::Result;
use super::limiter::RateLimiter;
use super::traits::Provider;

type EntityLocks = std::sync::Mutex<HashMap<EntityId, Arc<AsyncMutex<()>>>>;

/// Where a fetched document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Today's snapshot was already cached; no provider call was made.
    Cache,
    /// Freshly assembled from the provider and persisted at the given path.
    Provider(PathBuf),
}

/// A document together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub document: ResultDocument,
    pub source: Source,
}

impl Fetched {
    pub fn is_cache_hit(&self) -> bool {
        self.source == Source::Cache
    }
}

/// Fetches entities from a single provider, at most once per entity per day.
///
/// For each call the orchestrator:
///
/// 1. unless forced, returns today's cached snapshot if there is one, without touching
///    the provider;
/// 2. otherwise waits for the provider's rate-limit turn, resolves the entity and
///    fetches every field in the provider's fixed order, recording failed fields as
///    error markers;
/// 3. persists the document and returns it.
///
/// An entity that cannot be resolved yields a document in which every field carries an
/// `unresolved` marker; it is persisted like any other so that the batch moves on and
/// the entity is retried the next day. Only cache write failures are returned as
/// errors.
///
/// Concurrent fetches of the same entity through the same orchestrator are serialized,
/// so the second one finds the first one's snapshot in the cache. Separate processes
/// sharing a data directory may still fetch the same entity twice on the same day.
#[derive(Debug)]
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    cache: FileCache,
    limiter: Arc<RateLimiter>,
    in_flight: EntityLocks,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, cache: FileCache, limiter: Arc<RateLimiter>) -> Self {
        Self {
            provider,
            cache,
            limiter,
            in_flight: EntityLocks::default(),
        }
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    /// Fetches today's (local date) snapshot of an entity.
    pub async fn fetch(&self, entity: &EntityId, force: bool) -> Result<ResultDocument> {
        self.fetch_as_of(entity, Local::now().date_naive(), force)
            .await
    }

    /// Fetches the snapshot of an entity for the given day.
    pub async fn fetch_as_of(
        &self,
        entity: &EntityId,
        as_of: NaiveDate,
        force: bool,
    ) -> Result<ResultDocument> {
        Ok(self.fetch_detailed(entity, as_of, force).await?.document)
    }

    /// Like [`fetch_as_of`](Self::fetch_as_of), also reporting whether the cache
    /// answered.
    pub async fn fetch_detailed(
        &self,
        entity: &EntityId,
        as_of: NaiveDate,
        force: bool,
    ) -> Result<Fetched> {
        let lock = self.entity_lock(entity);
        let result = {
            let _guard = lock.lock().await;
            self.fetch_locked(entity, as_of, force).await
        };
        self.release_entity_lock(entity, lock);
        result
    }

    async fn fetch_locked(
        &self,
        entity: &EntityId,
        as_of: NaiveDate,
        force: bool,
    ) -> Result<Fetched> {
        if !force {
            if let Some(document) = self.cache.lookup(entity, as_of).await {
                tracing::debug!(
                    "found {} data for {entity} on {as_of}",
                    self.provider.name()
                );
                return Ok(Fetched {
                    document,
                    source: Source::Cache,
                });
            }
        }

        tracing::info!("fetching {} data for {entity}", self.provider.name());
        let document = self.assemble(entity).await;
        let path = self.cache.store(entity, as_of, &document).await?;

        Ok(Fetched {
            document,
            source: Source::Provider(path),
        })
    }

    async fn assemble(&self, entity: &EntityId) -> ResultDocument {
        let provider = self.provider.as_ref();
        self.limiter.wait_for(provider.key()).await;

        let handle = match provider.resolve(entity).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!("failed to resolve {entity} with {}: {err}", provider.name());
                let error = FieldError::new(FieldErrorKind::Unresolved, err.to_string());
                return ResultDocument::all_failed(provider.fields(), &error);
            }
        };

        let mut document = ResultDocument::new();
        for field in provider.fields() {
            let outcome = provider
                .fetch_field(&handle, *field)
                .await
                .map_err(|err| {
                    tracing::error!("error fetching {field} for {entity}: {err}");
                    FieldError::from(&err)
                });
            document.insert(*field, outcome);
        }

        if document.failures() > 0 {
            tracing::warn!(
                "{entity}: {}/{} fields failed",
                document.failures(),
                document.len()
            );
        }
        document
    }

    fn entity_lock(&self, entity: &EntityId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(entity.clone()).or_default().clone()
    }

    fn release_entity_lock(&self, entity: &EntityId, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // the map's copy plus ours: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(entity);
        }
    }
}
