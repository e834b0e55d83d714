//! On-disk snapshot cache.
//!
//! Layout, one directory per entity:
//!
//! ```text
//! {root}/
//! └── AAPL/
//!     ├── 2024-01-01-AAPL.json
//!     ├── 2024-01-02-AAPL.json
//!     └── latest-AAPL.json
//! ```
//!
//! Writes go to a temporary sibling first and are renamed into place, so a reader never
//! observes a half-written snapshot. Unreadable or corrupt snapshots are reported and
//! treated as misses.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::document::ResultDocument;
use super::entity::{CacheKey, EntityId};
use super::error::{Result, StockpileError};

/// JSON snapshot store keyed by entity and date.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{ENTITY_ID}/`
    pub fn entity_dir(&self, entity: &EntityId) -> PathBuf {
        self.root.join(entity.as_str())
    }

    /// `{root}/{ENTITY_ID}/{YYYY-MM-DD}-{ENTITY_ID}.json`
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.entity_dir(&key.entity).join(key.file_name())
    }

    /// `{root}/{ENTITY_ID}/latest-{ENTITY_ID}.json`
    pub fn latest_path(&self, entity: &EntityId) -> PathBuf {
        self.entity_dir(entity).join(format!("latest-{entity}.json"))
    }

    /// Returns the snapshot for `(entity, as_of)`, or `None` on a miss.
    ///
    /// A file that exists but cannot be read or parsed is logged and reported as a
    /// miss, so the caller simply fetches a fresh snapshot over it.
    pub async fn lookup(&self, entity: &EntityId, as_of: NaiveDate) -> Option<ResultDocument> {
        let key = CacheKey::new(entity.clone(), as_of);
        read_snapshot(&self.path_for(&key)).await
    }

    /// Returns the most recently stored snapshot of an entity, whatever its date.
    pub async fn latest(&self, entity: &EntityId) -> Option<ResultDocument> {
        read_snapshot(&self.latest_path(entity)).await
    }

    /// Persists a snapshot, replacing any previous content for the same key, and
    /// points `latest-{ENTITY_ID}.json` at it. Returns the snapshot path.
    ///
    /// # Errors
    ///
    /// Directory creation or write failures are returned as
    /// `StockpileError::CacheWrite`; an unwritable cache is a configuration problem,
    /// not something to paper over per entity.
    pub async fn store(
        &self,
        entity: &EntityId,
        as_of: NaiveDate,
        document: &ResultDocument,
    ) -> Result<PathBuf> {
        let key = CacheKey::new(entity.clone(), as_of);
        let path = self.path_for(&key);
        let bytes = serde_json::to_vec(document)?;

        let dir = self.entity_dir(entity);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StockpileError::CacheWrite {
                path: dir.clone(),
                source,
            })?;

        write_atomic(&path, &bytes).await?;
        write_atomic(&self.latest_path(entity), &bytes).await?;

        tracing::info!("wrote {}", path.display());
        Ok(path)
    }

    /// Creates the cache root and proves it is writable.
    pub async fn ensure_writable(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StockpileError::CacheWrite {
                path: self.root.clone(),
                source,
            })?;

        let marker = self.root.join(format!(".writable-{}", std::process::id()));
        write_atomic(&marker, b"{}").await?;
        // a leftover marker file is harmless
        let _ = fs::remove_file(&marker).await;
        Ok(())
    }
}

async fn read_snapshot(path: &Path) -> Option<ResultDocument> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::trace!("cache miss: {}", path.display());
            return None;
        }
        Err(err) => {
            tracing::warn!("failed to read cached snapshot {}: {err}", path.display());
            return None;
        }
    };

    match serde_json::from_slice::<ResultDocument>(&bytes) {
        Ok(document) => Some(document),
        Err(err) => {
            tracing::warn!(
                "corrupt cached snapshot {}, treating as a miss: {err}",
                path.display()
            );
            None
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        fastrand::u64(..)
    ));

    fs::write(&tmp_path, bytes)
        .await
        .map_err(|source| StockpileError::CacheWrite {
            path: tmp_path.clone(),
            source,
        })?;

    if let Err(source) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StockpileError::CacheWrite {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}
