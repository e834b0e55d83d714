//! # Stockpile - daily snapshots of financial data, cached as JSON
//!
//! Stockpile fetches a fixed set of fields for a universe of ticker symbols from
//! several upstream providers, and stores one JSON document per entity per day. It is
//! built to run unattended: a worker refreshes the whole universe, sleeps, and starts
//! over.
//!
//! ## Features
//!
//! - **Cache-first fetching** - An entity is fetched at most once per calendar day per
//!   provider; later requests are served from disk
//! - **Partial results** - A field that fails to fetch is recorded as an error marker
//!   next to the fields that succeeded, instead of failing the whole entity
//! - **Rate limiting** - A minimum spacing between entity fetches per provider, on top
//!   of a token bucket per HTTP client
//! - **Bounded concurrency** - Batches of (provider, entity) jobs run on a fixed number
//!   of workers; one failing or panicking job never takes down the batch
//! - **Providers** - Yahoo Finance market data, SEC EDGAR filings and Alpha Vantage
//!   fundamentals, each behind a cargo feature
//!
//! ## Requirements
//!
//! Stockpile is async-first and requires a [tokio](https://tokio.rs) runtime.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use stockpile::{EntityId, FileCache, Orchestrator, ProviderKey, RateLimiter, StockpileConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StockpileConfig::from_env()?;
//!     let provider = stockpile::providers::build(ProviderKey::Yahoo, &config)?;
//!     let cache = FileCache::new(config.cache_root(ProviderKey::Yahoo));
//!     let limiter = Arc::new(RateLimiter::new(&config.min_intervals));
//!
//!     let orchestrator = Orchestrator::new(provider, cache, limiter);
//!     let document = orchestrator.fetch(&EntityId::new("AAPL")?, false).await?;
//!
//!     for (field, outcome) in document.iter() {
//!         match outcome {
//!             Ok(_) => println!("{field}: ok"),
//!             Err(err) => println!("{field}: {err}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod document;
mod entity;
mod error;
mod http;
mod limiter;
mod orchestrator;
mod pool;
mod scheduler;
mod traits;
mod universe;

pub mod providers;

pub use cache::FileCache;
pub use config::{ProviderUrls, StockpileConfig};
pub use document::{Field, FieldError, FieldErrorKind, FieldOutcome, ResultDocument};
pub use entity::{CacheKey, EntityId};
pub use error::{Result, StockpileError};
pub use http::HttpClient;
pub use limiter::RateLimiter;
pub use orchestrator::{Fetched, Orchestrator, Source};
pub use pool::{Batch, BatchSummary, Dispatcher, Job, JobOutcome, JobReport, JobRunner, WorkerPool};
pub use scheduler::{EntitySource, Scheduler, Shutdown};
pub use traits::{Handle, Memo, Provider, ProviderKey};
pub use universe::{Universe, read_symbols};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
