#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
};
use stockpile::{
    EntityId, Field, Handle, Job, JobReport, JobRunner, Provider, ProviderKey, Result,
    StockpileError,
};
use tokio::time::Instant;

pub fn fixture_path(relative: impl AsRef<Path>) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn read_fixture(relative: impl AsRef<Path>) -> String {
    fs::read_to_string(fixture_path(relative)).expect("fixture file should be readable")
}

pub fn read_json_fixture(relative: impl AsRef<Path>) -> Value {
    serde_json::from_str(&read_fixture(relative)).expect("fixture should be valid JSON")
}

pub fn entity(raw: &str) -> EntityId {
    EntityId::new(raw).unwrap()
}

pub fn day(year: i32, month: u32, date: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, date).unwrap()
}

pub const FAKE_FIELDS: &[Field] = &[Field::Info, Field::History, Field::News];

/// f32 prices widened to f64, plus an extreme exponent; all of them need exact float
/// parsing to read back unchanged.
pub const PRICES: [f64; 4] = [
    0.029999999329447746,
    185.63999938964844,
    192.52999877929688,
    2.017351698988807e285,
];

/// In-memory provider that counts every upstream call.
#[derive(Debug)]
pub struct FakeProvider {
    key: ProviderKey,
    failing: HashSet<Field>,
    unknown: HashSet<String>,
    delay: Duration,
    resolves: AtomicUsize,
    field_calls: AtomicUsize,
    resolved_at: Mutex<Vec<Instant>>,
}

impl FakeProvider {
    pub fn new(key: ProviderKey) -> Self {
        Self {
            key,
            failing: HashSet::new(),
            unknown: HashSet::new(),
            delay: Duration::ZERO,
            resolves: AtomicUsize::new(0),
            field_calls: AtomicUsize::new(0),
            resolved_at: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch of `field` fails with an invalid response.
    pub fn failing(mut self, field: Field) -> Self {
        self.failing.insert(field);
        self
    }

    /// Resolving `symbol` fails with `EntityNotFound`.
    pub fn unknown(mut self, symbol: &str) -> Self {
        self.unknown.insert(symbol.to_string());
        self
    }

    /// Each field fetch takes `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn field_calls(&self) -> usize {
        self.field_calls.load(Ordering::SeqCst)
    }

    /// Total upstream calls, resolves included.
    pub fn calls(&self) -> usize {
        self.resolves() + self.field_calls()
    }

    pub fn resolved_at(&self) -> Vec<Instant> {
        self.resolved_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn key(&self) -> ProviderKey {
        self.key
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn fields(&self) -> &'static [Field] {
        FAKE_FIELDS
    }

    async fn resolve(&self, entity: &EntityId) -> Result<Handle> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.resolved_at.lock().unwrap().push(Instant::now());
        if self.unknown.contains(entity.as_str()) {
            return Err(StockpileError::EntityNotFound(entity.to_string()));
        }
        Ok(Handle::direct(entity))
    }

    async fn fetch_field(&self, handle: &Handle, field: Field) -> Result<Value> {
        self.field_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(&field) {
            return Err(StockpileError::InvalidResponse(format!(
                "bad {field} payload"
            )));
        }
        Ok(json!({
            "symbol": handle.upstream_id,
            "field": field.as_str(),
            "close": PRICES,
        }))
    }
}

/// Job runner whose behavior is scripted per entity.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delays: Vec<(String, Duration)>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    runs: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn panicking(mut self, symbol: &str) -> Self {
        self.panicking.insert(symbol.to_string());
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.push((symbol.to_string(), delay));
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn delay_for(&self, symbol: &str) -> Duration {
        self.delays
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, delay)| *delay)
            .unwrap_or(Duration::from_millis(5))
    }
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, job: &Job) -> Result<JobReport> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay_for(job.entity.as_str())).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let symbol = job.entity.as_str();
        if self.panicking.contains(symbol) {
            panic!("scripted panic for {symbol}");
        }
        if self.failing.contains(symbol) {
            return Err(StockpileError::Upstream(format!("scripted failure for {symbol}")));
        }
        Ok(JobReport {
            fields: 3,
            failed_fields: 0,
            cache_hit: false,
        })
    }
}
