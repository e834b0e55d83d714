//! The list of entities a batch is generated from.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::entity::EntityId;
use super::error::{Result, StockpileError};

const SYMBOL_COLUMN: &str = "Symbol";

/// Configured tickers plus, optionally, a CSV file with a `Symbol` column (such as an
/// S&P 500 constituents export).
///
/// The file is re-read on every call to [`Universe::load`], so edits are picked up at
/// the next poll.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    tickers: Vec<String>,
    tickers_file: Option<PathBuf>,
}

impl Universe {
    pub fn new(tickers: Vec<String>, tickers_file: Option<PathBuf>) -> Self {
        Self {
            tickers,
            tickers_file,
        }
    }

    /// Normalized, de-duplicated entity ids, configured tickers first.
    ///
    /// Invalid symbols are logged and skipped. A configured file that is missing or
    /// lacks a `Symbol` column is an error.
    pub fn load(&self) -> Result<Vec<EntityId>> {
        let mut raw = self.tickers.clone();
        if let Some(path) = &self.tickers_file {
            raw.extend(read_symbols_file(path)?);
        }

        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(raw.len());
        for symbol in raw {
            match EntityId::new(&symbol) {
                Ok(id) => {
                    if seen.insert(id.clone()) {
                        entities.push(id);
                    }
                }
                Err(err) => tracing::warn!("skipping ticker: {err}"),
            }
        }

        tracing::debug!("universe holds {} entities", entities.len());
        Ok(entities)
    }
}

fn read_symbols_file(path: &Path) -> Result<Vec<String>> {
    tracing::trace!("reading tickers from {}", path.display());
    let file = std::fs::File::open(path)?;
    read_symbols(file)
}

/// Reads the `Symbol` column of a CSV document.
pub fn read_symbols<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv = csv::Reader::from_reader(reader);
    let column = csv
        .headers()?
        .iter()
        .position(|header| header.trim() == SYMBOL_COLUMN)
        .ok_or_else(|| {
            StockpileError::ConfigError(format!("tickers file has no '{SYMBOL_COLUMN}' column"))
        })?;

    let mut symbols = Vec::new();
    for record in csv.records() {
        if let Some(symbol) = record?.get(column) {
            symbols.push(symbol.to_string());
        }
    }
    Ok(symbols)
}
