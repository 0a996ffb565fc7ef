#![allow(dead_code)]

use gdc_ledger::application::ledger::LedgerEngine;
use gdc_ledger::config::LedgerConfig;
use gdc_ledger::domain::ports::StoreHandle;
use gdc_ledger::infrastructure::in_memory::InMemoryStore;
use std::io::{Error, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const HEADER: [&str; 4] = ["kind", "user", "amount", "description"];

/// Writes a postings CSV with the standard header followed by `rows`.
pub fn postings_csv(rows: &[[&str; 4]]) -> Result<NamedTempFile, Error> {
    let file = NamedTempFile::new()?;
    {
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(file.reopen()?);
        wtr.write_record(HEADER)?;
        for row in rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    Ok(file)
}

pub fn config_file(json: &str) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    file.write_all(json.as_bytes())?;
    file.flush()?;
    Ok(file)
}

pub fn in_memory_ledger() -> Arc<LedgerEngine> {
    let store: StoreHandle = Arc::new(InMemoryStore::new());
    Arc::new(LedgerEngine::new(store, LedgerConfig::default()))
}
