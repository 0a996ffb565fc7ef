use crate::domain::account::UserId;
use crate::domain::transaction::TransactionKind;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a postings file: `kind,user,amount,description`.
///
/// `amount` may be empty only for `initial_setup`, which then opens the
/// account with the configured starting balance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Posting {
    pub kind: TransactionKind,
    pub user: UserId,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reads postings from a CSV source.
///
/// Fields are trimmed and short rows are accepted, so a missing description
/// column is not an error.
pub struct PostingReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PostingReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes postings; a bad row yields an error and reading continues.
    pub fn postings(self) -> impl Iterator<Item = Result<Posting>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
