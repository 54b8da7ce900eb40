use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::engine::VaultSummary;
use crate::{Credits, Operation, UserId};

/// Errors that can occur when reading or writing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open operations file: {0}")]
    Open(csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation type '{op_type}'")]
    UnrecognizedType { line: usize, op_type: String },

    #[error("line {line}: {op_type} missing {field}")]
    MissingField {
        line: usize,
        op_type: String,
        field: &'static str,
    },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    user: UserId,
    target: Option<u64>,
    amount: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    user: UserId,
    balance: i64,
    unopened: u32,
    cards: u32,
}

impl InputRow {
    fn require<T>(
        value: Option<T>,
        line: usize,
        op_type: &str,
        field: &'static str,
    ) -> Result<T, CsvError> {
        value.ok_or_else(|| CsvError::MissingField {
            line,
            op_type: op_type.to_string(),
            field,
        })
    }

    fn into_operation(self, line: usize) -> Result<Operation, CsvError> {
        let op_type = self.r#type.as_str();
        match op_type {
            "grant" => Ok(Operation::Grant {
                user: self.user,
                amount: Credits::new(Self::require(self.amount, line, op_type, "amount")?),
            }),
            "purchase" => Ok(Operation::Purchase {
                user: self.user,
                pack: Self::require(self.target, line, op_type, "target")?,
            }),
            "award" => Ok(Operation::Award {
                user: self.user,
                pack: Self::require(self.target, line, op_type, "target")?,
            }),
            "open" => Ok(Operation::Open {
                user: self.user,
                user_pack: Self::require(self.target, line, op_type, "target")?,
            }),
            other => Err(CsvError::UnrecognizedType {
                line,
                op_type: other.to_string(),
            }),
        }
    }
}

/// Read operations from a csv file with a `type,user,target,amount` header.
///
/// `target` is a pack id for `purchase`/`award` and a user pack id for `open`.
/// The returned iterator owns the reader and does not borrow `path`.
pub fn read_operations(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Operation, CsvError>> + use<>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            row.into_operation(line)
        }))
}

/// Write vault summaries in csv format
pub fn write_vaults(
    writer: impl io::Write,
    summaries: impl IntoIterator<Item = VaultSummary>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for summary in summaries {
        writer.serialize(OutputRow {
            user: summary.user,
            balance: summary.balance.value(),
            unopened: summary.unopened,
            cards: summary.cards,
        })?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}
