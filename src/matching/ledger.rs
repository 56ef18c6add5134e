use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::MatchError;
use crate::model::LedgerRow;

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
    index: HashMap<String, usize>,
    duplicate_count: usize,
}

impl Ledger {
    pub fn load(path: &Path, reference_column: &str, invoice_column: &str) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open ledger {}", path.display()))?;
        let ledger = Self::from_reader(file, reference_column, invoice_column)
            .with_context(|| format!("failed to load ledger {}", path.display()))?;

        if ledger.duplicate_count() > 0 {
            warn!(
                path = %path.display(),
                duplicates = ledger.duplicate_count(),
                "ledger contains duplicate references, keeping first row for each"
            );
        }
        debug!(path = %path.display(), rows = ledger.len(), "ledger loaded");

        Ok(ledger)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        reference_column: &str,
        invoice_column: &str,
    ) -> Result<Self, MatchError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let reference_idx = column_index(&headers, reference_column)?;
        let invoice_idx = column_index(&headers, invoice_column)?;

        let mut rows = Vec::new();
        let mut skipped = 0_usize;
        for record in csv_reader.records() {
            let record = record?;
            let reference = record.get(reference_idx).unwrap_or_default();
            let invoice_id = record.get(invoice_idx).unwrap_or_default();

            if reference.is_empty() || invoice_id.is_empty() {
                skipped += 1;
                continue;
            }

            rows.push(LedgerRow {
                reference: reference.to_string(),
                invoice_id: invoice_id.to_string(),
            });
        }

        if skipped > 0 {
            debug!(skipped, "ledger rows without reference or invoice id skipped");
        }

        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: impl IntoIterator<Item = LedgerRow>) -> Self {
        let mut ledger = Self::default();
        for row in rows {
            match ledger.index.entry(row.reference.clone()) {
                Entry::Occupied(_) => ledger.duplicate_count += 1,
                Entry::Vacant(slot) => {
                    slot.insert(ledger.rows.len());
                    ledger.rows.push(row);
                }
            }
        }
        ledger
    }

    pub fn lookup(&self, reference: &str) -> Option<&str> {
        self.index
            .get(reference)
            .map(|&idx| self.rows[idx].invoice_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_count
    }
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, MatchError> {
    headers
        .iter()
        .position(|header| header == column.trim())
        .ok_or_else(|| MatchError::LedgerColumnMissing {
            column: column.to_string(),
        })
}
