use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("XML tag \"{tag}\" not found in text layer")]
    InvalidTag { tag: String },

    #[error("no ledger row for reference {reference}")]
    UnmatchedReference { reference: String },

    #[error("malformed bounding box {raw:?}: {reason}")]
    MalformedBoundingBox { raw: String, reason: String },

    #[error("invoice id {invoice_id:?} cannot be encoded for the overlay font")]
    UnencodableInvoiceId { invoice_id: String },

    #[error("failed to parse text layer XML: {0}")]
    XmlParse(String),

    #[error("ledger is missing column \"{column}\"")]
    LedgerColumnMissing { column: String },

    #[error("failed to read ledger: {0}")]
    LedgerCsv(String),
}

impl MatchError {
    pub fn malformed_bbox(raw: &str, reason: impl Into<String>) -> Self {
        Self::MalformedBoundingBox {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<roxmltree::Error> for MatchError {
    fn from(err: roxmltree::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<csv::Error> for MatchError {
    fn from(err: csv::Error) -> Self {
        Self::LedgerCsv(err.to_string())
    }
}
