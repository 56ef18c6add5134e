use std::fmt;

use serde::Serialize;

use crate::config::{BboxPolicy, MatchSettings};

pub const REFERENCE_DIGITS: usize = 27;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
    pub fn new(digits: impl Into<String>) -> Option<Self> {
        let digits = digits.into();
        if digits.len() == REFERENCE_DIGITS && digits.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(digits))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedReference {
    pub position: usize,
    pub reference: PaymentReference,
    pub raw_text: String,
    pub bbox: Option<String>,
}

impl ExtractedReference {
    pub fn lookup_key(&self) -> &str {
        self.raw_text.trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub reference: String,
    pub invoice_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedReference {
    pub extracted: ExtractedReference,
    pub invoice_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationRequest {
    pub position: usize,
    pub reference: PaymentReference,
    pub invoice_id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnmatchedReference,
    MalformedBoundingBox,
    UnencodableInvoiceId,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnmatchedReference => "unmatched_reference",
            Self::MalformedBoundingBox => "malformed_bounding_box",
            Self::UnencodableInvoiceId => "unencodable_invoice_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub position: usize,
    pub reference: PaymentReference,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub extracted_count: usize,
    pub annotations: Vec<AnnotationRequest>,
    pub failures: Vec<RecordFailure>,
}

impl MatchOutcome {
    pub fn count_failures(&self, kind: FailureKind) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.kind == kind)
            .count()
    }

    pub fn record_overlay_failures(&mut self, failures: Vec<RecordFailure>) {
        if failures.is_empty() {
            return;
        }
        self.annotations.retain(|annotation| {
            !failures
                .iter()
                .any(|failure| failure.position == annotation.position)
        });
        self.failures.extend(failures);
        self.failures.sort_by_key(|failure| failure.position);
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportInputs {
    pub text_layer: InputFile,
    pub ledger: InputFile,
    pub template_pdf: Option<InputFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSettings {
    pub xml_tag: String,
    pub offset_x: f64,
    pub offset_y: f64,
    pub reference_column: String,
    pub invoice_column: String,
    pub bbox_policy: BboxPolicy,
    pub font_size: f64,
}

impl From<&MatchSettings> for ReportSettings {
    fn from(settings: &MatchSettings) -> Self {
        Self {
            xml_tag: settings.xml_tag.clone(),
            offset_x: settings.offsets.dx,
            offset_y: settings.offsets.dy,
            reference_column: settings.reference_column.clone(),
            invoice_column: settings.invoice_column.clone(),
            bbox_policy: settings.bbox_policy,
            font_size: settings.font_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportCounts {
    pub ledger_rows: usize,
    pub references_extracted: usize,
    pub annotations: usize,
    pub unmatched_references: usize,
    pub malformed_bounding_boxes: usize,
    pub unencodable_invoice_ids: usize,
}

impl ReportCounts {
    pub fn from_outcome(outcome: &MatchOutcome, ledger_rows: usize) -> Self {
        Self {
            ledger_rows,
            references_extracted: outcome.extracted_count,
            annotations: outcome.annotations.len(),
            unmatched_references: outcome.count_failures(FailureKind::UnmatchedReference),
            malformed_bounding_boxes: outcome.count_failures(FailureKind::MalformedBoundingBox),
            unencodable_invoice_ids: outcome.count_failures(FailureKind::UnencodableInvoiceId),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileRunReport {
    pub report_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub operator: String,
    pub inputs: ReportInputs,
    pub output_pdf: Option<String>,
    pub settings: ReportSettings,
    pub counts: ReportCounts,
    pub annotations: Vec<AnnotationRequest>,
    pub failures: Vec<RecordFailure>,
}
