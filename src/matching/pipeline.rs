use anyhow::Result;
use tracing::{info, warn};

use crate::config::{BboxPolicy, MatchSettings};
use crate::error::MatchError;
use crate::model::{
    AnnotationRequest, ExtractedReference, FailureKind, MatchOutcome, RecordFailure,
    ResolvedReference,
};

use super::extract::ReferenceExtractor;
use super::ledger::Ledger;
use super::placement::{Offsets, anchor_for, parse_bounding_box};

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub resolved: Vec<ResolvedReference>,
    pub unmatched: Vec<RecordFailure>,
}

pub fn resolve_invoices(extracted: &[ExtractedReference], ledger: &Ledger) -> Resolution {
    let mut resolved = Vec::with_capacity(extracted.len());
    let mut unmatched = Vec::new();

    for entry in extracted {
        let key = entry.lookup_key();
        match ledger.lookup(key) {
            Some(invoice_id) => resolved.push(ResolvedReference {
                extracted: entry.clone(),
                invoice_id: invoice_id.to_string(),
            }),
            None => {
                let err = MatchError::UnmatchedReference {
                    reference: key.to_string(),
                };
                warn!(position = entry.position, reference = %key, "{err}");
                unmatched.push(RecordFailure {
                    position: entry.position,
                    reference: entry.reference.clone(),
                    kind: FailureKind::UnmatchedReference,
                    message: err.to_string(),
                });
            }
        }
    }

    Resolution {
        resolved,
        unmatched,
    }
}

pub fn place_annotations(
    resolved: &[ResolvedReference],
    offsets: Offsets,
    policy: BboxPolicy,
) -> Result<(Vec<AnnotationRequest>, Vec<RecordFailure>), MatchError> {
    let mut annotations = Vec::with_capacity(resolved.len());
    let mut malformed = Vec::new();

    for entry in resolved {
        let extracted = &entry.extracted;
        let parsed = match extracted.bbox.as_deref() {
            Some(raw) => parse_bounding_box(raw),
            None => Err(MatchError::malformed_bbox("", "bbox attribute missing")),
        };

        match parsed {
            Ok(bbox) => {
                let anchor = anchor_for(&bbox, offsets);
                annotations.push(AnnotationRequest {
                    position: extracted.position,
                    reference: extracted.reference.clone(),
                    invoice_id: entry.invoice_id.clone(),
                    x: anchor.x,
                    y: anchor.y,
                });
            }
            Err(err) if policy == BboxPolicy::Abort => return Err(err),
            Err(err) => {
                warn!(
                    position = extracted.position,
                    reference = %extracted.reference,
                    "{err}, record skipped"
                );
                malformed.push(RecordFailure {
                    position: extracted.position,
                    reference: extracted.reference.clone(),
                    kind: FailureKind::MalformedBoundingBox,
                    message: err.to_string(),
                });
            }
        }
    }

    Ok((annotations, malformed))
}

pub fn run_pipeline(xml: &str, ledger: &Ledger, settings: &MatchSettings) -> Result<MatchOutcome> {
    let extractor = ReferenceExtractor::new(&settings.xml_tag)?;
    let extracted = extractor.extract_from_str(xml)?;
    info!(
        tag = %extractor.tag(),
        references = extracted.len(),
        "payment references extracted"
    );

    let Resolution {
        resolved,
        unmatched,
    } = resolve_invoices(&extracted, ledger);
    let (annotations, malformed) =
        place_annotations(&resolved, settings.offsets, settings.bbox_policy)?;

    let mut failures = unmatched;
    failures.extend(malformed);
    failures.sort_by_key(|failure| failure.position);

    Ok(MatchOutcome {
        extracted_count: extracted.len(),
        annotations,
        failures,
    })
}
