use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::ReconcileArgs;
use crate::config::{AppConfig, MatchSettings};
use crate::matching::{Ledger, load_text_layer, run_pipeline};
use crate::model::{ReconcileRunReport, ReportCounts, ReportInputs, ReportSettings};
use crate::overlay::write_overlay;
use crate::util::{
    current_operator, describe_input, ensure_directory, ensure_input_file, now_utc_string,
    same_file_path, utc_compact_string, write_json_pretty,
};

const REPORT_VERSION: u32 = 1;

pub fn run(args: ReconcileArgs, config: &AppConfig) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let settings = MatchSettings::resolve(config, &args.overrides)?;

    ensure_input_file(&args.xml, "text layer")?;
    ensure_input_file(&args.ledger, "ledger")?;
    if let Some(template) = &args.template_pdf {
        ensure_input_file(template, "template PDF")?;
    }

    info!(
        run_id = %run_id,
        xml = %args.xml.display(),
        ledger = %args.ledger.display(),
        tag = %settings.xml_tag,
        bbox_policy = settings.bbox_policy.as_str(),
        "starting reconcile"
    );

    let ledger = Ledger::load(
        &args.ledger,
        &settings.reference_column,
        &settings.invoice_column,
    )?;
    if ledger.is_empty() {
        warn!(path = %args.ledger.display(), "ledger has no usable rows");
    }

    let xml = load_text_layer(&args.xml)?;
    let mut outcome = run_pipeline(&xml, &ledger, &settings)
        .with_context(|| format!("failed to match references from {}", args.xml.display()))?;

    for annotation in &outcome.annotations {
        debug!(
            position = annotation.position,
            reference = %annotation.reference,
            invoice_id = %annotation.invoice_id,
            x = annotation.x,
            y = annotation.y,
            "annotation placed"
        );
    }

    let output_pdf = match &args.template_pdf {
        Some(template) => {
            let destination = args
                .output_pdf
                .clone()
                .unwrap_or_else(|| default_output_path(template));
            if same_file_path(template, &destination)? {
                bail!(
                    "output PDF would overwrite the template: {}",
                    template.display()
                );
            }
            if let Some(parent) = destination
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
            {
                ensure_directory(parent)?;
            }

            let summary = write_overlay(
                template,
                &destination,
                &outcome.annotations,
                settings.font_size,
            )?;
            info!(
                path = %destination.display(),
                pages = summary.page_count,
                annotations = summary.annotations_written,
                unencodable = summary.failures.len(),
                "wrote annotated PDF"
            );
            outcome.record_overlay_failures(summary.failures);
            Some(destination)
        }
        None => None,
    };

    if let Some(report_path) = &args.report_path {
        let report = ReconcileRunReport {
            report_version: REPORT_VERSION,
            run_id: run_id.clone(),
            started_at,
            finished_at: now_utc_string(),
            operator: current_operator(),
            inputs: ReportInputs {
                text_layer: describe_input(&args.xml)?,
                ledger: describe_input(&args.ledger)?,
                template_pdf: args
                    .template_pdf
                    .as_deref()
                    .map(describe_input)
                    .transpose()?,
            },
            output_pdf: output_pdf.as_ref().map(|path| path.display().to_string()),
            settings: ReportSettings::from(&settings),
            counts: ReportCounts::from_outcome(&outcome, ledger.len()),
            annotations: outcome.annotations.clone(),
            failures: outcome.failures.clone(),
        };
        write_json_pretty(report_path, &report)?;
        info!(path = %report_path.display(), "wrote run report");
    }

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("failed to serialize match outcome")?;
        println!("{rendered}");
    }

    for failure in &outcome.failures {
        warn!(
            position = failure.position,
            reference = %failure.reference,
            kind = failure.kind.as_str(),
            "record not annotated"
        );
    }

    let counts = ReportCounts::from_outcome(&outcome, ledger.len());
    info!(
        run_id = %run_id,
        references = counts.references_extracted,
        annotations = counts.annotations,
        unmatched = counts.unmatched_references,
        malformed = counts.malformed_bounding_boxes,
        unencodable = counts.unencodable_invoice_ids,
        "reconcile completed"
    );

    if args.require_all_matched && !outcome.is_complete() {
        bail!(
            "{} of {} payment references were not annotated",
            outcome.failures.len(),
            outcome.extracted_count
        );
    }

    Ok(())
}

fn default_output_path(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("statement");
    template.with_file_name(format!("{stem}_invoices.pdf"))
}
