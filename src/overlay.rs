use std::path::Path;

use anyhow::{Context, Result, bail};
use encoding_rs::WINDOWS_1252;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, warn};

use crate::error::MatchError;
use crate::model::{AnnotationRequest, FailureKind, RecordFailure};

const OVERLAY_FONT: &[u8] = b"T2IHelv";

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySummary {
    pub page_count: usize,
    pub annotations_written: usize,
    pub failures: Vec<RecordFailure>,
}

pub fn write_overlay(
    template: &Path,
    destination: &Path,
    annotations: &[AnnotationRequest],
    font_size: f64,
) -> Result<OverlaySummary> {
    let mut document = Document::load(template)
        .with_context(|| format!("failed to load template PDF {}", template.display()))?;

    let pages = document.get_pages();
    let Some(&page_id) = pages.get(&1) else {
        bail!("template PDF has no pages: {}", template.display());
    };

    let (content, failures) = overlay_content(annotations, font_size);
    stamp_page(&mut document, page_id, &content)
        .with_context(|| format!("failed to stamp invoices onto {}", template.display()))?;

    document
        .save(destination)
        .with_context(|| format!("failed to write annotated PDF {}", destination.display()))?;

    Ok(OverlaySummary {
        page_count: pages.len(),
        annotations_written: annotations.len() - failures.len(),
        failures,
    })
}

fn stamp_page(document: &mut Document, page_id: ObjectId, content: &Content) -> Result<()> {
    register_overlay_font(document, page_id)?;

    let save_id = document.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let restore_id = document.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    let overlay = content
        .encode()
        .context("failed to encode overlay content stream")?;
    let overlay_id = document.add_object(Stream::new(Dictionary::new(), overlay));

    let existing = existing_contents(document, page_id)?;
    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(Object::Reference(save_id));
    contents.extend(existing);
    contents.push(Object::Reference(restore_id));
    contents.push(Object::Reference(overlay_id));

    document
        .get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", Object::Array(contents));

    debug!("overlay content appended");
    Ok(())
}

fn existing_contents(document: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let contents = match document.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match document.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(contents)
}

fn encode_win_ansi(text: &str) -> Option<Vec<u8>> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        None
    } else {
        Some(bytes.into_owned())
    }
}

fn overlay_content(
    annotations: &[AnnotationRequest],
    font_size: f64,
) -> (Content, Vec<RecordFailure>) {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(OVERLAY_FONT.to_vec()),
                Object::Real(font_size as f32),
            ],
        ),
    ];
    let mut failures = Vec::new();

    for annotation in annotations {
        let Some(text) = encode_win_ansi(&annotation.invoice_id) else {
            let err = MatchError::UnencodableInvoiceId {
                invoice_id: annotation.invoice_id.clone(),
            };
            warn!(
                position = annotation.position,
                reference = %annotation.reference,
                "{err}, record skipped"
            );
            failures.push(RecordFailure {
                position: annotation.position,
                reference: annotation.reference.clone(),
                kind: FailureKind::UnencodableInvoiceId,
                message: err.to_string(),
            });
            continue;
        };

        operations.push(Operation::new(
            "Tm",
            vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Real(annotation.x as f32),
                Object::Real(annotation.y as f32),
            ],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(text)]));
    }

    operations.push(Operation::new("ET", vec![]));
    (Content { operations }, failures)
}

fn register_overlay_font(document: &mut Document, page_id: ObjectId) -> Result<()> {
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let has_own_resources = document.get_dictionary(page_id)?.has(b"Resources");
    if !has_own_resources {
        let inherited = inherited_resources(document, page_id)?;
        document
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Resources", Object::Dictionary(inherited));
    }

    let resources_ref = match document.get_dictionary(page_id)?.get(b"Resources")? {
        Object::Reference(id) => Some(*id),
        _ => None,
    };
    let font_ref = match resources_ref {
        Some(id) => document.get_dictionary(id)?.get(b"Font").ok(),
        None => document
            .get_dictionary(page_id)?
            .get(b"Resources")?
            .as_dict()?
            .get(b"Font")
            .ok(),
    }
    .and_then(|font| font.as_reference().ok());

    if let Some(id) = font_ref {
        document
            .get_object_mut(id)?
            .as_dict_mut()?
            .set(OVERLAY_FONT.to_vec(), Object::Reference(font_id));
        return Ok(());
    }

    let resources = match resources_ref {
        Some(id) => document.get_object_mut(id)?.as_dict_mut()?,
        None => document
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .get_mut(b"Resources")?
            .as_dict_mut()?,
    };
    if !matches!(resources.get(b"Font"), Ok(Object::Dictionary(_))) {
        resources.set("Font", Object::Dictionary(Dictionary::new()));
    }
    resources
        .get_mut(b"Font")?
        .as_dict_mut()?
        .set(OVERLAY_FONT.to_vec(), Object::Reference(font_id));

    Ok(())
}

fn inherited_resources(document: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut current = document.get_dictionary(page_id)?;
    while let Ok(parent) = current.get(b"Parent").and_then(Object::as_reference) {
        current = document.get_dictionary(parent)?;
        match current.get(b"Resources") {
            Ok(Object::Dictionary(resources)) => return Ok(resources.clone()),
            Ok(Object::Reference(id)) => return Ok(document.get_dictionary(*id)?.clone()),
            _ => {}
        }
    }
    Ok(Dictionary::new())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::PaymentReference;

    pub(crate) fn write_template_pdf(path: &Path, with_page: bool) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });

        let mut kids: Vec<Object> = Vec::new();
        if with_page {
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                b"BT /F1 12 Tf 85 710 Td (210000000003139471430009017) Tj ET".to_vec(),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("template should save");
    }

    fn bare_template_pdf(path: &Path, contents_as_array_object: bool) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"BT 85 710 Td (statement body) Tj ET".to_vec(),
        ));
        let contents = if contents_as_array_object {
            Object::Reference(doc.add_object(Object::Array(vec![Object::Reference(content_id)])))
        } else {
            Object::Reference(content_id)
        };
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => contents,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).expect("template should save");
    }

    fn annotation(position: usize, invoice_id: &str, x: f64, y: f64) -> AnnotationRequest {
        AnnotationRequest {
            position,
            reference: PaymentReference::new("210000000003139471430009017").expect("valid"),
            invoice_id: invoice_id.to_string(),
            x,
            y,
        }
    }

    fn first_page_content(path: &Path) -> Vec<u8> {
        let stamped = Document::load(path).expect("output should load");
        let page_id = *stamped.get_pages().get(&1).expect("first page");
        stamped.get_page_content(page_id).expect("page content")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|window| window == needle)
    }

    #[test]
    fn overlay_appends_invoice_text_to_first_page() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("statement.pdf");
        let output = dir.path().join("statement_invoices.pdf");
        write_template_pdf(&template, true);

        let summary = write_overlay(
            &template,
            &output,
            &[annotation(0, "INV-2024-0042", 95.32, 720.15)],
            10.0,
        )
        .expect("overlay should be written");
        assert_eq!(summary.page_count, 1);
        assert_eq!(summary.annotations_written, 1);
        assert!(summary.failures.is_empty());

        let content = first_page_content(&output);
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("(INV-2024-0042) Tj"));
        assert!(text.contains("(210000000003139471430009017) Tj"));
        assert!(text.trim_start().starts_with('q'));
    }

    #[test]
    fn overlay_writes_umlauts_as_win_ansi_bytes() {
        let (content, failures) =
            overlay_content(&[annotation(0, "RE-Müller-7", 10.0, 10.0)], 10.0);
        assert!(failures.is_empty());

        let encoded = content.encode().expect("content should encode");
        assert!(contains(&encoded, b"(RE-M\xFCller-7) Tj"));
        assert!(!contains(&encoded, &[0xC3, 0xBC]));
    }

    #[test]
    fn overlay_skips_invoice_ids_outside_win_ansi() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("statement.pdf");
        let output = dir.path().join("out.pdf");
        write_template_pdf(&template, true);

        let summary = write_overlay(
            &template,
            &output,
            &[
                annotation(0, "INV-1", 10.0, 10.0),
                annotation(3, "請求-2", 10.0, 30.0),
            ],
            10.0,
        )
        .expect("overlay should be written");

        assert_eq!(summary.annotations_written, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].position, 3);
        assert_eq!(summary.failures[0].kind, FailureKind::UnencodableInvoiceId);

        let content = first_page_content(&output);
        assert!(contains(&content, b"(INV-1) Tj"));
        assert!(!contains(&content, b"&#"));
    }

    #[test]
    fn overlay_keeps_inherited_fonts_and_registers_its_own() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("statement.pdf");
        let output = dir.path().join("out.pdf");
        write_template_pdf(&template, true);

        write_overlay(&template, &output, &[annotation(0, "INV-1", 10.0, 10.0)], 9.0)
            .expect("overlay should be written");

        let stamped = Document::load(&output).expect("output should load");
        let page_id = *stamped.get_pages().get(&1).expect("first page");
        let page = stamped.get_dictionary(page_id).expect("page dictionary");
        let fonts = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"Font"))
            .and_then(Object::as_dict)
            .expect("page fonts");
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(OVERLAY_FONT));
    }

    #[test]
    fn overlay_handles_template_without_resources() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("bare.pdf");
        let output = dir.path().join("bare_out.pdf");
        bare_template_pdf(&template, false);

        let summary = write_overlay(&template, &output, &[], 10.0).expect("overlay");
        assert_eq!(summary.annotations_written, 0);
        assert!(output.is_file());
    }

    #[test]
    fn overlay_flattens_contents_stored_as_array_object() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("indirect.pdf");
        let output = dir.path().join("indirect_out.pdf");
        bare_template_pdf(&template, true);

        write_overlay(&template, &output, &[annotation(0, "INV-9", 10.0, 10.0)], 10.0)
            .expect("overlay should be written");

        let stamped = Document::load(&output).expect("output should load");
        let page_id = *stamped.get_pages().get(&1).expect("first page");
        let contents = stamped
            .get_dictionary(page_id)
            .and_then(|page| page.get(b"Contents"))
            .and_then(Object::as_array)
            .expect("contents array");
        assert_eq!(contents.len(), 4);
        for entry in contents {
            let id = entry.as_reference().expect("content entries are references");
            assert!(stamped.get_object(id).and_then(Object::as_stream).is_ok());
        }

        let content = first_page_content(&output);
        assert!(contains(&content, b"(statement body) Tj"));
        assert!(contains(&content, b"(INV-9) Tj"));
    }

    #[test]
    fn overlay_rejects_template_without_pages() {
        let dir = tempfile::tempdir().expect("temp dir");
        let template = dir.path().join("empty.pdf");
        write_template_pdf(&template, false);

        let err = write_overlay(&template, &dir.path().join("out.pdf"), &[], 10.0)
            .expect_err("empty template should fail");
        assert!(err.to_string().starts_with("template PDF has no pages"));
    }

    #[test]
    fn overlay_fails_for_missing_template() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = write_overlay(
            &dir.path().join("absent.pdf"),
            &dir.path().join("out.pdf"),
            &[],
            10.0,
        )
        .expect_err("missing template should fail");
        assert!(err.to_string().contains("failed to load template PDF"));
    }
}
