use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::error::MatchError;
use crate::model::{ExtractedReference, PaymentReference};

pub fn load_text_layer(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read text layer {}", path.display()))
}

pub struct ReferenceExtractor {
    tag: String,
    pattern: Regex,
}

impl ReferenceExtractor {
    pub fn new(tag: &str) -> Result<Self> {
        let pattern =
            Regex::new(r"^[0-9]{27}").context("failed to compile payment reference regex")?;
        Ok(Self {
            tag: tag.to_string(),
            pattern,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn extract_from_str(&self, xml: &str) -> Result<Vec<ExtractedReference>, MatchError> {
        // pdfminer dumps can carry a doctype
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let document = roxmltree::Document::parse_with_options(xml, options)?;
        self.extract(&document)
    }

    pub fn extract(
        &self,
        document: &roxmltree::Document<'_>,
    ) -> Result<Vec<ExtractedReference>, MatchError> {
        let mut lines = document
            .descendants()
            .filter(|node| node.is_element() && node.tag_name().name() == self.tag)
            .peekable();

        if lines.peek().is_none() {
            return Err(MatchError::InvalidTag {
                tag: self.tag.clone(),
            });
        }

        let mut references = Vec::new();
        for node in lines {
            let Some(text) = node.text() else {
                continue;
            };
            let Some(reference) = self.leading_reference(text) else {
                continue;
            };

            let bbox = node.attribute("bbox").map(ToOwned::to_owned);
            debug!(
                reference = %reference,
                bbox = bbox.as_deref().unwrap_or_default(),
                "payment reference found"
            );

            references.push(ExtractedReference {
                position: references.len(),
                reference,
                raw_text: text.to_string(),
                bbox,
            });
        }

        Ok(references)
    }

    fn leading_reference(&self, text: &str) -> Option<PaymentReference> {
        self.pattern
            .find(text)
            .and_then(|found| PaymentReference::new(found.as_str()))
    }
}
