use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{ExtractArgs, MatchOverrides};
use crate::config::{AppConfig, MatchSettings};
use crate::matching::{ReferenceExtractor, load_text_layer};
use crate::util::ensure_input_file;

pub fn run(args: ExtractArgs, config: &AppConfig) -> Result<()> {
    let overrides = MatchOverrides {
        xml_tag: args.xml_tag.clone(),
        ..MatchOverrides::default()
    };
    let settings = MatchSettings::resolve(config, &overrides)?;

    ensure_input_file(&args.xml, "text layer")?;
    info!(path = %args.xml.display(), tag = %settings.xml_tag, "extracting payment references");

    let xml = load_text_layer(&args.xml)?;
    let extractor = ReferenceExtractor::new(&settings.xml_tag)?;
    let references = extractor
        .extract_from_str(&xml)
        .with_context(|| format!("failed to extract references from {}", args.xml.display()))?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&references)
            .context("failed to serialize extracted references")?;
        println!("{rendered}");
    } else {
        for entry in &references {
            info!(
                position = entry.position,
                reference = entry.reference.as_str(),
                bbox = entry.bbox.as_deref().unwrap_or("-"),
                "payment reference"
            );
        }
    }

    info!(references = references.len(), "extraction completed");
    Ok(())
}
