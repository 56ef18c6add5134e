use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::MatchOverrides;
use crate::matching::Offsets;

pub const DEFAULT_CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_XML_TAG: &str = "LTTextLineHorizontal";
pub const DEFAULT_REFERENCE_COLUMN: &str = "QR Reference";
pub const DEFAULT_INVOICE_COLUMN: &str = "Invoice ID";
pub const DEFAULT_OFFSET: f64 = 10.0;
pub const DEFAULT_FONT_SIZE: f64 = 10.0;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BboxPolicy {
    #[default]
    Skip,
    Abort,
}

impl BboxPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AppConfig {
    pub xml_tag: Option<String>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub reference_column: Option<String>,
    pub invoice_column: Option<String>,
    pub bbox_policy: Option<BboxPolicy>,
    pub font_size: Option<f64>,
    pub log_filename: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub xml_tag: String,
    pub offsets: Offsets,
    pub reference_column: String,
    pub invoice_column: String,
    pub bbox_policy: BboxPolicy,
    pub font_size: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            xml_tag: DEFAULT_XML_TAG.to_string(),
            offsets: Offsets {
                dx: DEFAULT_OFFSET,
                dy: DEFAULT_OFFSET,
            },
            reference_column: DEFAULT_REFERENCE_COLUMN.to_string(),
            invoice_column: DEFAULT_INVOICE_COLUMN.to_string(),
            bbox_policy: BboxPolicy::Skip,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl MatchSettings {
    pub fn resolve(config: &AppConfig, overrides: &MatchOverrides) -> Result<Self> {
        let defaults = Self::default();

        let xml_tag = pick(&overrides.xml_tag, &config.xml_tag, defaults.xml_tag);
        let reference_column = pick(
            &overrides.reference_column,
            &config.reference_column,
            defaults.reference_column,
        );
        let invoice_column = pick(
            &overrides.invoice_column,
            &config.invoice_column,
            defaults.invoice_column,
        );
        let dx = overrides
            .offset_x
            .or(config.offset_x)
            .unwrap_or(defaults.offsets.dx);
        let dy = overrides
            .offset_y
            .or(config.offset_y)
            .unwrap_or(defaults.offsets.dy);
        let bbox_policy = overrides
            .bbox_policy
            .or(config.bbox_policy)
            .unwrap_or(defaults.bbox_policy);
        let font_size = overrides
            .font_size
            .or(config.font_size)
            .unwrap_or(defaults.font_size);

        if xml_tag.trim().is_empty() {
            bail!("xml tag must not be empty");
        }
        if reference_column.trim().is_empty() || invoice_column.trim().is_empty() {
            bail!("ledger column names must not be empty");
        }
        if !dx.is_finite() || !dy.is_finite() {
            bail!("placement offsets must be finite numbers (got {dx}, {dy})");
        }
        if !font_size.is_finite() || font_size <= 0.0 {
            bail!("font size must be a positive number (got {font_size})");
        }

        Ok(Self {
            xml_tag,
            offsets: Offsets { dx, dy },
            reference_column,
            invoice_column,
            bbox_policy,
            font_size,
        })
    }
}

fn pick(cli: &Option<String>, file: &Option<String>, fallback: String) -> String {
    cli.as_ref()
        .or(file.as_ref())
        .cloned()
        .unwrap_or(fallback)
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.is_file() {
        return read_config(default_path);
    }

    debug!("no configuration file found, using defaults");
    Ok(AppConfig::default())
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse configuration {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let config: AppConfig = serde_yaml::from_str(raw)?;
    Ok(config)
}
