use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::BboxPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "txn2invoice",
    version,
    about = "Match QR payment references on a bank statement against an invoice ledger"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub xml: PathBuf,

    #[arg(long)]
    pub xml_tag: Option<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    #[arg(long)]
    pub xml: PathBuf,

    #[arg(long)]
    pub ledger: PathBuf,

    #[arg(long)]
    pub template_pdf: Option<PathBuf>,

    #[arg(long, requires = "template_pdf")]
    pub output_pdf: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: MatchOverrides,

    #[arg(long, default_value_t = false)]
    pub require_all_matched: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MatchOverrides {
    #[arg(long)]
    pub xml_tag: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    pub offset_x: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub offset_y: Option<f64>,

    #[arg(long)]
    pub reference_column: Option<String>,

    #[arg(long)]
    pub invoice_column: Option<String>,

    #[arg(long, value_enum)]
    pub bbox_policy: Option<BboxPolicy>,

    #[arg(long)]
    pub font_size: Option<f64>,
}
