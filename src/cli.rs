use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::model::EntityType;

#[derive(Parser, Debug)]
#[command(
    name = "mdrecon",
    version,
    about = "Master-data snapshot reconciliation and delta extraction"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show which snapshot files a run would consider.
    List(ListArgs),
    /// Fold unseen snapshot files into the store, then extract changed lines.
    Import(ImportArgs),
    /// Rebuild raw lines for ids selected by import date or business key.
    Extract(ExtractArgs),
    /// Row counts per import date.
    Summary(SummaryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, value_enum)]
    pub entity: EntityType,

    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    /// Defaults to `<data-root>/<entity db file>`.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub table: Option<String>,

    #[arg(long)]
    pub ledger_table: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long)]
    pub source_dir: PathBuf,

    #[arg(long, value_enum)]
    pub entity: Option<EntityType>,

    /// Minimum `YYYYMMDD` date token.
    #[arg(long, default_value = "")]
    pub start_date: String,

    /// List every well-formed file instead of the effective set.
    #[arg(long, default_value_t = false)]
    pub all_history: bool,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub source_dir: PathBuf,

    #[arg(long, default_value = "")]
    pub start_date: String,

    /// Import every historical file rather than only the effective set.
    #[arg(long, default_value_t = false)]
    pub all_history: bool,

    #[arg(long, default_value_t = false)]
    pub skip_extract: bool,

    /// Environment token used when naming the extraction output.
    #[arg(long, default_value = "S4P")]
    pub env_prefix: String,

    /// Defaults to the source directory.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Header name of the id column; the first column is used when absent.
    #[arg(long)]
    pub id_column: Option<String>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub source_dir: PathBuf,

    /// Extract ids imported strictly after this date (YYYY-MM-DD).
    #[arg(
        long,
        conflicts_with_all = ["key_pairs", "missing_from"],
        required_unless_present_any = ["key_pairs", "missing_from"]
    )]
    pub since: Option<NaiveDate>,

    /// Extract ids whose business key matches, as `CATEGORY:BRAND`. Repeatable.
    #[arg(long = "match", value_parser = parse_key_pair)]
    pub key_pairs: Vec<(String, String)>,

    /// Extract ids listed in this reference table (same database) but absent
    /// from the entity table.
    #[arg(long, conflicts_with = "key_pairs")]
    pub missing_from: Option<String>,

    #[arg(long, default_value_t = false)]
    pub all_history: bool,

    #[arg(long, default_value = "S4P")]
    pub env_prefix: String,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub id_column: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn parse_key_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once(':') {
        Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            Ok((left.to_string(), right.to_string()))
        }
        _ => Err(format!("expected CATEGORY:BRAND, got {value:?}")),
    }
}
