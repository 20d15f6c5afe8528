use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::util::parse_date_token;

pub const FULL_NATURE: &str = "FULL";

/// Time token stamped on files this tool writes back into a source folder.
pub const EXTRACTION_TIME_TOKEN: &str = "999999";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Category,
    Brand,
    Article,
    Company,
    BusinessArea,
    CostCenter,
}

impl EntityType {
    /// Resolves the module token of a snapshot filename, ignoring case.
    pub fn from_module(module: &str) -> Option<Self> {
        match module.to_ascii_lowercase().as_str() {
            "category" => Some(Self::Category),
            "brand" => Some(Self::Brand),
            "article" => Some(Self::Article),
            "company" => Some(Self::Company),
            "bussinessarea" => Some(Self::BusinessArea),
            "costcenter" => Some(Self::CostCenter),
            _ => None,
        }
    }

    /// Module token as it appears in snapshot filenames.
    pub fn module_token(self) -> &'static str {
        match self {
            Self::Category => "CATEGORY",
            Self::Brand => "BRAND",
            Self::Article => "ARTICLE",
            Self::Company => "COMPANY",
            Self::BusinessArea => "BUSSINESSAREA",
            Self::CostCenter => "COSTCENTER",
        }
    }
}

/// One dated snapshot drop parsed from its filename.
///
/// `datetime_key` is `<date><time>` as written in the filename. Ordering is
/// plain string ordering, which is only meaningful because both tokens are
/// fixed-width and zero-padded; the catalog rejects names that are not.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub module: String,
    pub entity_type: Option<EntityType>,
    pub nature: String,
    pub datetime_key: String,
    pub part_index: Option<u32>,
    pub part_total: Option<u32>,
}

impl SnapshotFile {
    pub fn is_full(&self) -> bool {
        self.nature == FULL_NATURE
    }

    pub fn date_token(&self) -> &str {
        self.datetime_key.get(..8).unwrap_or(&self.datetime_key)
    }

    pub fn time_token(&self) -> &str {
        self.datetime_key.get(8..).unwrap_or_default()
    }

    pub fn is_extraction_artifact(&self) -> bool {
        self.time_token() == EXTRACTION_TIME_TOKEN
    }

    /// A FULL drop from the source system. Extraction artifacts carry the
    /// FULL token too but never replace the source history.
    pub fn is_source_full(&self) -> bool {
        self.is_full() && !self.is_extraction_artifact()
    }

    /// Date stamped on every row this file contributes.
    pub fn imported_date(&self) -> Option<NaiveDate> {
        parse_date_token(&self.datetime_key)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EntityRecord {
    pub id: String,
    pub display_text: String,
    /// Values for the descriptor's extra columns, in descriptor order.
    pub extras: Vec<String>,
    pub imported_at: NaiveDate,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ImportDateCount {
    pub imported_at: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct UpsertOutcome {
    pub records_submitted: usize,
    pub chunks_applied: usize,
    pub chunks_failed: usize,
    /// Rows inserted or changed; rows suppressed as unchanged are not counted.
    pub rows_written: usize,
}

impl UpsertOutcome {
    pub fn absorb(&mut self, other: &UpsertOutcome) {
        self.records_submitted += other.records_submitted;
        self.chunks_applied += other.chunks_applied;
        self.chunks_failed += other.chunks_failed;
        self.rows_written += other.rows_written;
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub output_path: String,
    pub requested_ids: usize,
    pub lines_written: usize,
    pub malformed_lines: usize,
    pub missing_files: usize,
    /// Files that failed while being read; lines already copied are kept.
    pub unreadable_files: usize,
    pub unresolved_ids: usize,
    pub header_written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedFileEntry {
    pub path: String,
    pub datetime_key: String,
    pub imported_at: NaiveDate,
    pub sha256: String,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub upsert: UpsertOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub entity_type: EntityType,
    pub started_at: String,
    pub updated_at: String,
    pub source_directory: String,
    pub db_path: String,
    pub table_name: String,
    pub ledger_table_name: String,
    pub candidate_file_count: usize,
    pub imported_files: Vec<ImportedFileEntry>,
    pub already_imported_files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub extraction_threshold: Option<NaiveDate>,
    pub extraction: Option<ExtractionReport>,
    pub summary: Vec<ImportDateCount>,
    pub warnings: Vec<String>,
}
