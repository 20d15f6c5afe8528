use std::collections::HashMap;
use std::io;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::{error, info, warn};

use crate::catalog::{
    FsSnapshotRepository, SnapshotRepository, list_effective_files, sort_snapshot_files,
};
use crate::cli::ImportArgs;
use crate::entity::EntityDescriptor;
use crate::extract::extract_matching_raw_lines;
use crate::model::{
    EntityRecord, ImportRunManifest, ImportedFileEntry, SnapshotFile, UpsertOutcome,
};
use crate::store::{ImportLedger, ReconciliationStore, UPSERT_CHUNK_SIZE};
use crate::util::{
    now_utc_string, sha256_reader, today_date_token, utc_compact_string, write_json_pretty,
};

use super::{extraction_file_name, id_extractor, resolve_store};

mod pipeline;
mod rows;
mod run;

pub use run::run;

use pipeline::*;
use rows::*;
use run::*;
