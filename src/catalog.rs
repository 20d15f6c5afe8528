//! Snapshot discovery: turns a folder of `<env>_<module>_<nature>_<date>_<time>_<part>_<total>`
//! drops into typed descriptors and reduces them to the effective file set.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{EntityType, SnapshotFile};

/// Where snapshot files live. The pipeline only ever lists and opens.
pub trait SnapshotRepository {
    /// Every candidate file, in a stable order.
    fn list(&self) -> Result<Vec<PathBuf>>;

    /// Opens one file for line-oriented reading. `NotFound` is reported as
    /// such so callers can skip the file instead of failing.
    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + '_>>;
}

#[derive(Debug, Clone)]
pub struct FsSnapshotRepository {
    folder: PathBuf,
}

impl FsSnapshotRepository {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl SnapshotRepository for FsSnapshotRepository {
    fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(folder = %self.folder.display(), "snapshot folder not found");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read {}", self.folder.display()));
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read entry in {}", self.folder.display()))?;
            let path = entry.path();

            if !entry
                .file_type()
                .with_context(|| format!("failed to inspect file type: {}", path.display()))?
                .is_file()
            {
                continue;
            }

            paths.push(path);
        }

        paths.sort();
        Ok(paths)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn BufRead + '_>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Filename shape checks. Date and time tokens must be fixed-width digits so
/// that string order equals chronological order.
pub struct SnapshotNameRules {
    date: Regex,
    time: Regex,
}

impl SnapshotNameRules {
    pub fn new() -> Result<Self> {
        Ok(Self {
            date: Regex::new(r"^\d{8}$").context("failed to compile snapshot date regex")?,
            time: Regex::new(r"^\d{6}$").context("failed to compile snapshot time regex")?,
        })
    }

    pub fn parse(&self, path: &Path) -> std::result::Result<SnapshotFile, String> {
        let stem = path
            .file_stem()
            .and_then(|value| value.to_str())
            .ok_or_else(|| "filename is not valid UTF-8".to_string())?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() < 5 {
            return Err(format!(
                "expected at least 5 '_' separated tokens, found {}",
                tokens.len()
            ));
        }

        let (module, nature, date, time) = (tokens[1], tokens[2], tokens[3], tokens[4]);
        if !self.date.is_match(date) {
            return Err(format!("date token {date:?} is not 8 digits"));
        }
        if !self.time.is_match(time) {
            return Err(format!("time token {time:?} is not 6 digits"));
        }

        Ok(SnapshotFile {
            path: path.to_path_buf(),
            module: module.to_string(),
            entity_type: EntityType::from_module(module),
            nature: nature.to_string(),
            datetime_key: format!("{date}{time}"),
            part_index: tokens.get(5).and_then(|value| value.parse().ok()),
            part_total: tokens.get(6).and_then(|value| value.parse().ok()),
        })
    }
}

/// Lists snapshot files and, unless `no_filter` is set, reduces them to the
/// effective set per entity type: the newest FULL file plus every other file
/// strictly newer than it. The effective set is returned oldest first.
///
/// With `no_filter` every well-formed file passing the entity and start-date
/// filters is returned in repository order, including unknown modules when no
/// entity filter is given.
pub fn list_effective_files(
    repository: &dyn SnapshotRepository,
    entity_filter: Option<EntityType>,
    start_date: &str,
    no_filter: bool,
) -> Result<Vec<SnapshotFile>> {
    let rules = SnapshotNameRules::new()?;
    let mut parsed = Vec::new();

    for path in repository.list()? {
        let file = match rules.parse(&path) {
            Ok(file) => file,
            Err(reason) => {
                warn!(file = %path.display(), reason = %reason, "skipping file with incorrect name format");
                continue;
            }
        };

        if file.date_token() < start_date {
            debug!(file = %path.display(), start_date, "file older than start date");
            continue;
        }

        if let Some(entity) = entity_filter {
            if file.entity_type != Some(entity) {
                continue;
            }
        }

        parsed.push(file);
    }

    if no_filter {
        return Ok(parsed);
    }

    Ok(select_effective(parsed))
}

fn select_effective(files: Vec<SnapshotFile>) -> Vec<SnapshotFile> {
    let typed: Vec<SnapshotFile> = files
        .into_iter()
        .filter(|file| file.entity_type.is_some())
        .collect();

    let mut latest_full: BTreeMap<EntityType, &str> = BTreeMap::new();
    for file in typed.iter().filter(|file| file.is_source_full()) {
        let Some(entity) = file.entity_type else {
            continue;
        };
        let slot = latest_full.entry(entity).or_insert(file.datetime_key.as_str());
        if file.datetime_key.as_str() > *slot {
            *slot = file.datetime_key.as_str();
        }
    }

    let keep: Vec<bool> = typed
        .iter()
        .map(|file| {
            let latest = file
                .entity_type
                .and_then(|entity| latest_full.get(&entity).copied());
            match (file.is_source_full(), latest) {
                (true, Some(latest)) => file.datetime_key == latest,
                (false, Some(latest)) => file.datetime_key.as_str() > latest,
                (_, None) => true,
            }
        })
        .collect();

    let mut effective: Vec<SnapshotFile> = typed
        .into_iter()
        .zip(keep)
        .filter_map(|(file, keep)| keep.then_some(file))
        .collect();

    sort_snapshot_files(&mut effective);
    effective
}

/// Oldest first; parts of one drop in part order, then by path.
pub fn sort_snapshot_files(files: &mut [SnapshotFile]) {
    files.sort_by(|a, b| {
        a.datetime_key
            .cmp(&b.datetime_key)
            .then(a.part_index.cmp(&b.part_index))
            .then(a.path.cmp(&b.path))
    });
}


#[cfg(test)]
mod tests {
    use super::memory::MemorySnapshotRepository;
    use super::*;

    fn names(files: &[SnapshotFile]) -> Vec<String> {
        files
            .iter()
            .map(|file| file.path.display().to_string())
            .collect()
    }

    #[test]
    fn parse_reads_tokens_and_ignores_extension() {
        let rules = SnapshotNameRules::new().expect("rules should compile");
        let file = rules
            .parse(Path::new("/drop/S4P_ARTICLE_DELTA_20250202_134501_2_3.CSV"))
            .expect("name should parse");

        assert_eq!(file.module, "ARTICLE");
        assert_eq!(file.entity_type, Some(EntityType::Article));
        assert_eq!(file.nature, "DELTA");
        assert_eq!(file.datetime_key, "20250202134501");
        assert_eq!(file.part_index, Some(2));
        assert_eq!(file.part_total, Some(3));
        assert!(!file.is_full());
    }

    #[test]
    fn parse_rejects_short_and_non_padded_names() {
        let rules = SnapshotNameRules::new().expect("rules should compile");
        assert!(rules.parse(Path::new("README.md")).is_err());
        assert!(rules.parse(Path::new("S4P_ARTICLE_FULL_2025011")).is_err());
        assert!(rules.parse(Path::new("S4P_ARTICLE_FULL_2025011_000000")).is_err());
        assert!(rules.parse(Path::new("S4P_ARTICLE_FULL_20250110_0000")).is_err());
    }

    #[test]
    fn module_lookup_is_case_insensitive() {
        assert_eq!(EntityType::from_module("CostCenter"), Some(EntityType::CostCenter));
        assert_eq!(EntityType::from_module("BUSSINESSAREA"), Some(EntityType::BusinessArea));
        assert_eq!(EntityType::from_module("vendor"), None);
    }

    #[test]
    fn effective_set_keeps_latest_full_and_newer_deltas() {
        let repository = MemorySnapshotRepository::default()
            .with("E_ARTICLE_FULL_20250101_000000_1_1", "")
            .with("E_ARTICLE_DELTA_20250102_000000_1_1", "")
            .with("E_ARTICLE_FULL_20250103_000000_1_1", "")
            .with("E_ARTICLE_DELTA_20250104_000000_1_1", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "E_ARTICLE_FULL_20250103_000000_1_1",
                "E_ARTICLE_DELTA_20250104_000000_1_1",
            ]
        );
    }

    #[test]
    fn delta_with_same_key_as_full_is_dropped() {
        let repository = MemorySnapshotRepository::default()
            .with("E_BRAND_FULL_20250103_000000_1_1", "")
            .with("E_BRAND_DELTA_20250103_000000_1_1", "")
            .with("E_BRAND_DELTA_20250103_000001_1_1", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "E_BRAND_FULL_20250103_000000_1_1",
                "E_BRAND_DELTA_20250103_000001_1_1",
            ]
        );
    }

    #[test]
    fn without_full_every_file_passes_sorted_by_key() {
        let repository = MemorySnapshotRepository::default()
            .with("E_CATEGORY_DELTA_20250105_000000_1_1", "")
            .with("E_CATEGORY_CHANGE_20250102_000000_1_1", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "E_CATEGORY_CHANGE_20250102_000000_1_1",
                "E_CATEGORY_DELTA_20250105_000000_1_1",
            ]
        );
    }

    #[test]
    fn effective_set_is_computed_per_entity_type() {
        let repository = MemorySnapshotRepository::default()
            .with("E_ARTICLE_FULL_20250110_000000_1_1", "")
            .with("E_BRAND_DELTA_20250105_000000_1_1", "")
            .with("E_BRAND_FULL_20250101_000000_1_1", "")
            .with("E_ARTICLE_DELTA_20250105_000000_1_1", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "E_BRAND_FULL_20250101_000000_1_1",
                "E_BRAND_DELTA_20250105_000000_1_1",
                "E_ARTICLE_FULL_20250110_000000_1_1",
            ]
        );

        let brands =
            list_effective_files(&repository, Some(EntityType::Brand), "", false).expect("listing");
        assert_eq!(brands.len(), 2);
    }

    #[test]
    fn equal_full_keys_are_all_kept_in_part_order() {
        let repository = MemorySnapshotRepository::default()
            .with("E_ARTICLE_FULL_20250103_000000_2_2", "")
            .with("E_ARTICLE_FULL_20250103_000000_1_2", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "E_ARTICLE_FULL_20250103_000000_1_2",
                "E_ARTICLE_FULL_20250103_000000_2_2",
            ]
        );
    }

    #[test]
    fn extraction_artifact_does_not_hide_same_day_source_files() {
        let repository = MemorySnapshotRepository::default()
            .with("S4P_ARTICLE_FULL_20250201_000000_1_1", "")
            .with("S4P_ARTICLE_FULL_20250305_999999_1_1", "")
            .with("S4P_ARTICLE_DELTA_20250305_060000_1_1", "")
            .with("S4P_ARTICLE_FULL_20250305_050000_1_1", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "S4P_ARTICLE_FULL_20250305_050000_1_1",
                "S4P_ARTICLE_DELTA_20250305_060000_1_1",
                "S4P_ARTICLE_FULL_20250305_999999_1_1",
            ]
        );
    }

    #[test]
    fn artifact_alone_does_not_replace_the_latest_full() {
        let repository = MemorySnapshotRepository::default()
            .with("S4P_BRAND_FULL_20250201_000000_1_1", "")
            .with("S4P_BRAND_FULL_20250301_999999_1_1", "");

        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(
            names(&files),
            vec![
                "S4P_BRAND_FULL_20250201_000000_1_1",
                "S4P_BRAND_FULL_20250301_999999_1_1",
            ]
        );
    }

    #[test]
    fn sort_puts_parts_in_numeric_order() {
        let rules = SnapshotNameRules::new().expect("rules");
        let mut files: Vec<SnapshotFile> = [
            "E_ARTICLE_FULL_20250103_000000_10_12",
            "E_ARTICLE_FULL_20250103_000000_2_12",
            "E_ARTICLE_DELTA_20250102_000000_1_1",
        ]
        .iter()
        .map(|name| rules.parse(Path::new(name)).expect("valid name"))
        .collect();

        sort_snapshot_files(&mut files);
        assert_eq!(
            names(&files),
            vec![
                "E_ARTICLE_DELTA_20250102_000000_1_1",
                "E_ARTICLE_FULL_20250103_000000_2_12",
                "E_ARTICLE_FULL_20250103_000000_10_12",
            ]
        );
    }

    #[test]
    fn start_date_and_unknown_modules_are_filtered() {
        let repository = MemorySnapshotRepository::default()
            .with("E_ARTICLE_FULL_20241231_000000_1_1", "")
            .with("E_ARTICLE_DELTA_20250101_000000_1_1", "")
            .with("E_VENDOR_FULL_20250101_000000_1_1", "")
            .with("notes.txt", "");

        let effective = list_effective_files(&repository, None, "20250101", false).expect("listing");
        assert_eq!(names(&effective), vec!["E_ARTICLE_DELTA_20250101_000000_1_1"]);

        let raw = list_effective_files(&repository, None, "", true).expect("listing");
        assert_eq!(raw.len(), 3);
        assert!(raw.iter().any(|file| file.entity_type.is_none()));
    }

    #[test]
    fn missing_folder_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let repository = FsSnapshotRepository::new(dir.path().join("absent"));
        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert!(files.is_empty());
    }

    #[test]
    fn filesystem_repository_lists_regular_files_only() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::create_dir(dir.path().join("E_ARTICLE_FULL_20250101_000000_1_1"))
            .expect("directory should be created");
        fs::write(dir.path().join("E_ARTICLE_FULL_20250102_000000_1_1.CSV"), "MATNR\n")
            .expect("fixture should be written");

        let repository = FsSnapshotRepository::new(dir.path());
        let files = list_effective_files(&repository, None, "", false).expect("listing");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].datetime_key, "20250102000000");
    }
}
