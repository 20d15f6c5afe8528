//! Recovers the original source lines for a set of ids by rescanning raw
//! snapshot files rather than reading the store.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::catalog::SnapshotRepository;
use crate::entity::ColumnMapping;
use crate::model::ExtractionReport;
use crate::util::ensure_directory;

const FIELD_DELIMITER: u8 = b'|';

/// Which pipe-delimited field of a data line carries the id.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum IdColumn {
    First,
    /// Resolved per file from that file's header row.
    Named(String),
}

/// Pulls the id out of a raw line and normalizes it the way the store key
/// was normalized on import.
#[derive(Debug, Clone)]
pub struct IdExtractor {
    pub column: IdColumn,
    pub mapping: ColumnMapping,
}

impl IdExtractor {
    pub fn new(column: IdColumn, mapping: ColumnMapping) -> Self {
        Self { column, mapping }
    }

    fn resolve_index(&self, header: &[u8]) -> Option<usize> {
        match &self.column {
            IdColumn::First => Some(0),
            IdColumn::Named(name) => {
                let header = String::from_utf8_lossy(trim_line_ending(header));
                header
                    .trim_start_matches('\u{feff}')
                    .split('|')
                    .position(|field| field.trim() == name)
            }
        }
    }

    /// `None` for blank lines and lines too short to reach the id column.
    fn extract(&self, line: &[u8], index: usize) -> Option<String> {
        let line = trim_line_ending(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let field = line.split(|byte| *byte == FIELD_DELIMITER).nth(index)?;
        let raw = String::from_utf8_lossy(field);
        Some(self.mapping.normalize(Some(&raw)))
    }
}

/// Writes to `output_path` the verbatim source line of every id in
/// `target_ids`, scanning `source_files` in the given order.
///
/// Each id is written at most once: the first file in the list that contains
/// it wins, so callers pass newest first. The header of the first readable
/// file is written once. Missing files, files that fail while being read, and
/// blank or short lines are skipped and counted; only output errors abort. No output file is created when there is nothing to
/// look for.
pub fn extract_matching_raw_lines(
    repository: &dyn SnapshotRepository,
    source_files: &[PathBuf],
    mut target_ids: HashSet<String>,
    extractor: &IdExtractor,
    output_path: &Path,
) -> Result<ExtractionReport> {
    let mut report = ExtractionReport {
        output_path: output_path.display().to_string(),
        requested_ids: target_ids.len(),
        ..ExtractionReport::default()
    };

    if target_ids.is_empty() {
        info!(output = %output_path.display(), "no ids to extract");
        return Ok(report);
    }

    info!(
        ids = target_ids.len(),
        files = source_files.len(),
        "searching source files for original lines"
    );

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }
    let file = File::create(output_path)
        .with_context(|| format!("failed to create {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    for source in source_files {
        if target_ids.is_empty() {
            break;
        }
        if source == output_path {
            warn!(file = %source.display(), "skipping source that is the extraction output");
            continue;
        }

        let reader = match repository.open(source) {
            Ok(reader) => reader,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(file = %source.display(), "source file not found, skipping");
                report.missing_files += 1;
                continue;
            }
            Err(err) => {
                warn!(file = %source.display(), error = %err, "failed to open source file, skipping");
                report.missing_files += 1;
                continue;
            }
        };

        scan_file(
            reader,
            source,
            &mut target_ids,
            extractor,
            &mut writer,
            &mut report,
        )
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    report.unresolved_ids = target_ids.len();
    info!(
        output = %output_path.display(),
        written = report.lines_written,
        malformed = report.malformed_lines,
        unresolved = report.unresolved_ids,
        "extraction complete"
    );
    Ok(report)
}

fn scan_file(
    mut reader: Box<dyn BufRead + '_>,
    source: &Path,
    target_ids: &mut HashSet<String>,
    extractor: &IdExtractor,
    writer: &mut impl Write,
    report: &mut ExtractionReport,
) -> Result<()> {
    let mut header = Vec::new();
    match reader.read_until(b'\n', &mut header) {
        Ok(0) => {
            debug!(file = %source.display(), "empty source file");
            return Ok(());
        }
        Ok(_) => {}
        Err(err) => {
            warn!(file = %source.display(), error = %err, "failed to read source header, skipping");
            report.unreadable_files += 1;
            return Ok(());
        }
    }

    let Some(index) = extractor.resolve_index(&header) else {
        warn!(
            file = %source.display(),
            column = ?extractor.column,
            "id column not found in header, skipping file"
        );
        return Ok(());
    };

    if !report.header_written {
        write_line(writer, &header)?;
        report.header_written = true;
    }

    let mut line = Vec::new();
    let mut line_number = 1_usize;
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(
                    file = %source.display(),
                    line = line_number + 1,
                    error = %err,
                    "read failed mid-file, moving to next source"
                );
                report.unreadable_files += 1;
                break;
            }
        }
        line_number += 1;

        let Some(id) = extractor.extract(&line, index) else {
            report.malformed_lines += 1;
            debug!(file = %source.display(), line = line_number, "line has no id column");
            continue;
        };

        if target_ids.remove(&id) {
            write_line(writer, &line)?;
            report.lines_written += 1;
            if target_ids.is_empty() {
                break;
            }
        }
    }

    Ok(())
}

/// Writes `line` byte for byte, adding a newline only when the source line
/// was the unterminated last line of its file.
fn write_line(writer: &mut impl Write, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    if !line.ends_with(b"\n") {
        writer.write_all(b"\n")?;
    }
    Ok(())
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::catalog::memory::MemorySnapshotRepository;
    use crate::entity::EntityDescriptor;
    use crate::model::EntityType;

    fn article_extractor(column: IdColumn) -> IdExtractor {
        let descriptor = EntityDescriptor::for_entity(EntityType::Article).expect("descriptor");
        IdExtractor::new(column, descriptor.id)
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn matching_line_is_written_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default().with(
            "new",
            "MATNR|MAKTX|QTY\r\nAB-12|Widget|100\r\nZZ-9|Other|1\r\n",
        );

        let report = extract_matching_raw_lines(
            &repository,
            &[PathBuf::from("new")],
            ids(&["AB12"]),
            &article_extractor(IdColumn::First),
            &output,
        )
        .expect("extraction");

        assert_eq!(report.lines_written, 1);
        assert_eq!(report.unresolved_ids, 0);
        let written = fs::read(&output).expect("output exists");
        assert_eq!(written, b"MATNR|MAKTX|QTY\r\nAB-12|Widget|100\r\n");
    }

    #[test]
    fn newest_file_wins_and_header_is_written_once() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default()
            .with("newer", "MATNR|MAKTX\nX|new text\n")
            .with("older", "MATNR|MAKTX\nX|old text\nY|old y")
            .with("oldest", "MATNR|MAKTX\nZ|z\n");

        let report = extract_matching_raw_lines(
            &repository,
            &[
                PathBuf::from("newer"),
                PathBuf::from("missing"),
                PathBuf::from("older"),
                PathBuf::from("oldest"),
            ],
            ids(&["X", "Y"]),
            &article_extractor(IdColumn::First),
            &output,
        )
        .expect("extraction");

        assert_eq!(report.lines_written, 2);
        assert_eq!(report.missing_files, 1);
        assert!(report.header_written);
        let written = fs::read_to_string(&output).expect("output exists");
        assert_eq!(written, "MATNR|MAKTX\nX|new text\nY|old y\n");
    }

    #[test]
    fn named_column_is_resolved_from_header_and_short_lines_are_counted() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default().with(
            "file",
            "\u{feff}MAKTX|MATNR\nWidget|AB_12\nbroken\nOther|CD-3\n",
        );

        let report = extract_matching_raw_lines(
            &repository,
            &[PathBuf::from("file")],
            ids(&["AB12", "NOPE"]),
            &article_extractor(IdColumn::Named("MATNR".to_string())),
            &output,
        )
        .expect("extraction");

        assert_eq!(report.lines_written, 1);
        assert_eq!(report.malformed_lines, 1);
        assert_eq!(report.unresolved_ids, 1);
        let written = fs::read_to_string(&output).expect("output exists");
        assert!(written.ends_with("Widget|AB_12\n"));
    }

    #[test]
    fn blank_lines_are_malformed_not_defaulted_ids() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default()
            .with("brands", "BRAND_ID|BRAND_DESCR\n\n  \r\n|Unbranded\n");
        let descriptor = EntityDescriptor::for_entity(EntityType::Brand).expect("descriptor");

        let report = extract_matching_raw_lines(
            &repository,
            &[PathBuf::from("brands")],
            ids(&["000"]),
            &IdExtractor::new(IdColumn::First, descriptor.id),
            &output,
        )
        .expect("extraction");

        assert_eq!(report.malformed_lines, 2);
        assert_eq!(report.lines_written, 1);
        let written = fs::read_to_string(&output).expect("output exists");
        assert_eq!(written, "BRAND_ID|BRAND_DESCR\n|Unbranded\n");
    }

    #[test]
    fn read_failure_skips_the_rest_of_that_file_only() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default()
            .with_broken("newer", "MATNR|MAKTX\nA|a\n")
            .with("older", "MATNR|MAKTX\nZ|z\n");

        let report = extract_matching_raw_lines(
            &repository,
            &[PathBuf::from("newer"), PathBuf::from("older")],
            ids(&["A", "B", "Z"]),
            &article_extractor(IdColumn::First),
            &output,
        )
        .expect("extraction continues past the failing file");

        assert_eq!(report.unreadable_files, 1);
        assert_eq!(report.lines_written, 2);
        assert_eq!(report.unresolved_ids, 1);
        let written = fs::read_to_string(&output).expect("output exists");
        assert_eq!(written, "MATNR|MAKTX\nA|a\nZ|z\n");
    }

    #[test]
    fn empty_target_set_creates_no_output() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default().with("file", "MATNR\nA\n");

        let report = extract_matching_raw_lines(
            &repository,
            &[PathBuf::from("file")],
            HashSet::new(),
            &article_extractor(IdColumn::First),
            &output,
        )
        .expect("extraction");

        assert_eq!(report.lines_written, 0);
        assert!(!output.exists());
    }

    #[test]
    fn scanning_stops_once_every_id_is_found() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let output = dir.path().join("out");
        let repository = MemorySnapshotRepository::default()
            .with("first", "MATNR\nA\n")
            .with("second", "OTHER_HEADER\nA\n");

        let report = extract_matching_raw_lines(
            &repository,
            &[PathBuf::from("first"), PathBuf::from("second")],
            ids(&["A"]),
            &article_extractor(IdColumn::First),
            &output,
        )
        .expect("extraction");

        assert_eq!(report.lines_written, 1);
        let written = fs::read_to_string(&output).expect("output exists");
        assert_eq!(written, "MATNR\nA\n");
    }
}
