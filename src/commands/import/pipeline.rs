use super::*;

/// Accumulated state of one import run, threaded explicitly through the
/// per-file fold and handed to extraction afterwards.
#[derive(Debug, Default)]
pub(super) struct ImportProgress {
    /// Date of the newest extraction artifact seen, i.e. the previous run.
    pub(super) last_extraction_date: Option<NaiveDate>,
    pub(super) last_file_date: Option<NaiveDate>,
    pub(super) imported: Vec<ImportedFileEntry>,
    pub(super) already_imported: Vec<String>,
    pub(super) skipped: Vec<String>,
    pub(super) warnings: Vec<String>,
}

impl ImportProgress {
    /// Ids imported strictly after this date are considered changed.
    pub(super) fn extraction_threshold(&self) -> Option<NaiveDate> {
        self.last_extraction_date.or(self.last_file_date)
    }

    fn skip(mut self, path: String, warning: String) -> Self {
        self.skipped.push(path);
        self.warnings.push(warning);
        self
    }
}

#[derive(Debug, Default)]
pub(super) struct FileImport {
    pub(super) rows_read: usize,
    pub(super) rows_skipped: usize,
    pub(super) upsert: UpsertOutcome,
}

/// Folds `files` (oldest first) into the store. Only files the ledger has not
/// seen are read; failures are recorded per file and never stop the run.
pub(super) fn import_files(
    repository: &dyn SnapshotRepository,
    ledger: &ImportLedger,
    store: &ReconciliationStore,
    files: &[SnapshotFile],
) -> ImportProgress {
    files.iter().fold(ImportProgress::default(), |progress, file| {
        import_step(repository, ledger, store, progress, file)
    })
}

fn import_step(
    repository: &dyn SnapshotRepository,
    ledger: &ImportLedger,
    store: &ReconciliationStore,
    mut progress: ImportProgress,
    file: &SnapshotFile,
) -> ImportProgress {
    let path = file.path.display().to_string();

    let Some(imported_at) = file.imported_date() else {
        warn!(file = %path, key = %file.datetime_key, "unparsable file date, skipping");
        let warning = format!("{path}: unparsable date {}", file.datetime_key);
        return progress.skip(path, warning);
    };

    if file.is_extraction_artifact() {
        progress.last_extraction_date = Some(imported_at);
    }
    progress.last_file_date = Some(imported_at);

    match ledger.mark_imported_if_new(&path) {
        Ok(false) => {
            info!(file = %path, "already imported");
            progress.already_imported.push(path);
            progress
        }
        Err(err) => {
            error!(file = %path, error = %format!("{err:#}"), "ledger check failed, skipping");
            let warning = format!("{path}: ledger check failed: {err:#}");
            progress.skip(path, warning)
        }
        Ok(true) => match import_file(repository, store, &file.path, imported_at) {
            Ok(result) => {
                let sha256 = match repository
                    .open(&file.path)
                    .map_err(anyhow::Error::from)
                    .and_then(sha256_reader)
                {
                    Ok(digest) => digest,
                    Err(err) => {
                        warn!(file = %path, error = %err, "failed to hash imported file");
                        String::new()
                    }
                };

                info!(
                    file = %path,
                    imported_at = %imported_at,
                    rows = result.rows_read,
                    skipped = result.rows_skipped,
                    written = result.upsert.rows_written,
                    "processed file"
                );
                progress.imported.push(ImportedFileEntry {
                    path,
                    datetime_key: file.datetime_key.clone(),
                    imported_at,
                    sha256,
                    rows_read: result.rows_read,
                    rows_skipped: result.rows_skipped,
                    upsert: result.upsert,
                });
                progress
            }
            Err(err) => {
                error!(file = %path, error = %format!("{err:#}"), "failed to import file");
                let warning = format!("{path}: {err:#}");
                progress.skip(path, warning)
            }
        },
    }
}

/// Reads one pipe-delimited snapshot and upserts its rows in chunks, every
/// row stamped with `imported_at`.
pub(super) fn import_file(
    repository: &dyn SnapshotRepository,
    store: &ReconciliationStore,
    path: &Path,
    imported_at: NaiveDate,
) -> Result<FileImport> {
    let descriptor = store.descriptor();
    let reader = repository.open(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            anyhow::anyhow!("file not found: {}", path.display())
        } else {
            anyhow::Error::from(err).context(format!("failed to open {}", path.display()))
        }
    })?;

    let mut csv_reader = ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(true)
        .from_reader(reader);
    let header = HeaderIndex::new(
        csv_reader
            .headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?,
    );
    if !header.contains(descriptor.id.source_field) {
        bail!(
            "header of {} has no {} column",
            path.display(),
            descriptor.id.source_field
        );
    }

    let mut result = FileImport::default();
    let mut chunk = Vec::with_capacity(UPSERT_CHUNK_SIZE);

    for row in csv_reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(err) if err.is_io_error() => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping malformed row");
                result.rows_skipped += 1;
                continue;
            }
        };
        result.rows_read += 1;

        match record_from_row(descriptor, &header, &row, imported_at) {
            Ok(record) => chunk.push(record),
            Err(reason) => {
                let line = row.position().map(|position| position.line()).unwrap_or_default();
                warn!(file = %path.display(), line, reason = %reason, "skipping row");
                result.rows_skipped += 1;
                continue;
            }
        }

        if chunk.len() == UPSERT_CHUNK_SIZE {
            result.upsert.absorb(&store.upsert_batch(&chunk)?);
            chunk.clear();
        }
    }

    if !chunk.is_empty() {
        result.upsert.absorb(&store.upsert_batch(&chunk)?);
    }

    Ok(result)
}
