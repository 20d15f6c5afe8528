use super::*;

pub fn run(args: ImportArgs) -> Result<()> {
    let today = today_date_token();
    let manifest = run_import(&args, &today)?;

    if let Some(manifest_path) = &args.manifest_path {
        write_json_pretty(manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), "wrote import run manifest");
    }

    if !manifest.skipped_files.is_empty() {
        warn!(
            skipped = manifest.skipped_files.len(),
            "some files could not be imported"
        );
    }

    Ok(())
}

/// One scheduled run for a single entity: ledger-gated import of every
/// candidate file, then extraction of the ids changed since the previous run.
pub(super) fn run_import(args: &ImportArgs, today: &str) -> Result<ImportRunManifest> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("import-{}", utc_compact_string(started_ts));

    let (store, ledger) = resolve_store(&args.store)?;
    let descriptor = store.descriptor();
    let entity = descriptor.entity_type;

    info!(
        run_id = %run_id,
        entity = ?entity,
        source = %args.source_dir.display(),
        db = %store.db_path().display(),
        "starting import"
    );

    ledger
        .ensure_table()
        .context("cannot import without the ledger table")?;
    store
        .ensure_table()
        .context("cannot import without the record table")?;

    let repository = FsSnapshotRepository::new(&args.source_dir);
    let mut files =
        list_effective_files(&repository, Some(entity), &args.start_date, args.all_history)?;
    sort_snapshot_files(&mut files);
    info!(files = files.len(), "candidate files");

    let progress = import_files(&repository, &ledger, &store, &files);

    let summary = store.summarize_by_import_date()?;
    for row in &summary {
        info!(imported_at = %row.imported_at, count = row.count, "summary by import date");
    }

    let extraction_threshold = progress.extraction_threshold();
    let extraction = match (args.skip_extract, extraction_threshold) {
        (true, _) => None,
        (false, None) => {
            warn!("no dated files seen, skipping extraction");
            None
        }
        (false, Some(threshold)) => {
            info!(threshold = %threshold, "extracting ids imported after threshold");
            let target_ids = store.query_ids_newer_than(threshold)?;
            let newest_first: Vec<_> = files.iter().rev().map(|file| file.path.clone()).collect();
            let output_dir = args
                .output_dir
                .clone()
                .unwrap_or_else(|| repository.folder().to_path_buf());
            let output_path =
                output_dir.join(extraction_file_name(&args.env_prefix, &store, today));

            Some(extract_matching_raw_lines(
                &repository,
                &newest_first,
                target_ids,
                &id_extractor(&store, args.id_column.as_deref()),
                &output_path,
            )?)
        }
    };

    Ok(ImportRunManifest {
        manifest_version: 1,
        run_id,
        entity_type: entity,
        started_at,
        updated_at: now_utc_string(),
        source_directory: args.source_dir.display().to_string(),
        db_path: store.db_path().display().to_string(),
        table_name: descriptor.table_name.clone(),
        ledger_table_name: descriptor.ledger_table_name.clone(),
        candidate_file_count: files.len(),
        imported_files: progress.imported,
        already_imported_files: progress.already_imported,
        skipped_files: progress.skipped,
        extraction_threshold,
        extraction,
        summary,
        warnings: progress.warnings,
    })
}
