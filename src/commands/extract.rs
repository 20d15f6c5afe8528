use anyhow::Result;
use tracing::info;

use crate::catalog::{FsSnapshotRepository, list_effective_files, sort_snapshot_files};
use crate::cli::ExtractArgs;
use crate::extract::extract_matching_raw_lines;
use crate::util::{today_date_token, utc_compact_string};

use super::{extraction_file_name, id_extractor, resolve_store};

/// Ad hoc extraction without importing: ids are selected from the store by
/// import date, by business key, or as keys missing against a reference
/// table; lines come from the raw files.
pub fn run(args: ExtractArgs) -> Result<()> {
    let (store, _) = resolve_store(&args.store)?;
    let entity = store.descriptor().entity_type;
    let report_name = |kind: &str| {
        args.store.data_root.join(format!(
            "{}_{kind}_{}.csv",
            entity.module_token(),
            utc_compact_string(chrono::Utc::now())
        ))
    };

    let (target_ids, default_output) = if let Some(threshold) = args.since {
        (
            store.query_ids_newer_than(threshold)?,
            args.source_dir
                .join(extraction_file_name(&args.env_prefix, &store, &today_date_token())),
        )
    } else if let Some(reference_table) = &args.missing_from {
        (
            store.query_ids_missing_from(reference_table)?,
            report_name("MISSING"),
        )
    } else {
        (
            store.query_ids_by_key_pairs(&args.key_pairs)?,
            report_name("MATCH"),
        )
    };

    let repository = FsSnapshotRepository::new(&args.source_dir);
    let mut files = list_effective_files(&repository, Some(entity), "", args.all_history)?;
    sort_snapshot_files(&mut files);
    files.reverse();
    let newest_first: Vec<_> = files.into_iter().map(|file| file.path).collect();

    let output_path = args.output.clone().unwrap_or(default_output);

    let report = extract_matching_raw_lines(
        &repository,
        &newest_first,
        target_ids,
        &id_extractor(&store, args.id_column.as_deref()),
        &output_path,
    )?;

    info!(
        output = %report.output_path,
        requested = report.requested_ids,
        written = report.lines_written,
        unresolved = report.unresolved_ids,
        "extract complete"
    );
    Ok(())
}
