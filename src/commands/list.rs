use anyhow::Result;
use tracing::info;

use crate::catalog::{FsSnapshotRepository, list_effective_files};
use crate::cli::ListArgs;
use crate::util::print_json;

pub fn run(args: ListArgs) -> Result<()> {
    let repository = FsSnapshotRepository::new(&args.source_dir);
    let files = list_effective_files(&repository, args.entity, &args.start_date, args.all_history)?;

    if args.json {
        return print_json(&files);
    }

    for file in &files {
        info!(
            path = %file.path.display(),
            entity = ?file.entity_type,
            nature = %file.nature,
            key = %file.datetime_key,
            "snapshot file"
        );
    }
    info!(
        folder = %repository.folder().display(),
        files = files.len(),
        effective = !args.all_history,
        "listing complete"
    );

    Ok(())
}
