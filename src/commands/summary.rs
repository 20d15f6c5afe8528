use anyhow::Result;
use tracing::info;

use crate::cli::SummaryArgs;
use crate::util::print_json;

use super::resolve_store;

pub fn run(args: SummaryArgs) -> Result<()> {
    let (store, ledger) = resolve_store(&args.store)?;
    let summary = store.summarize_by_import_date()?;

    if args.json {
        return print_json(&summary);
    }

    for row in &summary {
        info!(imported_at = %row.imported_at, count = row.count, "summary by import date");
    }

    let imported_files = ledger.imported_paths()?.len();
    info!(
        db = %store.db_path().display(),
        table = %store.descriptor().table_name,
        dates = summary.len(),
        imported_files,
        "summary complete"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StoreArgs;
    use crate::model::EntityType;

    #[test]
    fn summary_on_a_fresh_store_reports_missing_tables() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let args = SummaryArgs {
            store: StoreArgs {
                entity: EntityType::Brand,
                data_root: dir.path().to_path_buf(),
                db_path: None,
                table: None,
                ledger_table: None,
            },
            json: true,
        };

        assert!(run(args).is_err());
    }

    #[test]
    fn summary_reads_an_initialized_store() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store_args = StoreArgs {
            entity: EntityType::Category,
            data_root: dir.path().to_path_buf(),
            db_path: None,
            table: None,
            ledger_table: None,
        };
        let (store, ledger) = resolve_store(&store_args).expect("store");
        store.ensure_table().expect("record table");
        ledger.ensure_table().expect("ledger table");

        run(SummaryArgs {
            store: store_args,
            json: false,
        })
        .expect("summary should succeed");
    }
}
