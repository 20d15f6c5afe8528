pub mod extract;
pub mod import;
pub mod list;
pub mod summary;

use std::path::PathBuf;

use anyhow::Result;

use crate::cli::StoreArgs;
use crate::entity::EntityDescriptor;
use crate::extract::{IdColumn, IdExtractor};
use crate::store::{ImportLedger, ReconciliationStore};

/// Resolves the descriptor and database location shared by every
/// store-backed command.
fn resolve_store(args: &StoreArgs) -> Result<(ReconciliationStore, ImportLedger)> {
    let descriptor = EntityDescriptor::for_entity(args.entity)?
        .with_table_names(args.table.clone(), args.ledger_table.clone())?;
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| args.data_root.join(descriptor.db_file_name));

    let ledger = ImportLedger::new(&db_path, &descriptor.ledger_table_name)?;
    let store = ReconciliationStore::new(db_path, descriptor);
    Ok((store, ledger))
}

fn id_extractor(store: &ReconciliationStore, id_column: Option<&str>) -> IdExtractor {
    let column = match id_column {
        Some(name) => IdColumn::Named(name.to_string()),
        None => IdColumn::First,
    };
    IdExtractor::new(column, store.descriptor().id)
}

/// `<env>_<MODULE>_FULL_<today>_999999_1_1`, the name the catalog later
/// recognizes as an extraction artifact.
fn extraction_file_name(env_prefix: &str, store: &ReconciliationStore, today: &str) -> PathBuf {
    PathBuf::from(format!(
        "{env_prefix}_{}_FULL_{today}_{}_1_1",
        store.descriptor().entity_type.module_token(),
        crate::model::EXTRACTION_TIME_TOKEN
    ))
}
