//! SQLite persistence: the import ledger and the per-entity record tables.
//!
//! Every public operation opens its own connection and drops it before
//! returning, so nothing holds the database across a whole run.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::ensure_directory;

mod ledger;
mod records;

pub use ledger::ImportLedger;
pub use records::{ReconciliationStore, UPSERT_CHUNK_SIZE};

fn open_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}
