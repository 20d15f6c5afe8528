use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::params;
use tracing::{debug, info};

use super::open_connection;
use crate::entity::validate_identifier;

/// Append-only record of source files already folded into the store.
///
/// Idempotency is by path: a file that reappears with different content under
/// the same path is still considered imported.
#[derive(Debug, Clone)]
pub struct ImportLedger {
    db_path: PathBuf,
    table_name: String,
}

impl ImportLedger {
    pub fn new(db_path: impl Into<PathBuf>, table_name: &str) -> Result<Self> {
        validate_identifier(table_name)?;
        Ok(Self {
            db_path: db_path.into(),
            table_name: table_name.to_string(),
        })
    }

    pub fn ensure_table(&self) -> Result<()> {
        let connection = open_connection(&self.db_path)?;
        connection
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (file_path TEXT PRIMARY KEY)",
                    self.table_name
                ),
                [],
            )
            .with_context(|| format!("failed to create ledger table {}", self.table_name))?;

        info!(table = %self.table_name, "ledger table ready");
        Ok(())
    }

    /// Records `file_path` and returns true when it was not recorded before,
    /// meaning the caller now owns importing it.
    pub fn mark_imported_if_new(&self, file_path: &str) -> Result<bool> {
        let connection = open_connection(&self.db_path)?;
        let inserted = connection
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (file_path) VALUES (?1)",
                    self.table_name
                ),
                params![file_path],
            )
            .with_context(|| {
                format!(
                    "failed to record {file_path} in ledger table {}",
                    self.table_name
                )
            })?;

        debug!(file = file_path, new = inserted > 0, "ledger checked");
        Ok(inserted > 0)
    }

    pub fn imported_paths(&self) -> Result<Vec<String>> {
        let connection = open_connection(&self.db_path)?;
        let mut statement = connection.prepare(&format!(
            "SELECT file_path FROM {} ORDER BY file_path ASC",
            self.table_name
        ))?;

        let mut rows = statement.query([])?;
        let mut paths = Vec::new();
        while let Some(row) = rows.next()? {
            paths.push(row.get(0)?);
        }
        Ok(paths)
    }
}
