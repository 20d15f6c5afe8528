use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::types::ToSql;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{error, info, warn};

use super::open_connection;
use crate::entity::{EntityDescriptor, validate_identifier};
use crate::model::{EntityRecord, ImportDateCount, UpsertOutcome};

pub const UPSERT_CHUNK_SIZE: usize = 1000;

const KEY_PAIR_QUERY_CHUNK: usize = 500;

/// Keyed table of normalized records for one entity type.
#[derive(Debug, Clone)]
pub struct ReconciliationStore {
    db_path: PathBuf,
    descriptor: EntityDescriptor,
}

impl ReconciliationStore {
    pub fn new(db_path: impl Into<PathBuf>, descriptor: EntityDescriptor) -> Self {
        Self {
            db_path: db_path.into(),
            descriptor,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn ensure_table(&self) -> Result<()> {
        let descriptor = &self.descriptor;
        let table = &descriptor.table_name;

        let mut columns = vec![
            format!("{} TEXT PRIMARY KEY", descriptor.id.column),
            format!("{} TEXT NOT NULL", descriptor.text.column),
        ];
        columns.extend(
            descriptor
                .extras
                .iter()
                .map(|extra| format!("{} TEXT NOT NULL", extra.column)),
        );
        columns.push("imported_at DATE NOT NULL".to_string());

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n  {}\n);\n\
             CREATE INDEX IF NOT EXISTS idx_{table}_imported_at ON {table}(imported_at);\n",
            columns.join(",\n  ")
        );
        if let Some((first, second)) = descriptor.key_pair() {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_key_pair ON {table}({}, {});\n",
                first.column, second.column
            ));
        }

        let connection = open_connection(&self.db_path)?;
        connection
            .execute_batch(&ddl)
            .with_context(|| format!("failed to create table {table}"))?;

        info!(table = %table, "record table ready");
        Ok(())
    }

    /// Inserts new ids and rewrites existing ones only when a tracked column
    /// differs; identical rows keep their previous `imported_at`.
    ///
    /// Records are applied in transactions of [`UPSERT_CHUNK_SIZE`]. A failing
    /// chunk is rolled back and counted, and later chunks are still attempted.
    pub fn upsert_batch(&self, records: &[EntityRecord]) -> Result<UpsertOutcome> {
        let table = &self.descriptor.table_name;
        let mut outcome = UpsertOutcome {
            records_submitted: records.len(),
            ..UpsertOutcome::default()
        };

        if records.is_empty() {
            info!(table = %table, "no records provided to upsert");
            return Ok(outcome);
        }

        let sql = self.upsert_sql();
        let mut connection = open_connection(&self.db_path)?;

        for (index, chunk) in records.chunks(UPSERT_CHUNK_SIZE).enumerate() {
            match self.apply_chunk(&mut connection, &sql, chunk) {
                Ok(written) => {
                    outcome.chunks_applied += 1;
                    outcome.rows_written += written;
                }
                Err(err) => {
                    outcome.chunks_failed += 1;
                    error!(
                        table = %table,
                        chunk = index,
                        records = chunk.len(),
                        error = %format!("{err:#}"),
                        "failed to upsert chunk"
                    );
                }
            }
        }

        info!(
            table = %table,
            submitted = outcome.records_submitted,
            written = outcome.rows_written,
            failed_chunks = outcome.chunks_failed,
            "upsert finished"
        );
        Ok(outcome)
    }

    fn apply_chunk(
        &self,
        connection: &mut Connection,
        sql: &str,
        chunk: &[EntityRecord],
    ) -> Result<usize> {
        let expected_extras = self.descriptor.extras.len();
        let tx = connection.transaction()?;
        let mut written = 0;

        {
            let mut statement = tx.prepare(sql)?;
            for record in chunk {
                if record.extras.len() != expected_extras {
                    bail!(
                        "record {} has {} extra values, expected {expected_extras}",
                        record.id,
                        record.extras.len()
                    );
                }

                let mut values: Vec<&dyn ToSql> = Vec::with_capacity(expected_extras + 3);
                values.push(&record.id);
                values.push(&record.display_text);
                values.extend(record.extras.iter().map(|extra| extra as &dyn ToSql));
                values.push(&record.imported_at);

                written += statement
                    .execute(params_from_iter(values))
                    .with_context(|| format!("failed to upsert id {}", record.id))?;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    fn upsert_sql(&self) -> String {
        let descriptor = &self.descriptor;
        let table = &descriptor.table_name;
        let id = descriptor.id.column;
        let tracked = descriptor.tracked_columns();

        let mut columns = vec![id];
        columns.extend(tracked.iter().copied());
        columns.push("imported_at");

        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = tracked
            .iter()
            .copied()
            .chain(std::iter::once("imported_at"))
            .map(|column| format!("{column}=excluded.{column}"))
            .collect::<Vec<_>>()
            .join(",\n  ");
        let changed = tracked
            .iter()
            .map(|column| format!("{table}.{column} IS NOT excluded.{column}"))
            .collect::<Vec<_>>()
            .join("\n   OR ");

        format!(
            "INSERT INTO {table} ({})\nVALUES ({placeholders})\n\
             ON CONFLICT({id}) DO UPDATE SET\n  {assignments}\nWHERE {changed}",
            columns.join(", ")
        )
    }

    /// Ids whose stored import date is strictly after `threshold`.
    pub fn query_ids_newer_than(&self, threshold: NaiveDate) -> Result<HashSet<String>> {
        let descriptor = &self.descriptor;
        let connection = open_connection(&self.db_path)?;
        let mut statement = connection.prepare(&format!(
            "SELECT {} FROM {} WHERE imported_at > ?1",
            descriptor.id.column, descriptor.table_name
        ))?;

        let mut rows = statement.query(params![threshold])?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(row.get(0)?);
        }
        Ok(ids)
    }

    /// Ids whose normalized business key pair is one of `pairs`. Pair values
    /// are normalized with the same rules used on import.
    pub fn query_ids_by_key_pairs(&self, pairs: &[(String, String)]) -> Result<HashSet<String>> {
        let descriptor = &self.descriptor;
        let Some((first, second)) = descriptor.key_pair() else {
            bail!(
                "entity type {:?} has no business key pair",
                descriptor.entity_type
            );
        };

        let mut ids = HashSet::new();
        if pairs.is_empty() {
            warn!(table = %descriptor.table_name, "no key pairs supplied");
            return Ok(ids);
        }

        let normalized: Vec<(String, String)> = pairs
            .iter()
            .map(|(left, right)| (first.normalize(Some(left)), second.normalize(Some(right))))
            .collect();

        let connection = open_connection(&self.db_path)?;
        for chunk in normalized.chunks(KEY_PAIR_QUERY_CHUNK) {
            let tuples = (0..chunk.len())
                .map(|index| format!("(?{}, ?{})", index * 2 + 1, index * 2 + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {} FROM {} WHERE ({}, {}) IN (VALUES {tuples})",
                descriptor.id.column, descriptor.table_name, first.column, second.column
            );

            let mut statement = connection.prepare(&sql)?;
            let values = chunk
                .iter()
                .flat_map(|(left, right)| [left.as_str(), right.as_str()]);
            let mut rows = statement.query(params_from_iter(values))?;
            while let Some(row) = rows.next()? {
                ids.insert(row.get(0)?);
            }
        }

        Ok(ids)
    }

    /// Ids present in `reference_table` but absent from this table. The
    /// reference table lives in the same database and keys on the same id
    /// column, e.g. an expected snapshot loaded with a table override.
    pub fn query_ids_missing_from(&self, reference_table: &str) -> Result<HashSet<String>> {
        validate_identifier(reference_table)?;
        let descriptor = &self.descriptor;
        let (id, table) = (descriptor.id.column, &descriptor.table_name);

        let connection = open_connection(&self.db_path)?;
        let mut statement = connection
            .prepare(&format!(
                "SELECT r.{id} FROM {reference_table} r\n\
                 LEFT JOIN {table} t ON r.{id} = t.{id}\n\
                 WHERE t.{id} IS NULL"
            ))
            .with_context(|| format!("failed to compare {reference_table} against {table}"))?;

        let mut rows = statement.query([])?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(row.get(0)?);
        }

        info!(reference = reference_table, table = %table, missing = ids.len(), "missing ids");
        Ok(ids)
    }

    /// Row counts per import date, newest first.
    pub fn summarize_by_import_date(&self) -> Result<Vec<ImportDateCount>> {
        let connection = open_connection(&self.db_path)?;
        let mut statement = connection.prepare(&format!(
            "SELECT imported_at, COUNT(1) FROM {} GROUP BY imported_at ORDER BY imported_at DESC",
            self.descriptor.table_name
        ))?;

        let mut rows = statement.query([])?;
        let mut summary = Vec::new();
        while let Some(row) = rows.next()? {
            summary.push(ImportDateCount {
                imported_at: row.get(0)?,
                count: row.get(1)?,
            });
        }
        Ok(summary)
    }
}
