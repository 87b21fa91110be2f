// used for persistence
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use std::fmt;

// used for logging of executions
use tracing::{debug, warn};

use crate::clause::DEFAULT_ITERATE_THRESHOLD;
use crate::error::{MacrotrackError, Result};
use crate::query::{Delete, Insert, Projection, Select, Statement, Update};
use crate::rowdata::RowData;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

/// Opens a connection with foreign key enforcement switched on.
pub fn open(mode: &PersistenceMode) -> Result<Connection> {
    let connection = match mode {
        PersistenceMode::InMemory => Connection::open_in_memory()?,
        PersistenceMode::File(path) => Connection::open(path)?,
    };
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(connection)
}

/// Runs built statements against a database.
pub trait Executor {
    /// IN-lists built on behalf of the caller are iterated beyond this size.
    fn iterate_threshold(&self) -> usize {
        DEFAULT_ITERATE_THRESHOLD
    }
    fn select<M: Schema, P: Projection<M>>(&self, select: &Select<M, P>) -> Result<Vec<P::Output>>;
    /// Inserts `rows` in order and returns their ids.
    fn insert<M: Schema>(&self, insert: &Insert<M>, rows: &[RowData<M>]) -> Result<Vec<i64>>;
    /// Updates `rows` in order and returns the number of rows affected.
    fn update<M: Schema>(&self, update: &Update<M>, rows: &[RowData<M>]) -> Result<usize>;
    fn delete<M: Schema>(&self, delete: &Delete<M>) -> Result<usize>;
}

// ------------- Persistence -------------
pub struct Persistor<'db> {
    pub db: &'db Connection,
    iterate_threshold: usize,
}

impl<'db> Persistor<'db> {
    pub fn new<'connection>(connection: &'connection Connection) -> Persistor<'connection> {
        Persistor { db: connection, iterate_threshold: DEFAULT_ITERATE_THRESHOLD }
    }
    pub fn with_iterate_threshold(mut self, threshold: usize) -> Self {
        self.iterate_threshold = threshold;
        self
    }

    /// Creates the table for `M` and its modify time trigger, unless they
    /// already exist.
    pub fn create_table<M: Schema>(&self) -> Result<()> {
        for sql in M::table().create_sql() {
            debug!(table = M::table().name(), "{}", sql);
            self.db.execute_batch(&sql)?;
        }
        Ok(())
    }

    pub fn begin(&self) -> Result<()> {
        self.db.execute_batch("BEGIN")?;
        Ok(())
    }
    pub fn commit(&self) -> Result<()> {
        self.db.execute_batch("COMMIT")?;
        Ok(())
    }
    pub fn rollback(&self) -> Result<()> {
        self.db.execute_batch("ROLLBACK")?;
        Ok(())
    }
    /// Runs `work` inside a transaction, rolling back when it fails.
    pub fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.begin()?;
        match work(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    // Executes the statement once per bind batch and sums the changes.
    fn execute_batches<S: Statement>(&self, statement: &S) -> Result<usize> {
        let sql = statement.to_sql();
        let batches = statement.bind_batches();
        if statement.should_iterate_bind_arguments() {
            debug!(iterations = batches.len(), "{}", sql);
        }
        let mut prepared = self.db.prepare(&sql)?;
        let mut changed = 0;
        for batch in &batches {
            debug!(binds = batch.len(), "{}", sql);
            changed += prepared.execute(params_from_iter(batch.iter()))?;
        }
        Ok(changed)
    }
}

// Labels a failed row with its position in the batch and its contents.
fn batch_error<M: Schema, E: fmt::Display>(row: usize, data: &RowData<M>, e: E) -> MacrotrackError {
    warn!(table = M::table().name(), row, data = %data, error = %e, "row failed");
    MacrotrackError::Batch {
        table: M::table().name().to_owned(),
        row,
        data: data.to_string(),
        message: e.to_string(),
    }
}

impl Executor for Persistor<'_> {
    fn iterate_threshold(&self) -> usize {
        self.iterate_threshold
    }

    fn select<M: Schema, P: Projection<M>>(&self, select: &Select<M, P>) -> Result<Vec<P::Output>> {
        let sql = select.to_sql();
        let width = select.result_width();
        let batches = select.bind_batches();
        if select.should_iterate_bind_arguments() {
            debug!(iterations = batches.len(), "{}", sql);
        }
        let mut prepared = self.db.prepare(&sql)?;
        let mut results = Vec::new();
        for batch in &batches {
            debug!(binds = batch.len(), "{}", sql);
            let mut rows = prepared.query(params_from_iter(batch.iter()))?;
            while let Some(row) = rows.next()? {
                let mut raw = Vec::with_capacity(width);
                for i in 0..width {
                    raw.push(row.get::<_, Value>(i)?);
                }
                if let Some(output) = select.read(raw)? {
                    results.push(output);
                }
            }
        }
        Ok(results)
    }

    fn insert<M: Schema>(&self, insert: &Insert<M>, rows: &[RowData<M>]) -> Result<Vec<i64>> {
        let sql = insert.to_sql();
        let mut prepared = self.db.prepare(&sql)?;
        let mut ids = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let values = insert.bind_row(row).map_err(|e| batch_error(index, row, e))?;
            debug!(binds = values.len(), "{}", sql);
            prepared
                .execute(params_from_iter(values.iter()))
                .map_err(|e| batch_error(index, row, e))?;
            ids.push(self.db.last_insert_rowid());
        }
        Ok(ids)
    }

    fn update<M: Schema>(&self, update: &Update<M>, rows: &[RowData<M>]) -> Result<usize> {
        let sql = update.to_sql();
        let mut prepared = self.db.prepare(&sql)?;
        let mut changed = 0;
        for (index, row) in rows.iter().enumerate() {
            let values = update.bind_row(row).map_err(|e| batch_error(index, row, e))?;
            debug!(binds = values.len(), "{}", sql);
            changed += prepared
                .execute(params_from_iter(values.iter()))
                .map_err(|e| batch_error(index, row, e))?;
        }
        Ok(changed)
    }

    fn delete<M: Schema>(&self, delete: &Delete<M>) -> Result<usize> {
        self.execute_batches(delete)
    }
}
