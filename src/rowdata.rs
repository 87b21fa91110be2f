//! Typed, sparse row values for one table.
//!
//! A [`RowData`] is sized to the full column count of its table but scoped to
//! a chosen set of active columns. Each cell carries a presence bit next to
//! its value, so "never set" and "set to null" stay distinguishable. Rows are
//! mutable until [`RowData::make_immutable`] is called, after which they can be
//! shared read-only.

use std::fmt;
use std::hash::{Hash, Hasher};

use rusqlite::types::Value;
use tracing::trace;

use crate::datatype::DataType;
use crate::error::{MacrotrackError, Result};
use crate::schema::{Column, ColumnRef, Table, METADATA_COLUMNS};

pub struct RowData<M: 'static> {
    table: &'static Table<M>,
    columns: Vec<ColumnRef<M>>,
    active: Vec<bool>,
    values: Vec<Value>,
    present: Vec<bool>,
    immutable: bool,
}

impl<M: 'static> RowData<M> {
    /// An empty row over every column of `table`.
    pub fn new(table: &'static Table<M>) -> Self {
        Self::with_columns(table, table.columns())
    }

    /// An empty row over `columns` only.
    pub fn with_columns(table: &'static Table<M>, columns: &[ColumnRef<M>]) -> Self {
        let width = table.column_count();
        let mut active = vec![false; width];
        let mut kept = Vec::with_capacity(columns.len());
        for column in columns {
            if !active[column.index()] {
                active[column.index()] = true;
                kept.push(column.clone());
            }
        }
        Self {
            table,
            columns: kept,
            active,
            values: vec![Value::Null; width],
            present: vec![false; width],
            immutable: false,
        }
    }

    /// A row over every column, with each column's default supplier applied.
    pub fn with_defaults(table: &'static Table<M>) -> Self {
        let mut row = Self::new(table);
        for column in table.columns() {
            if let Some(value) = column.default_raw() {
                row.values[column.index()] = value;
                row.present[column.index()] = true;
            }
        }
        row
    }

    pub fn table(&self) -> &'static Table<M> {
        self.table
    }
    /// The active columns, in the order they were requested.
    pub fn columns(&self) -> &[ColumnRef<M>] {
        &self.columns
    }
    pub fn has_column(&self, column: &ColumnRef<M>) -> bool {
        column.index() < self.active.len()
            && self.active[column.index()]
            && column.table_name() == self.table.name()
    }
    pub fn has_columns(&self, columns: &[ColumnRef<M>]) -> bool {
        columns.iter().all(|c| self.has_column(c))
    }
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }
    /// Freezes the row. There is no way back.
    pub fn make_immutable(&mut self) {
        self.immutable = true;
    }

    fn check_active(&self, column: &ColumnRef<M>) {
        assert!(
            self.has_column(column),
            "column {} is not active in this {} row",
            column,
            self.table.name()
        );
    }
    fn check_mutable(&self, column: &ColumnRef<M>) {
        assert!(
            !self.immutable,
            "cannot write {} into an immutable {} row",
            column,
            self.table.name()
        );
    }
    fn store(&mut self, column: &ColumnRef<M>, value: Value) {
        self.values[column.index()] = value;
        self.present[column.index()] = true;
    }

    /// Returns `None` when the value is absent or null.
    ///
    /// # Panics
    /// When `column` is not active in this row.
    pub fn get<J: DataType>(&self, column: &Column<M, J>) -> Option<J> {
        self.check_active(column);
        match column.from_raw(&self.values[column.index()]) {
            Ok(value) => value,
            // put and put_from_raw only ever store values the column can read
            Err(e) => panic!("corrupt cell: {}", e),
        }
    }

    /// Sets the value and marks it present. `None` stores an explicit null.
    ///
    /// # Panics
    /// When the row is immutable or `column` is not active in this row.
    pub fn put<J: DataType>(&mut self, column: &Column<M, J>, value: Option<J>) {
        self.check_active(column);
        self.check_mutable(column);
        let raw = column.to_raw(value.as_ref());
        self.store(column, raw);
    }

    /// Whether a value, possibly null, was set for `column`.
    ///
    /// # Panics
    /// When `column` is not active in this row.
    pub fn has_value(&self, column: &ColumnRef<M>) -> bool {
        self.check_active(column);
        self.present[column.index()]
    }

    /// # Panics
    /// When `column` is not active in this row.
    pub fn get_as_raw(&self, column: &ColumnRef<M>) -> Value {
        self.check_active(column);
        self.values[column.index()].clone()
    }

    /// # Panics
    /// When the row is immutable or `column` is not active in this row.
    pub fn put_from_raw(&mut self, column: &ColumnRef<M>, raw: &Value) -> Result<()> {
        self.check_active(column);
        self.check_mutable(column);
        let value = column.normalize_raw(raw)?;
        self.store(column, value);
        Ok(())
    }

    /// Null is rendered as the empty string.
    ///
    /// # Panics
    /// When `column` is not active in this row.
    pub fn get_as_raw_string(&self, column: &ColumnRef<M>) -> Result<String> {
        self.check_active(column);
        column.raw_to_string(&self.values[column.index()])
    }

    /// The empty string is read as null, even for text columns where it could
    /// have been a value.
    ///
    /// # Panics
    /// When the row is immutable or `column` is not active in this row.
    pub fn put_from_string(&mut self, column: &ColumnRef<M>, s: &str) -> Result<()> {
        self.check_active(column);
        self.check_mutable(column);
        if s.is_empty() && column.raw_string_is_lossy() {
            trace!(column = %column, "empty string read as null");
        }
        let value = column.string_to_raw(s)?;
        self.store(column, value);
        Ok(())
    }

    /// A mutable copy over the same active columns.
    pub fn copy(&self) -> Self {
        self.copy_of(&self.columns)
    }

    /// A mutable copy narrowed to `columns`.
    ///
    /// # Panics
    /// When this row does not have every one of `columns`.
    pub fn copy_of(&self, columns: &[ColumnRef<M>]) -> Self {
        assert!(
            self.has_columns(columns),
            "cannot copy a {} row onto columns it does not have",
            self.table.name()
        );
        let mut copy = Self::with_columns(self.table, columns);
        for column in columns {
            copy.values[column.index()] = self.values[column.index()].clone();
            copy.present[column.index()] = self.present[column.index()];
        }
        copy
    }

    /// A mutable copy that also activates `extra`. Newly activated cells start
    /// out absent.
    pub fn widened(&self, extra: &[ColumnRef<M>]) -> Self {
        let mut columns = self.columns.clone();
        columns.extend(extra.iter().cloned());
        let mut copy = Self::with_columns(self.table, &columns);
        for column in &self.columns {
            copy.values[column.index()] = self.values[column.index()].clone();
            copy.present[column.index()] = self.present[column.index()];
        }
        copy
    }

    /// Raw values of the active columns, in active column order.
    pub fn raw_values(&self) -> Vec<Value> {
        self.columns.iter().map(|c| self.values[c.index()].clone()).collect()
    }

    /// Checks the row against the table's constraints that can be checked
    /// locally: every not-null column other than `id` must be active and hold
    /// a value. With `allow_pending_fk`, foreign key columns that have not been
    /// set yet are let through, since deferred resolution fills them later.
    pub fn validate(&self, allow_pending_fk: bool) -> Result<()> {
        for column in self.table.columns().iter().skip(1) {
            if column.is_nullable() {
                continue;
            }
            let active = self.has_column(column);
            if allow_pending_fk && column.is_foreign_key() && !(active && self.present[column.index()]) {
                continue;
            }
            if !active {
                return Err(self.violation(format!("required column {} is missing", column.sql_name())));
            }
            if matches!(self.values[column.index()], Value::Null) {
                return Err(self.violation(format!("required column {} has no value", column.sql_name())));
            }
        }
        Ok(())
    }
    fn violation(&self, message: String) -> MacrotrackError {
        MacrotrackError::SchemaViolation { table: self.table.name().to_owned(), message }
    }

    /// Compares every column value except id, create time and modify time.
    pub fn equals_without_metadata(&self, other: &Self) -> bool {
        self.table.name() == other.table.name()
            && self.values.iter().zip(other.values.iter()).skip(METADATA_COLUMNS).all(|(a, b)| same_value(a, b))
    }
}

// Bitwise for reals so that equality agrees with hashing.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Real(x), Value::Real(y)) => x.to_bits() == y.to_bits(),
        (x, y) => x == y,
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Integer(i) => {
            1u8.hash(state);
            i.hash(state);
        }
        Value::Real(f) => {
            2u8.hash(state);
            f.to_bits().hash(state);
        }
        Value::Text(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Blob(b) => {
            4u8.hash(state);
            b.hash(state);
        }
    }
}

// Equality and hashing look at the table and the cell values only. Presence
// bits are ignored, so rows holding the same values compare equal no matter
// how the values got there.
impl<M: 'static> PartialEq for RowData<M> {
    fn eq(&self, other: &Self) -> bool {
        self.table.name() == other.table.name()
            && self.values.iter().zip(other.values.iter()).all(|(a, b)| same_value(a, b))
    }
}
impl<M: 'static> Eq for RowData<M> {}
impl<M: 'static> Hash for RowData<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.name().hash(state);
        for value in &self.values {
            hash_value(value, state);
        }
    }
}

impl<M: 'static> Clone for RowData<M> {
    fn clone(&self) -> Self {
        Self {
            table: self.table,
            columns: self.columns.clone(),
            active: self.active.clone(),
            values: self.values.clone(),
            present: self.present.clone(),
            immutable: self.immutable,
        }
    }
}

impl<M: 'static> fmt::Display for RowData<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut cells = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let cell = match &self.values[column.index()] {
                Value::Null => String::from("NULL"),
                Value::Integer(i) => i.to_string(),
                Value::Real(r) => r.to_string(),
                Value::Text(s) => format!("\"{}\"", s),
                Value::Blob(b) => format!("<{} bytes>", b.len()),
            };
            cells.push(format!("{}={}", column.sql_name(), cell));
        }
        write!(f, "{}{{{}}}", self.table.name(), cells.join(", "))
    }
}
impl<M: 'static> fmt::Debug for RowData<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)?;
        if self.immutable {
            write!(f, " (immutable)")?;
        }
        Ok(())
    }
}
