//! Persisted entities and their provenance.
//!
//! An [`Entity`] wraps a frozen [`RowData`] together with the [`ObjectSource`]
//! it came from. Whether the row may carry an id depends on that source, and
//! construction refuses rows that disagree. Entities are never edited in
//! place: an edit copies the row, changes the copy and builds a new entity.

use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::fmt;

use rusqlite::types::Value;
use seahash::SeaHasher;

use crate::datatype::{DataType, Timestamp};
use crate::error::{MacrotrackError, Result};
use crate::rowdata::RowData;
use crate::schema::{Column, FkColumn, Schema};

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// Where an in-memory entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectSource {
    /// Read back from the database.
    Database,
    /// Read from an import file; no ids yet.
    Import,
    /// Restored from a backup, ids included.
    Restore,
    /// Created by the user and not stored yet.
    UserNew,
    /// A stored object edited by the user.
    DbEdit,
    /// Derived by computation.
    Computed,
    /// Shipped with the application.
    Inbuilt,
    /// Test fixtures. Exempt from the id check.
    Test,
    /// Parsed from JSON.
    Json,
}

impl ObjectSource {
    // (requires id, implies modified, implies stored); None where the source
    // says nothing either way
    fn traits(self) -> (Option<bool>, Option<bool>, Option<bool>) {
        use ObjectSource::*;
        match self {
            Database => (Some(true), Some(false), Some(true)),
            Import => (Some(false), None, None),
            Restore => (Some(true), None, None),
            UserNew => (Some(false), Some(true), Some(false)),
            DbEdit => (Some(true), Some(true), Some(true)),
            Computed => (Some(false), Some(true), Some(false)),
            Inbuilt => (Some(false), Some(false), Some(false)),
            Test => (None, None, None),
            Json => (Some(false), None, None),
        }
    }
    /// `None` for sources exempt from the id check.
    pub fn requires_id(self) -> Option<bool> {
        self.traits().0
    }
    pub fn implies_modified(self) -> Option<bool> {
        self.traits().1
    }
    pub fn implies_stored(self) -> Option<bool> {
        self.traits().2
    }
    pub fn admits_id(self, has_id: bool) -> bool {
        self.requires_id().is_none_or(|required| required == has_id)
    }
}

impl fmt::Display for ObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ObjectSource::Database => "DATABASE",
            ObjectSource::Import => "IMPORT",
            ObjectSource::Restore => "RESTORE",
            ObjectSource::UserNew => "USER_NEW",
            ObjectSource::DbEdit => "DB_EDIT",
            ObjectSource::Computed => "COMPUTED",
            ObjectSource::Inbuilt => "INBUILT",
            ObjectSource::Test => "TEST",
            ObjectSource::Json => "JSON",
        };
        write!(f, "{}", name)
    }
}

// A parent's natural key value that an FK column will be matched against.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParentKey {
    pub(crate) column: String,
    pub(crate) index: usize,
    pub(crate) value: Value,
}

pub struct Entity<M: Schema> {
    data: RowData<M>,
    source: ObjectSource,
    fk_parent_keys: HashMap<usize, ParentKey, OtherHasher>,
}

impl<M: Schema> Entity<M> {
    /// Wraps `data`, which must be immutable, pass schema validation and
    /// carry an id exactly when `source` requires one.
    pub fn new(data: RowData<M>, source: ObjectSource) -> Result<Self> {
        Self::check(&data, source)?;
        Ok(Self { data, source, fk_parent_keys: HashMap::default() })
    }

    fn check(data: &RowData<M>, source: ObjectSource) -> Result<()> {
        let table = M::table();
        if !data.is_immutable() {
            return Err(MacrotrackError::Invariant(format!(
                "a {} entity needs an immutable row",
                table.name()
            )));
        }
        // objects that are not stored yet may still wait for their parents
        data.validate(source.requires_id() != Some(true))?;
        let has_id = Self::id_of(data).is_some();
        if !source.admits_id(has_id) {
            return Err(MacrotrackError::Invariant(format!(
                "a {} entity from source {} {} an id",
                table.name(),
                source,
                if has_id { "cannot have" } else { "must have" }
            )));
        }
        Ok(())
    }

    fn id_of(data: &RowData<M>) -> Option<i64> {
        let id = M::table().id_column();
        if data.has_column(&id) { data.get(&id) } else { None }
    }

    pub fn data(&self) -> &RowData<M> {
        &self.data
    }
    pub fn into_data(self) -> RowData<M> {
        self.data
    }
    pub fn source(&self) -> ObjectSource {
        self.source
    }
    pub fn id(&self) -> Option<i64> {
        Self::id_of(&self.data)
    }
    pub fn has_id(&self) -> bool {
        self.id().is_some()
    }
    pub fn create_time(&self) -> Option<Timestamp> {
        let column = M::table().create_time_column();
        if self.data.has_column(&column) { self.data.get(&column) } else { None }
    }
    pub fn modify_time(&self) -> Option<Timestamp> {
        let column = M::table().modify_time_column();
        if self.data.has_column(&column) { self.data.get(&column) } else { None }
    }
    /// # Panics
    /// When `column` is not active in the entity's row.
    pub fn get<J: DataType>(&self, column: &Column<M, J>) -> Option<J> {
        self.data.get(column)
    }

    /// The same entity under another source, e.g. `UserNew` turning into
    /// `Database` once stored. Pending FK parent keys carry over.
    pub fn with_source(self, source: ObjectSource) -> Result<Self> {
        Self::check(&self.data, source)?;
        Ok(Self { source, ..self })
    }

    /// Builds a new entity from `data`, keeping this entity's pending FK
    /// parent keys.
    pub fn with_data(&self, data: RowData<M>, source: ObjectSource) -> Result<Self> {
        Self::check(&data, source)?;
        Ok(Self { data, source, fk_parent_keys: self.fk_parent_keys.clone() })
    }

    /// Same content, ignoring id, create time and modify time.
    pub fn equals_without_metadata(&self, other: &Self) -> bool {
        self.data.equals_without_metadata(&other.data)
    }

    /// Records that `fk` is to be resolved to the parent whose `key` column
    /// equals `value`.
    pub fn set_fk_parent_key<J: DataType, N: Schema, K: DataType>(
        &mut self,
        fk: &FkColumn<M, J, N>,
        key: &Column<N, K>,
        value: K,
    ) {
        self.fk_parent_keys.insert(
            fk.index(),
            ParentKey { column: key.sql_name().to_owned(), index: key.index(), value: value.to_raw() },
        );
    }

    /// Like [`set_fk_parent_key`](Self::set_fk_parent_key), taking the key
    /// value from `parent`.
    pub fn set_fk_parent_key_from<J: DataType, N: Schema, K: DataType>(
        &mut self,
        fk: &FkColumn<M, J, N>,
        key: &Column<N, K>,
        parent: &Entity<N>,
    ) -> Result<()> {
        let value = if parent.data.has_column(key) { parent.data.get(key) } else { None };
        match value {
            Some(value) => {
                self.set_fk_parent_key(fk, key, value);
                Ok(())
            }
            None => Err(MacrotrackError::Invariant(format!(
                "parent {} has no value for natural key {}",
                N::table().name(),
                key.sql_name()
            ))),
        }
    }

    /// The parent natural key recorded for `fk`, as a one-column row of the
    /// parent table.
    pub fn get_fk_parent_key<J: DataType, N: Schema>(&self, fk: &FkColumn<M, J, N>) -> Result<RowData<N>> {
        let key = self.fk_parent_keys.get(&fk.index()).ok_or_else(|| {
            MacrotrackError::Invariant(format!("no parent key recorded for {}", fk.column_ref()))
        })?;
        let parent_table = N::table();
        let column = parent_table.column_at(key.index).ok_or_else(|| {
            MacrotrackError::Invariant(format!("{} has no column {}", parent_table.name(), key.column))
        })?;
        let mut row = RowData::with_columns(parent_table, std::slice::from_ref(column));
        row.put_from_raw(column, &key.value)?;
        row.make_immutable();
        Ok(row)
    }

    pub fn has_fk_parent_key<J, N>(&self, fk: &FkColumn<M, J, N>) -> bool {
        self.fk_parent_keys.contains_key(&fk.index())
    }
    pub fn pending_fk_count(&self) -> usize {
        self.fk_parent_keys.len()
    }

    pub(crate) fn parent_key(&self, fk_index: usize) -> Option<&ParentKey> {
        self.fk_parent_keys.get(&fk_index)
    }
    pub(crate) fn take_parent_key(&mut self, fk_index: usize) -> Option<ParentKey> {
        self.fk_parent_keys.remove(&fk_index)
    }
}

impl<M: Schema> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            source: self.source,
            fk_parent_keys: self.fk_parent_keys.clone(),
        }
    }
}
impl<M: Schema> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} from {}", self.data, self.source)?;
        if !self.fk_parent_keys.is_empty() {
            write!(f, " ({} pending parent keys)", self.fk_parent_keys.len())?;
        }
        Ok(())
    }
}
