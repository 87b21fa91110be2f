//! Schema metadata: typed columns and the tables that own them.
//!
//! A table is described once, at startup, by declaring its columns in order
//! against a [`ColumnList`] and then handing the list to [`Table::new`]. The
//! marker type `M` never gets instantiated; it only ties a column to its table
//! so that a `Food` column cannot be applied to a `Meal` row.
//!
//! ```
//! use macrotrack::datatype::{now_millis, Timestamp};
//! use macrotrack::schema::{column, ColumnList, Table};
//!
//! struct Note;
//! let mut columns = ColumnList::<Note>::new("Note");
//! let _id = column::<i64>("id").unique().not_editable().build_for(&mut columns);
//! let _created = column::<Timestamp>("create_time").not_null().not_editable().default(now_millis).build_for(&mut columns);
//! let _modified = column::<Timestamp>("modify_time").not_null().not_editable().default(now_millis).build_for(&mut columns);
//! let text = column::<String>("text").not_null().build_for(&mut columns);
//! let table = Table::new(columns);
//! assert_eq!(text.index(), 3);
//! assert_eq!(table.column_count(), 4);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::types::Value;

use crate::datatype::{DataType, Timestamp};
use crate::error::{MacrotrackError, Result};

pub const ID: &str = "id";
pub const CREATE_TIME: &str = "create_time";
pub const MODIFY_TIME: &str = "modify_time";

/// Number of metadata columns leading every table.
pub const METADATA_COLUMNS: usize = 3;

lazy_static! {
    static ref SQL_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Implemented by each table marker type to reach its singleton table.
pub trait Schema: Sized + Send + Sync + 'static {
    fn table() -> &'static Table<Self>;
}

type Supplier = Arc<dyn Fn() -> Value + Send + Sync>;

/// The column a foreign key points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentColumn {
    pub table: String,
    pub sql_name: String,
    pub index: usize,
}

// Type-erased column description, shared by every handle to the column.
pub(crate) struct ColumnMeta {
    table: String,
    sql_name: String,
    index: usize,
    data_type: &'static str,
    sql_type: &'static str,
    placeholder: &'static str,
    holds_empty_string: bool,
    nullable: bool,
    unique: bool,
    editable: bool,
    default: Option<Supplier>,
    parent: Option<ParentColumn>,
    normalize: fn(&Value) -> std::result::Result<Value, String>,
    raw_to_string: fn(&Value) -> std::result::Result<String, String>,
    string_to_raw: fn(&str) -> std::result::Result<Value, String>,
}

fn normalize<J: DataType>(value: &Value) -> std::result::Result<Value, String> {
    J::from_raw(value).map(|v| v.to_raw())
}
fn raw_to_string<J: DataType>(value: &Value) -> std::result::Result<String, String> {
    J::from_raw(value).map(|v| v.to_raw_string())
}
fn string_to_raw<J: DataType>(s: &str) -> std::result::Result<Value, String> {
    J::from_raw_string(s).map(|v| v.to_raw())
}

impl fmt::Debug for ColumnMeta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Column")
            .field("table", &self.table)
            .field("sql_name", &self.sql_name)
            .field("index", &self.index)
            .field("data_type", &self.data_type)
            .field("nullable", &self.nullable)
            .field("unique", &self.unique)
            .field("editable", &self.editable)
            .field("parent", &self.parent)
            .finish()
    }
}

// ------------- ColumnRef -------------
/// A column of table `M` with its value type erased.
///
/// This is what heterogeneous column lists (projections, active column sets,
/// statement templates) are made of.
pub struct ColumnRef<M> {
    meta: Arc<ColumnMeta>,
    _table: PhantomData<fn() -> M>,
}

impl<M> ColumnRef<M> {
    fn from_meta(meta: Arc<ColumnMeta>) -> Self {
        Self { meta, _table: PhantomData }
    }
    pub fn sql_name(&self) -> &str {
        &self.meta.sql_name
    }
    pub fn table_name(&self) -> &str {
        &self.meta.table
    }
    /// Position in the owning table, fixed when the table was declared.
    pub fn index(&self) -> usize {
        self.meta.index
    }
    pub fn data_type(&self) -> &'static str {
        self.meta.data_type
    }
    pub fn sql_type(&self) -> &'static str {
        self.meta.sql_type
    }
    pub fn placeholder(&self) -> &'static str {
        self.meta.placeholder
    }
    pub fn is_nullable(&self) -> bool {
        self.meta.nullable
    }
    pub fn is_unique(&self) -> bool {
        self.meta.unique
    }
    pub fn is_user_editable(&self) -> bool {
        self.meta.editable
    }
    pub fn is_foreign_key(&self) -> bool {
        self.meta.parent.is_some()
    }
    pub fn parent(&self) -> Option<&ParentColumn> {
        self.meta.parent.as_ref()
    }
    pub fn is_metadata(&self) -> bool {
        self.meta.index < METADATA_COLUMNS
    }
    /// Null and the empty string share the same raw-string form, so for
    /// columns whose type can hold an empty string that form is lossy.
    pub fn raw_string_is_lossy(&self) -> bool {
        self.meta.holds_empty_string
    }
    pub fn default_raw(&self) -> Option<Value> {
        self.meta.default.as_ref().map(|supply| supply())
    }

    fn type_cast(&self, raw: String, reason: String) -> MacrotrackError {
        MacrotrackError::TypeCast {
            column: format!("{}.{}", self.meta.table, self.meta.sql_name),
            raw,
            reason,
        }
    }
    /// Checks that `value` is readable by this column's type and returns its
    /// canonical raw form.
    pub fn normalize_raw(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            v => (self.meta.normalize)(v).map_err(|reason| self.type_cast(format!("{:?}", v), reason)),
        }
    }
    pub fn raw_to_string(&self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok(String::new()),
            v => (self.meta.raw_to_string)(v).map_err(|reason| self.type_cast(format!("{:?}", v), reason)),
        }
    }
    pub fn string_to_raw(&self, s: &str) -> Result<Value> {
        if s.is_empty() {
            return Ok(Value::Null);
        }
        (self.meta.string_to_raw)(s).map_err(|reason| self.type_cast(format!("'{}'", s), reason))
    }
}
impl<M> Clone for ColumnRef<M> {
    fn clone(&self) -> Self {
        Self::from_meta(Arc::clone(&self.meta))
    }
}
impl<M> PartialEq for ColumnRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.meta.index == other.meta.index && self.meta.table == other.meta.table
    }
}
impl<M> Eq for ColumnRef<M> {}
impl<M> Hash for ColumnRef<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.meta.table.hash(state);
        self.meta.index.hash(state);
    }
}
impl<M> fmt::Debug for ColumnRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.meta, f)
    }
}
impl<M> fmt::Display for ColumnRef<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.meta.table, self.meta.sql_name)
    }
}

// ------------- Column -------------
/// A column of table `M` holding values of type `J`.
pub struct Column<M, J> {
    inner: ColumnRef<M>,
    _value: PhantomData<fn() -> J>,
}

impl<M, J: DataType> Column<M, J> {
    // The caller vouches that the column was declared with type J.
    fn from_ref(inner: ColumnRef<M>) -> Self {
        Self { inner, _value: PhantomData }
    }
    pub fn column_ref(&self) -> ColumnRef<M> {
        self.inner.clone()
    }
    pub fn to_raw(&self, value: Option<&J>) -> Value {
        value.map_or(Value::Null, J::to_raw)
    }
    pub fn from_raw(&self, raw: &Value) -> Result<Option<J>> {
        match raw {
            Value::Null => Ok(None),
            v => J::from_raw(v)
                .map(Some)
                .map_err(|reason| self.inner.type_cast(format!("{:?}", v), reason)),
        }
    }
    /// Null becomes the empty string, see [`ColumnRef::raw_string_is_lossy`].
    pub fn to_raw_string(&self, value: Option<&J>) -> String {
        value.map_or_else(String::new, J::to_raw_string)
    }
    pub fn from_raw_string(&self, s: &str) -> Result<Option<J>> {
        if s.is_empty() {
            return Ok(None);
        }
        J::from_raw_string(s)
            .map(Some)
            .map_err(|reason| self.inner.type_cast(format!("'{}'", s), reason))
    }
    pub fn default_value(&self) -> Option<J> {
        self.inner.default_raw().and_then(|raw| J::from_raw(&raw).ok())
    }
}
impl<M, J> Clone for Column<M, J> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), _value: PhantomData }
    }
}
impl<M, J> Deref for Column<M, J> {
    type Target = ColumnRef<M>;
    fn deref(&self) -> &ColumnRef<M> {
        &self.inner
    }
}
impl<M, J> fmt::Debug for Column<M, J> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}
impl<M, J> From<&Column<M, J>> for ColumnRef<M> {
    fn from(column: &Column<M, J>) -> Self {
        column.inner.clone()
    }
}

/// A foreign key column of table `M` referencing a column of table `N`.
pub struct FkColumn<M, J, N> {
    column: Column<M, J>,
    parent: Column<N, J>,
}
impl<M, J: DataType, N> FkColumn<M, J, N> {
    pub fn parent_column(&self) -> &Column<N, J> {
        &self.parent
    }
}
impl<M, J, N> Clone for FkColumn<M, J, N> {
    fn clone(&self) -> Self {
        Self { column: self.column.clone(), parent: self.parent.clone() }
    }
}
impl<M, J, N> Deref for FkColumn<M, J, N> {
    type Target = Column<M, J>;
    fn deref(&self) -> &Column<M, J> {
        &self.column
    }
}
impl<M, J, N> fmt::Debug for FkColumn<M, J, N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.column, f)
    }
}
impl<M, J, N> From<&FkColumn<M, J, N>> for ColumnRef<M> {
    fn from(column: &FkColumn<M, J, N>) -> Self {
        column.column.inner.clone()
    }
}

// ------------- Column declaration -------------
/// Columns declared so far for one table, in table order.
pub struct ColumnList<M> {
    table: String,
    columns: Vec<Arc<ColumnMeta>>,
    _table: PhantomData<fn() -> M>,
}
impl<M> ColumnList<M> {
    pub fn new(table: &str) -> Self {
        Self { table: table.to_owned(), columns: Vec::new(), _table: PhantomData }
    }
    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub struct ColumnBuilder<J: DataType> {
    sql_name: String,
    nullable: bool,
    unique: bool,
    editable: bool,
    default: Option<Arc<dyn Fn() -> J + Send + Sync>>,
}

/// Starts the declaration of a column named `sql_name`.
pub fn column<J: DataType>(sql_name: &str) -> ColumnBuilder<J> {
    ColumnBuilder {
        sql_name: sql_name.to_owned(),
        nullable: true,
        unique: false,
        editable: true,
        default: None,
    }
}

impl<J: DataType> ColumnBuilder<J> {
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
    pub fn not_editable(mut self) -> Self {
        self.editable = false;
        self
    }
    pub fn default<F>(mut self, supplier: F) -> Self
    where
        F: Fn() -> J + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(supplier));
        self
    }

    fn meta(self, table: &str, index: usize, parent: Option<ParentColumn>) -> ColumnMeta {
        let default = self.default.map(|supply| {
            let erased: Supplier = Arc::new(move || supply().to_raw());
            erased
        });
        ColumnMeta {
            table: table.to_owned(),
            sql_name: self.sql_name,
            index,
            data_type: J::DATA_TYPE,
            sql_type: J::SQL_TYPE,
            placeholder: J::placeholder(),
            holds_empty_string: J::HOLDS_EMPTY_STRING,
            nullable: self.nullable,
            unique: self.unique,
            editable: self.editable,
            default,
            parent,
            normalize: normalize::<J>,
            raw_to_string: raw_to_string::<J>,
            string_to_raw: string_to_raw::<J>,
        }
    }

    /// Appends the column to `columns`, which assigns its index.
    pub fn build_for<M>(self, columns: &mut ColumnList<M>) -> Column<M, J> {
        let meta = Arc::new(self.meta(&columns.table, columns.len(), None));
        columns.columns.push(Arc::clone(&meta));
        Column::from_ref(ColumnRef::from_meta(meta))
    }

    /// Like [`build_for`](Self::build_for), for a column referencing `parent`.
    pub fn build_fk_for<M, N>(self, parent: &Column<N, J>, columns: &mut ColumnList<M>) -> FkColumn<M, J, N> {
        let parent_ref = ParentColumn {
            table: parent.table_name().to_owned(),
            sql_name: parent.sql_name().to_owned(),
            index: parent.index(),
        };
        let meta = Arc::new(self.meta(&columns.table, columns.len(), Some(parent_ref)));
        columns.columns.push(Arc::clone(&meta));
        FkColumn {
            column: Column::from_ref(ColumnRef::from_meta(meta)),
            parent: parent.clone(),
        }
    }
}

// ------------- Table -------------
/// Ordered schema for one entity type.
pub struct Table<M> {
    name: String,
    columns: Vec<ColumnRef<M>>,
    by_name: HashMap<String, usize>,
}

impl<M> Table<M> {
    /// Builds the table, aborting when the column list is malformed.
    ///
    /// # Panics
    /// When [`try_new`](Self::try_new) fails. Tables are declared at startup,
    /// so a bad declaration is a bug to surface immediately.
    pub fn new(columns: ColumnList<M>) -> Self {
        match Self::try_new(columns) {
            Ok(table) => table,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn try_new(columns: ColumnList<M>) -> Result<Self> {
        let name = columns.table;
        if !SQL_NAME.is_match(&name) {
            return Err(MacrotrackError::Invariant(format!("'{}' is not a valid table name", name)));
        }
        let expected = [
            (ID, i64::DATA_TYPE),
            (CREATE_TIME, <Timestamp as DataType>::DATA_TYPE),
            (MODIFY_TIME, <Timestamp as DataType>::DATA_TYPE),
        ];
        for (position, (sql_name, data_type)) in expected.iter().enumerate() {
            match columns.columns.get(position) {
                Some(meta) if meta.sql_name == *sql_name && meta.data_type == *data_type => (),
                Some(meta) => {
                    return Err(MacrotrackError::Invariant(format!(
                        "table {} must have column {} ({}) at position {}, found {} ({})",
                        name, sql_name, data_type, position, meta.sql_name, meta.data_type
                    )));
                }
                None => {
                    return Err(MacrotrackError::Invariant(format!(
                        "table {} is missing column {} at position {}",
                        name, sql_name, position
                    )));
                }
            }
        }
        let mut by_name = HashMap::new();
        for (position, meta) in columns.columns.iter().enumerate() {
            if meta.index != position {
                return Err(MacrotrackError::Invariant(format!(
                    "column {}.{} has index {} but sits at position {}",
                    name, meta.sql_name, meta.index, position
                )));
            }
            if !SQL_NAME.is_match(&meta.sql_name) {
                return Err(MacrotrackError::Invariant(format!(
                    "'{}' is not a valid column name in table {}",
                    meta.sql_name, name
                )));
            }
            if by_name.insert(meta.sql_name.clone(), position).is_some() {
                return Err(MacrotrackError::Invariant(format!(
                    "duplicate column {} in table {}",
                    meta.sql_name, name
                )));
            }
        }
        Ok(Self {
            name,
            columns: columns.columns.into_iter().map(ColumnRef::from_meta).collect(),
            by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn columns(&self) -> &[ColumnRef<M>] {
        &self.columns
    }
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
    pub fn column_by_name(&self, sql_name: &str) -> Option<&ColumnRef<M>> {
        self.by_name.get(sql_name).map(|i| &self.columns[*i])
    }
    pub fn column_at(&self, index: usize) -> Option<&ColumnRef<M>> {
        self.columns.get(index)
    }
    pub fn id_column(&self) -> Column<M, i64> {
        Column::from_ref(self.columns[0].clone())
    }
    pub fn create_time_column(&self) -> Column<M, Timestamp> {
        Column::from_ref(self.columns[1].clone())
    }
    pub fn modify_time_column(&self) -> Column<M, Timestamp> {
        Column::from_ref(self.columns[2].clone())
    }
    pub fn columns_without_id(&self) -> Vec<ColumnRef<M>> {
        self.columns[1..].to_vec()
    }
    pub fn foreign_key_columns(&self) -> Vec<ColumnRef<M>> {
        self.columns.iter().filter(|c| c.is_foreign_key()).cloned().collect()
    }
    pub fn lossy_raw_string_columns(&self) -> Vec<ColumnRef<M>> {
        self.columns.iter().filter(|c| c.raw_string_is_lossy()).cloned().collect()
    }

    /// DDL for the table and its modify time trigger.
    pub fn create_sql(&self) -> Vec<String> {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut definition = format!("{} {}", c.sql_name(), c.sql_type());
                if c.index() == 0 {
                    definition.push_str(" PRIMARY KEY");
                } else {
                    if !c.is_nullable() {
                        definition.push_str(" NOT NULL");
                    }
                    if c.is_unique() {
                        definition.push_str(" UNIQUE");
                    }
                }
                if let Some(parent) = c.parent() {
                    definition.push_str(&format!(" REFERENCES {}({})", parent.table, parent.sql_name));
                }
                definition
            })
            .collect();
        let table = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            definitions.join(",\n    ")
        );
        let trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {name}_{modify} AFTER UPDATE ON {name} FOR EACH ROW \
             WHEN NEW.{modify} = OLD.{modify} BEGIN \
             UPDATE {name} SET {modify} = CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER) WHERE {id} = NEW.{id}; \
             END",
            name = self.name,
            modify = MODIFY_TIME,
            id = ID
        );
        vec![table, trigger]
    }
}

impl<M> fmt::Debug for Table<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("columns", &self.columns.iter().map(|c| c.sql_name()).collect::<Vec<_>>())
            .finish()
    }
}
