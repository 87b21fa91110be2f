//! SQL statement builders.
//!
//! Each builder collects the parts of one statement and is consumed by
//! `build()`, which renders the SQL text once and returns an immutable
//! statement. Statements expose what an executor needs through the
//! [`Statement`] trait: the SQL text, the bind values and whether those values
//! must be bound one per execution.
//!
//! ```
//! use macrotrack::nutrition::{FOOD, FoodType};
//! use macrotrack::clause::Where;
//! use macrotrack::query::{Select, Statement};
//!
//! let select = Select::single(&FOOD.index_name)
//!     .filter(Where::is_in(&FOOD.food_type, [FoodType::Primary, FoodType::Composite]))
//!     .build()
//!     .unwrap();
//! assert_eq!(select.to_sql(), "SELECT index_name FROM Food WHERE food_type IN (?, ?)");
//! assert!(!select.should_iterate_bind_arguments());
//! ```

use std::marker::PhantomData;

use rusqlite::types::Value;

use crate::clause::{Where, WhereExpr};
use crate::datatype::DataType;
use crate::error::{MacrotrackError, Result};
use crate::rowdata::RowData;
use crate::schema::{Column, ColumnRef, Schema, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Select,
    Insert,
    Update,
    Delete,
}

/// What an executor reads from a built statement.
pub trait Statement {
    fn mode(&self) -> Mode;
    fn table_name(&self) -> &str;
    fn to_sql(&self) -> String;
    /// Bind values carried by the statement itself. Insert and update
    /// templates carry none; their values come from the rows.
    fn bind_arguments(&self) -> &[Value];
    fn has_bind_arguments(&self) -> bool {
        !self.bind_arguments().is_empty()
    }
    /// True when the statement runs once per bind value. Selects built this
    /// way carry no DISTINCT, ORDER BY, GROUP BY, LIMIT or OFFSET.
    fn should_iterate_bind_arguments(&self) -> bool;
    /// Bind values grouped per physical execution.
    fn bind_batches(&self) -> Vec<Vec<Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

#[derive(Debug, Clone)]
enum OrderBy {
    Column { expr: String, order: Order, nulls: Option<Nulls> },
    Raw(String),
}
impl OrderBy {
    fn render(&self) -> String {
        match self {
            OrderBy::Column { expr, order, nulls } => {
                let direction = match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                };
                let nulls = match nulls {
                    Some(Nulls::First) => " NULLS FIRST",
                    Some(Nulls::Last) => " NULLS LAST",
                    None => "",
                };
                format!("ORDER BY {} {}{}", expr, direction, nulls)
            }
            OrderBy::Raw(text) => format!("ORDER BY {}", text),
        }
    }
}

// ------------- Projections -------------
/// The shape of a select's result rows.
pub trait Projection<M: Schema> {
    type Output;
    /// Selected columns, in result order.
    fn columns(&self) -> Vec<ColumnRef<M>>;
    /// Whether the projection is rendered as `*`.
    fn is_star(&self) -> bool {
        false
    }
    fn check(&self) -> Result<()> {
        Ok(())
    }
    /// Turns one result row into output; `None` drops the row.
    fn read(&self, raw: Vec<Value>) -> Result<Option<Self::Output>>;
}

pub struct SingleColumn<M, J>(Column<M, J>);
pub struct NonNullColumn<M, J>(Column<M, J>);
pub struct TwoColumns<M, I, J>(Column<M, I>, Column<M, J>);
pub struct MultiColumn<M>(Vec<ColumnRef<M>>);
pub struct AllColumns;

static NULL: Value = Value::Null;

fn raw_at(raw: &[Value], index: usize) -> &Value {
    raw.get(index).unwrap_or(&NULL)
}

fn read_row<M: Schema>(columns: &[ColumnRef<M>], raw: Vec<Value>) -> Result<RowData<M>> {
    let mut row = RowData::with_columns(M::table(), columns);
    for (column, value) in columns.iter().zip(raw.iter()) {
        row.put_from_raw(column, value)?;
    }
    row.make_immutable();
    Ok(row)
}

impl<M: Schema, J: DataType> Projection<M> for SingleColumn<M, J> {
    type Output = Option<J>;
    fn columns(&self) -> Vec<ColumnRef<M>> {
        vec![self.0.column_ref()]
    }
    fn read(&self, raw: Vec<Value>) -> Result<Option<Option<J>>> {
        self.0.from_raw(raw_at(&raw, 0)).map(Some)
    }
}
impl<M: Schema, J: DataType> Projection<M> for NonNullColumn<M, J> {
    type Output = J;
    fn columns(&self) -> Vec<ColumnRef<M>> {
        vec![self.0.column_ref()]
    }
    fn check(&self) -> Result<()> {
        if self.0.is_nullable() {
            return Err(MacrotrackError::Invariant(format!(
                "column {} is nullable and cannot be selected as non-null",
                self.0.column_ref()
            )));
        }
        Ok(())
    }
    fn read(&self, raw: Vec<Value>) -> Result<Option<J>> {
        self.0.from_raw(raw_at(&raw, 0))
    }
}
impl<M: Schema, I: DataType, J: DataType> Projection<M> for TwoColumns<M, I, J> {
    type Output = (Option<I>, Option<J>);
    fn columns(&self) -> Vec<ColumnRef<M>> {
        vec![self.0.column_ref(), self.1.column_ref()]
    }
    fn read(&self, raw: Vec<Value>) -> Result<Option<(Option<I>, Option<J>)>> {
        let first = self.0.from_raw(raw_at(&raw, 0))?;
        let second = self.1.from_raw(raw_at(&raw, 1))?;
        Ok(Some((first, second)))
    }
}
impl<M: Schema> Projection<M> for MultiColumn<M> {
    type Output = RowData<M>;
    fn columns(&self) -> Vec<ColumnRef<M>> {
        self.0.clone()
    }
    fn check(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(MacrotrackError::Invariant(String::from("a multi-column select needs columns")));
        }
        Ok(())
    }
    fn read(&self, raw: Vec<Value>) -> Result<Option<RowData<M>>> {
        read_row(&self.0, raw).map(Some)
    }
}
impl<M: Schema> Projection<M> for AllColumns {
    type Output = RowData<M>;
    fn columns(&self) -> Vec<ColumnRef<M>> {
        M::table().columns().to_vec()
    }
    fn is_star(&self) -> bool {
        true
    }
    fn read(&self, raw: Vec<Value>) -> Result<Option<RowData<M>>> {
        read_row(M::table().columns(), raw).map(Some)
    }
}

// ------------- Select -------------
pub struct SelectBuilder<M, P> {
    projection: P,
    distinct: bool,
    filter: Option<Where<M>>,
    order_by: Option<OrderBy>,
    group_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    from_suffix: Option<String>,
    raw_suffix: Option<String>,
}

/// A built select over table `M` with result shape `P`.
pub struct Select<M, P> {
    projection: P,
    sql: String,
    filter: WhereExpr,
    _table: PhantomData<fn() -> M>,
}

impl<M: Schema, J: DataType> Select<M, SingleColumn<M, J>> {
    /// Selects one column, yielding `Option<J>` per row.
    pub fn single(column: &Column<M, J>) -> SelectBuilder<M, SingleColumn<M, J>> {
        SelectBuilder::new(SingleColumn(column.clone()))
    }
}
impl<M: Schema, J: DataType> Select<M, NonNullColumn<M, J>> {
    /// Selects one not-null column, yielding `J` per row and dropping nulls.
    /// Building fails if the column is nullable.
    pub fn non_null(column: &Column<M, J>) -> SelectBuilder<M, NonNullColumn<M, J>> {
        SelectBuilder::new(NonNullColumn(column.clone()))
    }
}
impl<M: Schema, I: DataType, J: DataType> Select<M, TwoColumns<M, I, J>> {
    pub fn two(first: &Column<M, I>, second: &Column<M, J>) -> SelectBuilder<M, TwoColumns<M, I, J>> {
        SelectBuilder::new(TwoColumns(first.clone(), second.clone()))
    }
}
impl<M: Schema> Select<M, MultiColumn<M>> {
    pub fn multi(columns: &[ColumnRef<M>]) -> SelectBuilder<M, MultiColumn<M>> {
        SelectBuilder::new(MultiColumn(columns.to_vec()))
    }
}
impl<M: Schema> Select<M, AllColumns> {
    pub fn all() -> SelectBuilder<M, AllColumns> {
        SelectBuilder::new(AllColumns)
    }
}

impl<M: Schema, P: Projection<M>> SelectBuilder<M, P> {
    fn new(projection: P) -> Self {
        Self {
            projection,
            distinct: false,
            filter: None,
            order_by: None,
            group_by: None,
            limit: None,
            offset: None,
            from_suffix: None,
            raw_suffix: None,
        }
    }
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
    pub fn filter(mut self, filter: Where<M>) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn order_by(self, column: &ColumnRef<M>, order: Order) -> Self {
        self.order_by_expr(column.sql_name(), order, None)
    }
    pub fn order_by_nulls(self, column: &ColumnRef<M>, order: Order, nulls: Nulls) -> Self {
        self.order_by_expr(column.sql_name(), order, Some(nulls))
    }
    /// Orders by an arbitrary expression, e.g. `LOWER(name)`.
    pub fn order_by_expr(mut self, expr: &str, order: Order, nulls: Option<Nulls>) -> Self {
        self.order_by = Some(OrderBy::Column { expr: expr.to_owned(), order, nulls });
        self
    }
    /// Everything after `ORDER BY`, verbatim.
    pub fn order_by_raw(mut self, text: &str) -> Self {
        self.order_by = Some(OrderBy::Raw(text.to_owned()));
        self
    }
    pub fn group_by(mut self, column: &ColumnRef<M>) -> Self {
        self.group_by = Some(column.sql_name().to_owned());
        self
    }
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
    /// Extra select-list text placed after the projected columns.
    pub fn from_suffix(mut self, text: &str) -> Self {
        self.from_suffix = Some(text.to_owned());
        self
    }
    /// Text appended after everything else.
    pub fn raw_suffix(mut self, text: &str) -> Self {
        self.raw_suffix = Some(text.to_owned());
        self
    }

    pub fn build(self) -> Result<Select<M, P>> {
        self.projection.check()?;
        let filter = match self.filter {
            Some(filter) => filter.build()?,
            None => WhereExpr::none(),
        };
        // these clauses would apply to each execution, not to the whole result
        if filter.is_iterated() {
            let shaping = [
                (self.distinct, "DISTINCT"),
                (self.order_by.is_some(), "ORDER BY"),
                (self.group_by.is_some(), "GROUP BY"),
                (self.limit.is_some(), "LIMIT"),
                (self.offset.is_some(), "OFFSET"),
            ];
            let clauses: Vec<&str> = shaping.iter().filter(|(set, _)| *set).map(|(_, clause)| *clause).collect();
            if !clauses.is_empty() {
                return Err(MacrotrackError::Invariant(format!(
                    "{} cannot be combined with an iterated filter on {}",
                    clauses.join(", "),
                    M::table().name()
                )));
            }
        }
        let mut parts: Vec<String> = vec![String::from("SELECT")];
        if self.distinct {
            parts.push(String::from("DISTINCT"));
        }
        let mut projected = if self.projection.is_star() {
            String::from("*")
        } else {
            self.projection
                .columns()
                .iter()
                .map(|c| c.sql_name().to_owned())
                .collect::<Vec<_>>()
                .join(", ")
        };
        if let Some(suffix) = &self.from_suffix {
            projected.push_str(", ");
            projected.push_str(suffix);
        }
        parts.push(projected);
        parts.push(format!("FROM {}", M::table().name()));
        if !filter.is_empty() {
            parts.push(filter.sql().to_owned());
        }
        if let Some(group) = &self.group_by {
            parts.push(format!("GROUP BY {}", group));
        }
        if let Some(order) = &self.order_by {
            parts.push(order.render());
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => parts.push(format!("LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => parts.push(format!("LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) => parts.push(format!("LIMIT -1 OFFSET {}", offset)),
            (None, None) => (),
        }
        if let Some(suffix) = &self.raw_suffix {
            parts.push(suffix.clone());
        }
        Ok(Select {
            projection: self.projection,
            sql: parts.join(" "),
            filter,
            _table: PhantomData,
        })
    }
}

impl<M: Schema, P: Projection<M>> Select<M, P> {
    /// Number of leading result columns the projection reads.
    pub fn result_width(&self) -> usize {
        self.projection.columns().len()
    }
    pub fn read(&self, raw: Vec<Value>) -> Result<Option<P::Output>> {
        self.projection.read(raw)
    }
    pub fn filter(&self) -> &WhereExpr {
        &self.filter
    }
}

impl<M: Schema, P: Projection<M>> Statement for Select<M, P> {
    fn mode(&self) -> Mode {
        Mode::Select
    }
    fn table_name(&self) -> &str {
        M::table().name()
    }
    fn to_sql(&self) -> String {
        self.sql.clone()
    }
    fn bind_arguments(&self) -> &[Value] {
        self.filter.bind_arguments()
    }
    fn should_iterate_bind_arguments(&self) -> bool {
        self.filter.is_iterated()
    }
    fn bind_batches(&self) -> Vec<Vec<Value>> {
        self.filter.bind_batches()
    }
}

fn missing_columns<M: Schema>(row: &RowData<M>, columns: &[ColumnRef<M>]) -> MacrotrackError {
    let missing: Vec<&str> = columns
        .iter()
        .filter(|c| !row.has_column(c))
        .map(|c| c.sql_name())
        .collect();
    MacrotrackError::Invariant(format!(
        "{} row lacks statement columns {}",
        M::table().name(),
        missing.join(", ")
    ))
}

// ------------- Insert -------------
pub struct InsertBuilder<M> {
    columns: Vec<ColumnRef<M>>,
}

/// One parameterized `INSERT` template, bound once per row.
pub struct Insert<M> {
    columns: Vec<ColumnRef<M>>,
    sql: String,
    _table: PhantomData<fn() -> M>,
}

impl<M: Schema> Insert<M> {
    /// Inserts every column but `id`; the database generates the ids.
    pub fn without_id() -> InsertBuilder<M> {
        InsertBuilder { columns: M::table().columns_without_id() }
    }
    /// Inserts every column including caller supplied ids.
    pub fn with_id() -> InsertBuilder<M> {
        InsertBuilder { columns: M::table().columns().to_vec() }
    }
    pub fn with_columns(columns: &[ColumnRef<M>]) -> InsertBuilder<M> {
        InsertBuilder { columns: columns.to_vec() }
    }

    pub fn columns(&self) -> &[ColumnRef<M>] {
        &self.columns
    }
    pub fn includes_id(&self) -> bool {
        self.columns.iter().any(|c| c.index() == 0)
    }
    /// Bind values for one row, in template order.
    pub fn bind_row(&self, row: &RowData<M>) -> Result<Vec<Value>> {
        if !row.has_columns(&self.columns) {
            return Err(missing_columns(row, &self.columns));
        }
        Ok(self.columns.iter().map(|c| row.get_as_raw(c)).collect())
    }
}

impl<M: Schema> InsertBuilder<M> {
    pub fn build(self) -> Result<Insert<M>> {
        if self.columns.is_empty() {
            return Err(MacrotrackError::Invariant(format!(
                "an insert into {} needs columns",
                M::table().name()
            )));
        }
        let names: Vec<&str> = self.columns.iter().map(|c| c.sql_name()).collect();
        let placeholders: Vec<&str> = self.columns.iter().map(|c| c.placeholder()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            M::table().name(),
            names.join(", "),
            placeholders.join(", ")
        );
        Ok(Insert { columns: self.columns, sql, _table: PhantomData })
    }
}

impl<M: Schema> Statement for Insert<M> {
    fn mode(&self) -> Mode {
        Mode::Insert
    }
    fn table_name(&self) -> &str {
        M::table().name()
    }
    fn to_sql(&self) -> String {
        self.sql.clone()
    }
    fn bind_arguments(&self) -> &[Value] {
        &[]
    }
    fn should_iterate_bind_arguments(&self) -> bool {
        false
    }
    fn bind_batches(&self) -> Vec<Vec<Value>> {
        Vec::new()
    }
}

// ------------- Update -------------
pub struct UpdateBuilder<M> {
    columns: Vec<ColumnRef<M>>,
    key: ColumnRef<M>,
}

/// `UPDATE table SET a=?, b=? WHERE key = ?`, bound once per row with the
/// row's own key value last.
pub struct Update<M> {
    columns: Vec<ColumnRef<M>>,
    key: ColumnRef<M>,
    sql: String,
}

impl<M: Schema> Update<M> {
    /// Updates every column but `id`, keyed by `id`.
    pub fn builder() -> UpdateBuilder<M> {
        let table: &Table<M> = M::table();
        UpdateBuilder {
            columns: table.columns_without_id(),
            key: table.id_column().column_ref(),
        }
    }
    pub fn columns(&self) -> &[ColumnRef<M>] {
        &self.columns
    }
    pub fn key(&self) -> &ColumnRef<M> {
        &self.key
    }
    pub fn bind_row(&self, row: &RowData<M>) -> Result<Vec<Value>> {
        if !row.has_columns(&self.columns) || !row.has_column(&self.key) {
            let mut wanted = self.columns.clone();
            wanted.push(self.key.clone());
            return Err(missing_columns(row, &wanted));
        }
        let key = row.get_as_raw(&self.key);
        if matches!(key, Value::Null) {
            return Err(MacrotrackError::Invariant(format!(
                "cannot update a {} row without a value for {}",
                M::table().name(),
                self.key.sql_name()
            )));
        }
        let mut values: Vec<Value> = self.columns.iter().map(|c| row.get_as_raw(c)).collect();
        values.push(key);
        Ok(values)
    }
}

impl<M: Schema> UpdateBuilder<M> {
    pub fn columns(mut self, columns: &[ColumnRef<M>]) -> Self {
        self.columns = columns.to_vec();
        self
    }
    pub fn key(mut self, key: &ColumnRef<M>) -> Self {
        self.key = key.clone();
        self
    }
    pub fn build(self) -> Result<Update<M>> {
        if self.columns.is_empty() {
            return Err(MacrotrackError::Invariant(format!(
                "an update of {} needs columns",
                M::table().name()
            )));
        }
        let assignments: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}={}", c.sql_name(), c.placeholder()))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            M::table().name(),
            assignments.join(", "),
            self.key.sql_name(),
            self.key.placeholder()
        );
        Ok(Update { columns: self.columns, key: self.key, sql })
    }
}

impl<M: Schema> Statement for Update<M> {
    fn mode(&self) -> Mode {
        Mode::Update
    }
    fn table_name(&self) -> &str {
        M::table().name()
    }
    fn to_sql(&self) -> String {
        self.sql.clone()
    }
    fn bind_arguments(&self) -> &[Value] {
        &[]
    }
    fn should_iterate_bind_arguments(&self) -> bool {
        false
    }
    fn bind_batches(&self) -> Vec<Vec<Value>> {
        Vec::new()
    }
}

// ------------- Delete -------------
pub struct DeleteBuilder<M> {
    filter: Option<Where<M>>,
}

pub struct Delete<M> {
    sql: String,
    filter: WhereExpr,
    _table: PhantomData<fn() -> M>,
}

impl<M: Schema> Delete<M> {
    pub fn builder() -> DeleteBuilder<M> {
        DeleteBuilder { filter: None }
    }
}

impl<M: Schema> DeleteBuilder<M> {
    pub fn filter(mut self, filter: Where<M>) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn build(self) -> Result<Delete<M>> {
        let filter = match self.filter {
            Some(filter) => filter.build()?,
            None => WhereExpr::none(),
        };
        let mut sql = format!("DELETE FROM {}", M::table().name());
        if !filter.is_empty() {
            sql.push(' ');
            sql.push_str(filter.sql());
        }
        Ok(Delete { sql, filter, _table: PhantomData })
    }
}

impl<M: Schema> Statement for Delete<M> {
    fn mode(&self) -> Mode {
        Mode::Delete
    }
    fn table_name(&self) -> &str {
        M::table().name()
    }
    fn to_sql(&self) -> String {
        self.sql.clone()
    }
    fn bind_arguments(&self) -> &[Value] {
        self.filter.bind_arguments()
    }
    fn should_iterate_bind_arguments(&self) -> bool {
        self.filter.is_iterated()
    }
    fn bind_batches(&self) -> Vec<Vec<Value>> {
        self.filter.bind_batches()
    }
}
