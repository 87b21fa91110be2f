//! WHERE-expression builder.
//!
//! A [`Where`] always starts from one primary predicate; secondary predicates
//! can only be chained onto it with [`Where::and`] / [`Where::or`]. Building
//! yields a [`WhereExpr`]: the clause text, its bind values in placeholder
//! order, and whether the statement has to be run once per value.
//!
//! Iteration exists because SQLite caps the number of bound parameters per
//! statement. An IN-list longer than the iterate threshold is rendered as
//! `col = ?` and executed once per value instead.

use std::marker::PhantomData;

use rusqlite::types::Value;

use crate::datatype::DataType;
use crate::error::{MacrotrackError, Result};
use crate::schema::{Column, ColumnRef};

pub const DEFAULT_ITERATE_THRESHOLD: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}
impl Conjunction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Eq { column: String, placeholder: &'static str, value: Value },
    In { column: String, placeholder: &'static str, values: Vec<Value> },
    Null { column: String, negated: bool },
    Like { columns: Vec<String>, conjunction: Conjunction, pattern: String },
    Raw(String),
}

impl Predicate {
    fn binds(&self) -> usize {
        match self {
            Predicate::Eq { .. } => 1,
            Predicate::In { values, .. } => values.len(),
            Predicate::Like { columns, .. } => columns.len(),
            Predicate::Null { .. } | Predicate::Raw(_) => 0,
        }
    }
    // Fragments that may contain a top level OR get parenthesized once
    // anything is chained next to them.
    fn needs_group(&self) -> bool {
        match self {
            Predicate::Like { columns, .. } => columns.len() > 1,
            Predicate::Raw(_) => true,
            _ => false,
        }
    }
    fn render(&self, iterated: bool, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Predicate::Eq { column, placeholder, value } => {
                sql.push_str(&format!("{} = {}", column, placeholder));
                binds.push(value.clone());
            }
            Predicate::In { column, placeholder, values } if iterated => {
                sql.push_str(&format!("{} = {}", column, placeholder));
                binds.extend(values.iter().cloned());
            }
            Predicate::In { column, placeholder, values } => {
                let placeholders = vec![*placeholder; values.len()].join(", ");
                sql.push_str(&format!("{} IN ({})", column, placeholders));
                binds.extend(values.iter().cloned());
            }
            Predicate::Null { column, negated } => {
                let not = if *negated { " NOT" } else { "" };
                sql.push_str(&format!("{} IS{} NULL", column, not));
            }
            Predicate::Like { columns, conjunction, pattern } => {
                let parts: Vec<String> = columns.iter().map(|c| format!("({} LIKE ?)", c)).collect();
                sql.push_str(&parts.join(&format!(" {} ", conjunction.keyword())));
                binds.extend(columns.iter().map(|_| Value::Text(pattern.clone())));
            }
            Predicate::Raw(text) => sql.push_str(text),
        }
    }
}

/// Builder for the WHERE clause of a statement over table `M`.
pub struct Where<M> {
    primary: Predicate,
    suffixes: Vec<(Conjunction, Where<M>)>,
    force_iterate: bool,
    threshold: usize,
    _table: PhantomData<fn() -> M>,
}

impl<M> Clone for Where<M> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            suffixes: self.suffixes.clone(),
            force_iterate: self.force_iterate,
            threshold: self.threshold,
            _table: PhantomData,
        }
    }
}

impl<M> Where<M> {
    fn start(primary: Predicate) -> Self {
        Self {
            primary,
            suffixes: Vec::new(),
            force_iterate: false,
            threshold: DEFAULT_ITERATE_THRESHOLD,
            _table: PhantomData,
        }
    }

    /// `col = ?`
    pub fn eq<J: DataType>(column: &Column<M, J>, value: J) -> Self {
        Self::start(Predicate::Eq {
            column: column.sql_name().to_owned(),
            placeholder: column.placeholder(),
            value: value.to_raw(),
        })
    }
    /// `col IN (?, ?, ...)`, or `col = ?` executed once per value when
    /// iterated.
    pub fn is_in<J: DataType, I>(column: &Column<M, J>, values: I) -> Self
    where
        I: IntoIterator<Item = J>,
    {
        Self::start(Predicate::In {
            column: column.sql_name().to_owned(),
            placeholder: column.placeholder(),
            values: values.into_iter().map(|v| v.to_raw()).collect(),
        })
    }
    /// `col IS NULL`
    pub fn is_null(column: &ColumnRef<M>) -> Self {
        Self::start(Predicate::Null { column: column.sql_name().to_owned(), negated: false })
    }
    /// `col IS NOT NULL`
    pub fn is_not_null(column: &ColumnRef<M>) -> Self {
        Self::start(Predicate::Null { column: column.sql_name().to_owned(), negated: true })
    }
    /// `(c1 LIKE ?) OR (c2 LIKE ?) ...`, binding `pattern` once per column.
    pub fn like(columns: &[ColumnRef<M>], conjunction: Conjunction, pattern: &str) -> Self {
        Self::start(Predicate::Like {
            columns: columns.iter().map(|c| c.sql_name().to_owned()).collect(),
            conjunction,
            pattern: pattern.to_owned(),
        })
    }
    /// Opaque SQL, inserted as is.
    pub fn raw(sql: &str) -> Self {
        Self::start(Predicate::Raw(sql.to_owned()))
    }

    /// Forces an IN-list to be executed once per value.
    pub fn iterate(mut self) -> Self {
        self.force_iterate = true;
        self
    }
    /// IN-lists with more values than this are iterated.
    pub fn iterate_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }
    pub fn and(mut self, other: Where<M>) -> Self {
        self.suffixes.push((Conjunction::And, other));
        self
    }
    pub fn or(mut self, other: Where<M>) -> Self {
        self.suffixes.push((Conjunction::Or, other));
        self
    }

    fn iterated(&self) -> bool {
        match &self.primary {
            Predicate::In { values, .. } => self.force_iterate || values.len() > self.threshold,
            _ => false,
        }
    }
    fn bind_count(&self) -> usize {
        self.primary.binds() + self.suffixes.iter().map(|(_, w)| w.bind_count()).sum::<usize>()
    }
    fn is_compound(&self) -> bool {
        !self.suffixes.is_empty() || self.primary.needs_group()
    }

    // Suffixes are never iterated themselves; their IN-lists stay inline.
    fn render(&self, iterated: bool, sql: &mut String, binds: &mut Vec<Value>) {
        let group = !self.suffixes.is_empty() && self.primary.needs_group();
        if group {
            sql.push('(');
        }
        self.primary.render(iterated, sql, binds);
        if group {
            sql.push(')');
        }
        for (conjunction, suffix) in &self.suffixes {
            sql.push_str(&format!(" {} ", conjunction.keyword()));
            if suffix.is_compound() {
                sql.push('(');
                suffix.render(false, sql, binds);
                sql.push(')');
            } else {
                suffix.render(false, sql, binds);
            }
        }
    }

    pub fn build(self) -> Result<WhereExpr> {
        let iterated = self.iterated();
        if iterated {
            let suffix_binds: usize = self.suffixes.iter().map(|(_, w)| w.bind_count()).sum();
            if suffix_binds > 0 {
                return Err(MacrotrackError::Invariant(format!(
                    "an iterated WHERE clause cannot carry {} more bind values in its suffixes",
                    suffix_binds
                )));
            }
        }
        let mut sql = String::from("WHERE ");
        let mut binds = Vec::new();
        self.render(iterated, &mut sql, &mut binds);
        Ok(WhereExpr { sql, binds, iterated })
    }
}

/// A finished WHERE clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereExpr {
    sql: String,
    binds: Vec<Value>,
    iterated: bool,
}

impl WhereExpr {
    /// No WHERE clause at all.
    pub fn none() -> Self {
        Self::default()
    }
    pub fn sql(&self) -> &str {
        &self.sql
    }
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
    pub fn bind_arguments(&self) -> &[Value] {
        &self.binds
    }
    pub fn is_iterated(&self) -> bool {
        self.iterated
    }
    /// Bind values grouped per physical execution: one value each when
    /// iterated, everything at once otherwise.
    pub fn bind_batches(&self) -> Vec<Vec<Value>> {
        if self.iterated {
            self.binds.iter().map(|v| vec![v.clone()]).collect()
        } else {
            vec![self.binds.clone()]
        }
    }
}
