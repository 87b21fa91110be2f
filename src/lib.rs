//! Macrotrack – the typed persistence layer of a personal nutrition tracker.
//!
//! Everything the tracker stores goes through a small set of typed building
//! blocks:
//! * A [`schema::Table`] is an ordered list of [`schema::Column`]s, declared
//!   once at startup. A column is typed twice: by the table marker `M` it
//!   belongs to, and by the value type `J` it holds (any [`datatype::DataType`]).
//!   Applying a `Food` column to a `Meal` row does not compile.
//! * A [`rowdata::RowData`] holds the values of one row, or of a chosen subset
//!   of its columns, and can be frozen once complete.
//! * [`clause::Where`] and the builders in [`query`] render parameterized SQL
//!   together with the values to bind, including the per-value iteration used
//!   for IN-lists that exceed SQLite's bound parameter limit.
//! * An [`entity::Entity`] is a frozen row plus the [`entity::ObjectSource`] it
//!   came from. The source decides whether the row must carry an id.
//!
//! ## Modules
//! * [`datatype`] – The [`datatype::DataType`] trait and the built-in value types.
//! * [`schema`] – Columns, foreign key columns, tables and their DDL.
//! * [`rowdata`] – Sparse typed rows.
//! * [`clause`] – WHERE-expression composition.
//! * [`query`] – Select, insert, update and delete statements.
//! * [`entity`] – Entity provenance and deferred foreign keys.
//! * [`foreign`] – Completion of deferred foreign keys.
//! * [`persist`] – SQLite execution of built statements.
//! * [`config`] – Runtime settings.
//! * [`nutrition`] – The tracker's own tables.
//!
//! ## Deferred foreign keys
//! Imported rows name their parents by natural key (a food's `index_name`)
//! rather than by id. Each entity records the pending key per FK column, and
//! [`foreign::complete_fk_ids_from`] resolves all of them with one query once
//! the parents are stored.
//!
//! ## Quick Start
//! ```
//! use macrotrack::nutrition::{Food, FOOD};
//! use macrotrack::persist::{open, Executor, PersistenceMode, Persistor};
//! use macrotrack::query::{Insert, Select};
//! use macrotrack::rowdata::RowData;
//! use macrotrack::schema::Schema;
//!
//! let connection = open(&PersistenceMode::InMemory).unwrap();
//! let persistor = Persistor::new(&connection);
//! persistor.create_table::<Food>().unwrap();
//!
//! let mut oats = RowData::with_defaults(Food::table());
//! oats.put(&FOOD.index_name, Some(String::from("oats")));
//! oats.put(&FOOD.name, Some(String::from("Rolled oats")));
//! let insert = Insert::<Food>::without_id().build().unwrap();
//! let ids = persistor.insert(&insert, &[oats]).unwrap();
//! assert_eq!(ids.len(), 1);
//!
//! let names = persistor.select(&Select::non_null(&FOOD.name).build().unwrap()).unwrap();
//! assert_eq!(names, vec![String::from("Rolled oats")]);
//! ```

pub mod clause;
pub mod config;
pub mod datatype;
pub mod entity;
pub mod error;
pub mod foreign;
pub mod nutrition;
pub mod persist;
pub mod query;
pub mod rowdata;
pub mod schema;

pub use error::{MacrotrackError, Result};
