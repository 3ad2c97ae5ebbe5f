//! # pgreflect
//!
//! Read a PostgreSQL schema into a typed model
//!
//! This crate provides a CLI tool and library that query the system catalogs
//! and build a [`schema::SchemaModel`] of tables, columns, keys, indexes,
//! sequences and enum types.

pub mod config;
pub mod error;
pub mod introspect;
pub mod schema;

pub mod prelude {
    pub use crate::config::DbConfig;
    pub use crate::error::ReflectError;
    pub use crate::introspect::{build_model, Executor, Introspector, ModelBuilder, SelectionFilter};
    pub use crate::schema::{Column, ForeignKey, Index, SchemaModel, Sequence, Table, TableId};
}

#[cfg(feature = "postgres")]
pub use introspect::PostgresExecutor;
