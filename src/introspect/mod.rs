//! Database introspection
//!
//! Catalog queries run through an [`Executor`]; the [`builder`] links their
//! rows into a [`SchemaModel`]. The only driver binding lives behind the
//! `postgres` feature.

use crate::prelude::{ReflectError, SchemaModel};

pub mod builder;
pub mod catalog;
pub mod executor;
pub mod filter;
pub mod normalize;
pub mod ownership;

#[cfg(test)]
mod testutil;

pub use builder::{build_model, ModelBuilder};
pub use executor::{Executor, Param, Row, Value};
pub use filter::SelectionFilter;

#[cfg(feature = "postgres")]
pub use executor::PostgresExecutor;

/// Trait for database introspection implementations
pub trait Introspector {
    /// Introspect the database and return the schema model selected by `filter`
    fn introspect(&mut self, filter: &SelectionFilter) -> Result<SchemaModel, ReflectError>;
}
