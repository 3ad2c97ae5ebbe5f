use std::collections::HashMap;

use super::catalog::CatalogQuery;
use super::executor::{Executor, Param, Row, Value};
use crate::error::ReflectError;

/// Catalog row under construction
#[derive(Debug, Clone, Default)]
pub struct RowBuilder(Vec<(String, Value)>);

impl RowBuilder {
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| name == column) {
            Some(field) => field.1 = value,
            None => self.0.push((column.to_string(), value)),
        }
        self
    }

    pub fn build(self) -> Row {
        Row::new(self.0)
    }
}

pub fn table(oid: i64, schema: &str, name: &str) -> RowBuilder {
    RowBuilder::default()
        .set("table_id", oid)
        .set("schema_name", schema)
        .set("table_name", name)
        .set("kind", "r")
        .set("comment", None::<&str>)
}

/// Nullable column of a `pg_catalog` type with no modifier or default
pub fn column(oid: i64, attnum: i64, name: &str, type_name: &str) -> RowBuilder {
    RowBuilder::default()
        .set("table_id", oid)
        .set("attnum", attnum)
        .set("column_name", name)
        .set("type_name", type_name)
        .set("type_schema", "pg_catalog")
        .set("type_modifier", -1_i64)
        .set("is_nullable", true)
        .set("default_value", None::<&str>)
        .set("identity", "")
        .set("generated", "")
        .set("collation", None::<&str>)
        .set("comment", None::<&str>)
}

/// Primary key / unique constraint member
pub fn key(oid: i64, constraint: &str, ordinal: i64, attnum: i64) -> RowBuilder {
    RowBuilder::default()
        .set("table_id", oid)
        .set("constraint_name", constraint)
        .set("key_ordinal", ordinal)
        .set("attnum", attnum)
}

pub fn index(oid: i64, name: &str, is_unique: bool, ordinal: i64, attnum: i64) -> RowBuilder {
    RowBuilder::default()
        .set("table_id", oid)
        .set("index_name", name)
        .set("is_unique", is_unique)
        .set("method", "btree")
        .set("filter", None::<&str>)
        .set("key_ordinal", ordinal)
        .set("attnum", attnum)
}

pub fn foreign_key(
    oid: i64,
    name: &str,
    principal_oid: i64,
    ordinal: i64,
    attnum: i64,
    principal_attnum: i64,
) -> RowBuilder {
    RowBuilder::default()
        .set("table_id", oid)
        .set("constraint_name", name)
        .set("principal_table_id", principal_oid)
        .set("on_delete", "a")
        .set("on_update", "a")
        .set("key_ordinal", ordinal)
        .set("attnum", attnum)
        .set("principal_attnum", principal_attnum)
}

/// `bigint` sequence with PostgreSQL default parameters and no owner
pub fn sequence(schema: &str, name: &str) -> RowBuilder {
    RowBuilder::default()
        .set("schema_name", schema)
        .set("sequence_name", name)
        .set("type_name", "int8")
        .set("start_value", 1_i64)
        .set("increment_by", 1_i64)
        .set("min_value", 1_i64)
        .set("max_value", i64::MAX)
        .set("is_cyclic", false)
        .set("owner_table_id", None::<i64>)
        .set("owner_attnum", None::<i64>)
        .set("owner_kind", None::<&str>)
}

pub fn owned_by(builder: RowBuilder, oid: i64, attnum: i64, kind: &str) -> RowBuilder {
    builder
        .set("owner_table_id", oid)
        .set("owner_attnum", attnum)
        .set("owner_kind", kind)
}

/// Executor serving canned rows per catalog query.
///
/// Parameters are recorded but not applied, so scoped queries return every
/// configured row and the builder has to prune.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    responses: HashMap<&'static str, Vec<Row>>,
    fail_on: Option<&'static str>,
    pub calls: Vec<(&'static str, Vec<Param>)>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default().with(
            super::catalog::DEFAULT_SCHEMA,
            vec![RowBuilder::default().set("schema_name", "public")],
        )
    }

    pub fn with(mut self, query: CatalogQuery, rows: Vec<RowBuilder>) -> Self {
        self.responses
            .insert(query.sql, rows.into_iter().map(RowBuilder::build).collect());
        self
    }

    pub fn failing_on(mut self, query: CatalogQuery) -> Self {
        self.fail_on = Some(query.sql);
        self
    }

    /// Parameters of the first call of a query
    pub fn params_of(&self, query: CatalogQuery) -> Option<&[Param]> {
        self.calls
            .iter()
            .find(|(sql, _)| *sql == query.sql)
            .map(|(_, params)| params.as_slice())
    }
}

impl Executor for FakeExecutor {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, ReflectError> {
        let known = super::catalog::ALL
            .iter()
            .find(|q| q.sql == sql)
            .map(|q| q.sql)
            .ok_or_else(|| ReflectError::Connection(format!("unexpected query: {sql}")))?;
        self.calls.push((known, params.to_vec()));

        if self.fail_on == Some(known) {
            return Err(ReflectError::Connection("connection reset by peer".to_string()));
        }
        Ok(self.responses.get(known).cloned().unwrap_or_default())
    }
}
