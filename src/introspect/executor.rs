//! Query execution
//!
//! The builder never talks to a driver directly. It hands SQL text and
//! [`Param`]s to an [`Executor`] and reads back driver-neutral [`Row`]s.

use crate::error::ReflectError;

/// A single field value in a catalog row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    TextArray(Vec<String>),
    IdArray(Vec<i64>),
}

/// A result row with field access by column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Row {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Row {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    pub fn value(&self, column: &str) -> Result<&Value, ReflectError> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
            .ok_or_else(|| ReflectError::UnexpectedRow {
                column: column.to_string(),
                message: "column missing from row".to_string(),
            })
    }

    pub fn get_opt_str(&self, column: &str) -> Result<Option<&str>, ReflectError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            other => Err(mismatch(column, "text", other)),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<&str, ReflectError> {
        self.get_opt_str(column)?.ok_or_else(|| null_value(column))
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>, ReflectError> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(*i)),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, ReflectError> {
        self.get_opt_i64(column)?.ok_or_else(|| null_value(column))
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, ReflectError> {
        match self.value(column)? {
            Value::Bool(b) => Ok(*b),
            Value::Null => Err(null_value(column)),
            other => Err(mismatch(column, "boolean", other)),
        }
    }
}

fn mismatch(column: &str, expected: &str, found: &Value) -> ReflectError {
    ReflectError::UnexpectedRow {
        column: column.to_string(),
        message: format!("expected {expected}, found {found:?}"),
    }
}

fn null_value(column: &str) -> ReflectError {
    ReflectError::UnexpectedRow {
        column: column.to_string(),
        message: "unexpected NULL".to_string(),
    }
}

/// Runs catalog queries
///
/// One call runs one statement to completion. Implementations report any
/// driver failure as [`ReflectError::Connection`].
pub trait Executor {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, ReflectError>;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, ReflectError> {
        (**self).query(sql, params)
    }
}

#[cfg(feature = "postgres")]
pub use self::pg::PostgresExecutor;

#[cfg(feature = "postgres")]
mod pg {
    use postgres::types::{ToSql, Type};
    use postgres::Client;

    use super::{Executor, Param, Row, Value};
    use crate::error::ReflectError;

    /// [`Executor`] over a blocking `postgres` client
    pub struct PostgresExecutor<'a> {
        client: &'a mut Client,
    }

    impl<'a> PostgresExecutor<'a> {
        pub fn new(client: &'a mut Client) -> Self {
            Self { client }
        }
    }

    impl Executor for PostgresExecutor<'_> {
        fn query(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Row>, ReflectError> {
            let owned: Vec<Box<dyn ToSql + Sync>> = params
                .iter()
                .map(|p| -> Box<dyn ToSql + Sync> {
                    match p {
                        Param::TextArray(v) => Box::new(v.clone()),
                        Param::IdArray(v) => Box::new(v.clone()),
                    }
                })
                .collect();
            let refs: Vec<&(dyn ToSql + Sync)> = owned.iter().map(|p| p.as_ref()).collect();

            let rows = self
                .client
                .query(sql, &refs)
                .map_err(|e| ReflectError::Connection(e.to_string()))?;

            rows.iter().map(convert_row).collect()
        }
    }

    fn convert_row(row: &postgres::Row) -> Result<Row, ReflectError> {
        let mut fields = Vec::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            let ty = column.type_();
            let value = if *ty == Type::TEXT || *ty == Type::NAME || *ty == Type::VARCHAR {
                Value::from(row.try_get::<_, Option<String>>(idx).map_err(|e| decode(column.name(), e))?)
            } else if *ty == Type::INT8 {
                Value::from(row.try_get::<_, Option<i64>>(idx).map_err(|e| decode(column.name(), e))?)
            } else if *ty == Type::INT4 {
                row.try_get::<_, Option<i32>>(idx)
                    .map_err(|e| decode(column.name(), e))?
                    .map_or(Value::Null, |v| Value::Int(i64::from(v)))
            } else if *ty == Type::INT2 {
                row.try_get::<_, Option<i16>>(idx)
                    .map_err(|e| decode(column.name(), e))?
                    .map_or(Value::Null, |v| Value::Int(i64::from(v)))
            } else if *ty == Type::BOOL {
                Value::from(row.try_get::<_, Option<bool>>(idx).map_err(|e| decode(column.name(), e))?)
            } else {
                return Err(ReflectError::UnexpectedRow {
                    column: column.name().to_string(),
                    message: format!("unsupported column type {ty}"),
                });
            };
            fields.push((column.name().to_string(), value));
        }
        Ok(Row::new(fields))
    }

    fn decode(column: &str, e: postgres::Error) -> ReflectError {
        ReflectError::UnexpectedRow {
            column: column.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::from_iter([
            ("name", Value::from("users")),
            ("id", Value::from(16384_i64)),
            ("comment", Value::Null),
            ("unique", Value::from(true)),
        ])
    }

    #[test]
    fn test_typed_access() {
        let row = row();
        assert_eq!(row.get_str("name").unwrap(), "users");
        assert_eq!(row.get_i64("id").unwrap(), 16384);
        assert_eq!(row.get_opt_str("comment").unwrap(), None);
        assert_eq!(row.get_opt_i64("comment").unwrap(), None);
        assert!(row.get_bool("unique").unwrap());
    }

    #[test]
    fn test_missing_column() {
        let err = row().get_str("schema_name").unwrap_err();
        assert!(err.to_string().contains("schema_name"));
    }

    #[test]
    fn test_type_mismatch_and_null() {
        assert!(matches!(
            row().get_i64("name"),
            Err(ReflectError::UnexpectedRow { .. })
        ));
        assert!(matches!(
            row().get_str("comment"),
            Err(ReflectError::UnexpectedRow { .. })
        ));
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
    }
}
