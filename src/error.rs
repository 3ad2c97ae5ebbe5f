use thiserror::Error;

/// pgreflect errors
#[derive(Error, Debug)]
pub enum ReflectError {
    #[error("Failed to query catalog: {0}")]
    Connection(String),

    #[error("Inconsistent catalog state in {query}: {message}")]
    UnsupportedCatalogState { query: &'static str, message: String },

    #[error("Unexpected value for column '{column}' in catalog row: {message}")]
    UnexpectedRow { column: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReflectError {
    pub(crate) fn catalog_state(query: &'static str, message: impl Into<String>) -> Self {
        ReflectError::UnsupportedCatalogState {
            query,
            message: message.into(),
        }
    }
}
