use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("fact not found: {category}/{key}")]
    FactNotFound { category: String, key: String },
}
