use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
