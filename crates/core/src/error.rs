use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewswireError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}
