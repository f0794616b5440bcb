use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid filter policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid subject: {0}")]
    InvalidSubject(String),
}
