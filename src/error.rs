//! Error taxonomy shared by every contract

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("{entity} with key {key} does not exist")]
    NotFound { entity: &'static str, key: String },
    #[error("cannot create {entity} as key {key} already exists")]
    AlreadyExists { entity: &'static str, key: String },
    #[error("submitting client not authorized: {0}")]
    Authorization(String),
    #[error("{entity} with key {key} is {actual}, expected {expected}")]
    InvalidState {
        entity: &'static str,
        key: String,
        expected: String,
        actual: String,
    },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("unable to interact with world state: {0}")]
    Storage(String),
    #[error("data retrieved for key {key} was not of type {entity}: {reason}")]
    Decoding {
        entity: &'static str,
        key: String,
        reason: String,
    },
    #[error("failed to read client identity: {0}")]
    Identity(String),
}

/// Fieldless tag of a [`LedgerError`], for matching without caring about context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Authorization,
    InvalidState,
    Validation,
    Storage,
    Decoding,
    Identity,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            LedgerError::Authorization(_) => ErrorKind::Authorization,
            LedgerError::InvalidState { .. } => ErrorKind::InvalidState,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Storage(_) => ErrorKind::Storage,
            LedgerError::Decoding { .. } => ErrorKind::Decoding,
            LedgerError::Identity(_) => ErrorKind::Identity,
        }
    }

    pub fn not_found(entity: &'static str, key: &str) -> Self {
        LedgerError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn already_exists(entity: &'static str, key: &str) -> Self {
        LedgerError::AlreadyExists {
            entity,
            key: key.to_string(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        key: &str,
        expected: impl Into<String>,
        actual: impl std::fmt::Display,
    ) -> Self {
        LedgerError::InvalidState {
            entity,
            key: key.to_string(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    pub fn decoding(entity: &'static str, key: &str, reason: impl std::fmt::Display) -> Self {
        LedgerError::Decoding {
            entity,
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<sled::Error> for LedgerError {
    fn from(value: sled::Error) -> Self {
        LedgerError::Storage(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}
