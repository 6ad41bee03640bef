use thiserror::Error;

/// Errors raised by a database driver.
///
/// `Connection` and `Query` carry the driver's own message so it can be
/// shown to the user unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Query(String),

    #[error("unsupported operation")]
    Unsupported,

    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => DriverError::InvalidUrl(e.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut => {
                DriverError::Connection(err.to_string())
            }
            sqlx::Error::Database(e) => DriverError::Query(e.message().to_string()),
            other => DriverError::Query(other.to_string()),
        }
    }
}

impl From<mongodb::error::Error> for DriverError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::InvalidArgument { message, .. } => DriverError::InvalidUrl(message.clone()),
            ErrorKind::Command(command) => DriverError::Query(command.message.clone()),
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::Authentication { .. } => {
                DriverError::Connection(err.to_string())
            }
            _ => DriverError::Query(err.to_string()),
        }
    }
}

impl From<bson::ser::Error> for DriverError {
    fn from(err: bson::ser::Error) -> Self {
        DriverError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for DriverError {
    fn from(err: bson::de::Error) -> Self {
        DriverError::Serialization(err.to_string())
    }
}
