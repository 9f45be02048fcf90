//! Top-level error type.
//!
//! Each module carries its own error enum; this one wraps them for the
//! binary's startup and command paths, where a failure ends the command.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::client::ClientError;
use crate::persistence::PersistenceError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
