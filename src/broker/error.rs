use thiserror::Error;

use crate::persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("topic {0} must have at least one partition")]
    NoPartitions(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}
