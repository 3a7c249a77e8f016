use std::time::Duration;

use thiserror::Error;

/// Errors that can occur on the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("connect error: {0}")]
    Connect(String),

    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("close error: {0}")]
    Close(String),

    #[error("bus connection is closed")]
    Closed,
}
