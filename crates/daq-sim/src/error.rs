use crate::channel::Direction;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaqError {
    #[error("invalid direction '{0}': must be input or output")]
    InvalidDirection(String),

    #[error("channel '{channel}' is {actual}, operation requires {expected}")]
    DirectionMismatch {
        channel: String,
        expected: Direction,
        actual: Direction,
    },

    #[error("toggle task already running on {input} -> {output}")]
    AlreadyRunning { input: String, output: String },

    #[error("invalid toggle timing: interval {interval:?}, tolerance {tolerance:?}")]
    InvalidTiming {
        interval: Duration,
        tolerance: Duration,
    },

    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    #[error("failed to spawn toggle task: {0}")]
    Spawn(#[source] std::io::Error),
}

impl DaqError {
    pub(crate) fn mismatch(channel: &str, expected: Direction, actual: Direction) -> Self {
        Self::DirectionMismatch {
            channel: channel.to_string(),
            expected,
            actual,
        }
    }
}
