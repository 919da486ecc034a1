use daq_sim::DaqError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RigError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Daq(#[from] DaqError),

    #[error("cannot open result log {}: {source}", path.display())]
    ResultLogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("result log write failed: {0}")]
    ResultLog(#[from] std::io::Error),
}
