//! Errors of the configuration and compaction layers. The gate itself has none: a timed out
//! wait is an ordinary `false`.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown accounting mode `{0}`, expected `precise` or `coarse`")]
    UnknownAccountingMode(String),

    #[error("invalid value `{value}` for `{var}`, expected a boolean")]
    InvalidFlag { var: &'static str, value: String },

    #[error("the compaction executor has shut down")]
    ExecutorShutDown,

    #[error("failed to spawn the compaction thread")]
    Spawn(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
