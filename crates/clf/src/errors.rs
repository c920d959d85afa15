use std::io;

use thiserror::Error;

use crate::format::{DataReadError, DataWriteError};

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("error creating bucket tmp dir: {0}")]
    TmpDir(#[source] io::Error),
    #[error("error building merge worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt bucket: {0}")]
    Corrupt(#[from] CorruptBucket),
    #[error("bucket invariant violated: {0}")]
    InvariantViolation(String),
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// A bucket whose backing bytes cannot be trusted. Fatal to the operation
/// that discovered it.
#[derive(Debug, Error)]
pub enum CorruptBucket {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported bucket file version {0}")]
    UnsupportedVersion(u8),
    #[error("entry {1} out of order after {0}")]
    OutOfOrder(String, String),
    #[error("error decoding entry: {0}")]
    Decode(String),
}

impl From<DataReadError> for BucketError {
    fn from(err: DataReadError) -> Self {
        match err {
            DataReadError::Io(err) => BucketError::Io(err),
            DataReadError::Custom(msg) => BucketError::Corrupt(CorruptBucket::Decode(msg)),
        }
    }
}

impl From<DataWriteError> for BucketError {
    fn from(err: DataWriteError) -> Self {
        match err {
            DataWriteError::Io(err) => BucketError::Io(err),
            DataWriteError::Custom(msg) => BucketError::InvariantViolation(msg),
        }
    }
}

impl From<tempfile::PersistError> for BucketError {
    fn from(err: tempfile::PersistError) -> Self {
        BucketError::Io(err.error)
    }
}
