//! Error types for the cache library.
//!
//! Cache operations themselves never fail: a miss, a rejected `set_nx` or a
//! write after `close` are ordinary boolean/optional outcomes. Errors only
//! surface while building a cache.

use std::io;

use thiserror::Error;

/// The error type for cache construction.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The supplied configuration cannot produce a working cache.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The expiration dispatch thread could not be started.
    #[error("failed to start expiration dispatcher: {0}")]
    Dispatcher(#[from] io::Error),
}

/// A specialized Result type for cache construction.
pub type CacheResult<T> = Result<T, CacheError>;
