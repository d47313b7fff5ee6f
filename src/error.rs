//! Crate-wide error taxonomy.
//!
//! Every fallible public operation returns `Result<T, MixError>`. Local
//! validation failures (range, nil, names) never touch the engine; engine
//! failures are surfaced verbatim in [`MixError::EngineError`].

use thiserror::Error;

/// Errors produced by the mixing core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MixError {
    /// A required input (node, handle, reference) was absent.
    #[error("nil reference")]
    NilRef,

    /// Operation attempted on a released object.
    #[error("object has been released")]
    Released,

    /// Volume/pan/index/bus value outside its allowed domain.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// Bus index not present on the node.
    #[error("invalid bus {bus} on node (has {count} buses)")]
    InvalidBus { bus: u32, count: u32 },

    /// Empty, duplicated, or malformed name/key.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Unknown send/chain/tap name.
    #[error("not found: {0}")]
    NotFound(String),

    /// Key collision, duplicate send, or bus input already used.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Failure surfaced by the external engine.
    #[error("engine error: {0}")]
    EngineError(String),

    /// Dispatcher item was cancelled before it started.
    #[error("operation cancelled")]
    Cancelled,

    /// Dispatcher has been closed and refuses new items.
    #[error("dispatcher closed")]
    Closed,

    /// A plugin-chain rebuild partially failed; the chain is no longer
    /// trustworthy and must be released by the caller.
    #[error("chain rewire failed: {0}")]
    RewireError(String),
}

impl MixError {
    pub fn out_of_range(what: impl Into<String>) -> Self {
        MixError::OutOfRange(what.into())
    }
}
