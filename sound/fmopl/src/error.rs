//! Error types for chip creation.
//!
//! Register writes and sample generation never fail: undefined registers are
//! ignored the way the hardware ignores them. Only building the shared tables
//! and deriving the clock constants can go wrong.

use std::collections::TryReserveError;

/// Errors raised while creating or re-clocking a chip
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OplError {
    /// The lookup tables could not be allocated
    #[error("could not allocate lookup tables: {0}")]
    TableAllocation(#[from] TryReserveError),

    /// Clock or output rate of zero
    #[error("invalid clock {clock} Hz / output rate {rate} Hz")]
    InvalidClock { clock: u32, rate: u32 },
}

pub type Result<T> = std::result::Result<T, OplError>;
