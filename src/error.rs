//! Unified error types for the iobridge firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level serve loop's error handling uniform.  All variants are `Copy`
//! so results can be passed around (and logged from handlers) without
//! allocation, which matters because `Alloc` is raised exactly when the
//! heap is exhausted.

use core::fmt;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation applied to the wrong target: an argument position that
    /// does not hold the expected type, an unknown handler token, or
    /// serializing a call whose wire format was never resolved.
    Invalid,
    /// Growable storage could not be reserved.
    Alloc,
    /// Malformed bytes on the wire.
    Format,
    /// A handler was invoked with the wrong number of arguments.
    ArgCount,
    /// A handler was invoked with an argument of the wrong type.
    ArgType,
    /// An argument's value is out of range for the operation.
    ArgValue,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "invalid operation"),
            Self::Alloc => write!(f, "allocation failed"),
            Self::Format => write!(f, "malformed wire data"),
            Self::ArgCount => write!(f, "wrong argument count"),
            Self::ArgType => write!(f, "wrong argument type"),
            Self::ArgValue => write!(f, "argument value out of range"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::Alloc
    }
}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
