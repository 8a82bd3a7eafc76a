//! Transport-agnostic function-call subsystem.
//!
//! Remote-procedure layer for the I/O bridge: hosts call board
//! functions by name (typed from a terminal) or by id (compact binary),
//! over any byte stream.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Function-call stack                      │
//! │                                                              │
//! │  ┌────────────┐   ┌─────────────────┐   ┌────────────────┐  │
//! │  │ ByteStream │──▶│ Server (parser) │──▶│ Registry       │  │
//! │  │ (trait)    │   │ stage machine   │   │ fan-out + def. │  │
//! │  └────────────┘   └─────────────────┘   └────────────────┘  │
//! │       ▲                                         │           │
//! │       │          ┌──────────────────────────────┘           │
//! │       │          ▼                                          │
//! │  ┌────────────┐   ┌──────────────┐                          │
//! │  │ ByteStream │◀──│ Call (reply/ │   (handlers answer on    │
//! │  │ (write)    │   │  notify)     │    the same stream)      │
//! │  └────────────┘   └──────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod call;
pub mod registry;
pub mod server;
pub mod transport;

pub use call::{Arg, ArgKind, Call, CallKind, ID_UNSET};
pub use registry::{Handler, HandlerId, Registry};
pub use server::Server;
pub use transport::{ByteStream, NullStream};
