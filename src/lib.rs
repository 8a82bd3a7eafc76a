//! IoBridge firmware library.
//!
//! Exposes the pure-logic modules (the wire protocol engine and the
//! board function layer) for integration testing and external
//! inspection. All ESP-IDF-specific code lives in [`adapters`] behind
//! the `espidf` feature, so the rest of the crate builds and tests on
//! the host.

#![deny(unused_must_use)]

pub mod board;
pub mod config;
pub mod rpc;

mod error;

pub use error::{Error, Result};

// Hardware bindings; the implementations are feature-gated inside.
pub mod adapters;
