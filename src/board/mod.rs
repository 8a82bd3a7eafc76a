//! Board function layer: everything a host can call.
//!
//! ```text
//!   rpc::Server ──▶ gpio / adc / spi / i2c / pwm / onewire / system
//!                                  │
//!                                  ▼
//!                        ports (traits) ──▶ adapters
//! ```
//!
//! Each submodule owns one peripheral family: the argument checks, the
//! port-trait calls, and the reply shape.  Handlers are plain functions
//! over `&Call` plus the port they drive, so tests exercise them
//! without a server; [`register_all`] wires the whole set onto a
//! server for the firmware entry point.
//!
//! Validation order is fixed: count ([`Error::ArgCount`]), then types
//! ([`Error::ArgType`]), then ranges ([`Error::ArgValue`]).  A failed
//! check reaches the log and nothing else; hosts learn about bad
//! requests from the reply that never comes.

pub mod adc;
pub mod functions;
pub mod gpio;
pub mod i2c;
pub mod onewire;
pub mod ports;
pub mod pwm;
pub mod spi;
pub mod system;

pub use gpio::{pump_interrupts, InterruptNotifier};

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::BoardInfo;
use crate::error::{Error, Result};
use crate::rpc::{ByteStream, Call, Server};
use ports::{AdcPort, GpioPort, I2cPort, OneWirePort, PwmPort, SpiPort, SystemPort};

/// Argument-count gate every handler runs first.
pub(crate) fn expect_args(call: &Call, count: usize) -> Result<()> {
    if call.arg_count() != count {
        return Err(Error::ArgCount);
    }
    Ok(())
}

/// Fetch an integer argument as the raw unsigned word handlers slice
/// their fields out of.
pub(crate) fn int_arg(call: &Call, pos: usize) -> Result<u32> {
    call.int_at(pos).map(|v| v as u32).ok_or(Error::ArgType)
}

/// Fetch a byte-array argument.
pub(crate) fn bytes_arg(call: &Call, pos: usize) -> Result<&[u8]> {
    call.bytes_at(pos).ok_or(Error::ArgType)
}

/// Register every board function on `server`, in directory order.
///
/// `board` is the one object implementing all the port traits; it is
/// shared into the handler closures, which only ever run from the
/// serve loop, so the `RefCell` borrows cannot collide.
pub fn register_all<S, B>(
    server: &mut Server<S>,
    board: &Rc<RefCell<B>>,
    notifier: &Rc<RefCell<InterruptNotifier>>,
    info: BoardInfo,
) -> Result<()>
where
    S: ByteStream,
    B: GpioPort + AdcPort + SpiPort + I2cPort + PwmPort + OneWirePort + SystemPort + 'static,
{
    gpio::register(server, board, notifier)?;
    adc::register(server, board)?;
    spi::register(server, board)?;
    i2c::register(server, board)?;
    pwm::register(server, board)?;
    onewire::register(server, board)?;
    system::register(server, board, info)?;
    Ok(())
}
