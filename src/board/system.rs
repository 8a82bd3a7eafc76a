//! Device identity and reset.
//!
//! `GetDeviceInfo` is the first thing every host library calls (it
//! fingerprints the firmware before enabling features), so its reply
//! shape is frozen: version word, 16-byte GUID, part number, boot
//! code version, in that order.

use std::cell::RefCell;
use std::rc::Rc;

use super::expect_args;
use super::functions;
use super::ports::SystemPort;
use crate::config::BoardInfo;
use crate::error::Result;
use crate::rpc::{ByteStream, Call, Server};

/// `GetDeviceInfo()` → `GetDeviceInfo(version, guid, part, bootcode)`.
fn get_device_info<S: ByteStream>(
    call: &Call,
    system: &mut impl SystemPort,
    info: &BoardInfo,
    stream: &mut S,
) -> Result<()> {
    expect_args(call, 0)?;

    let mut reply = Call::reply_to(
        call,
        functions::GET_DEVICE_INFO.id,
        functions::GET_DEVICE_INFO.name,
    )?;
    reply.push_int(info.firmware_version as i32)?;
    reply.push_bytes(&system.guid())?;
    reply.push_int(info.part_number as i32)?;
    reply.push_int(info.bootcode_version as i32)?;
    reply.send(stream)
}

/// `restart()`.  The port delays the actual reset so the USB FIFO can
/// drain whatever is still queued.
fn restart(call: &Call, system: &mut impl SystemPort) -> Result<()> {
    expect_args(call, 0)?;
    system.restart();
    Ok(())
}

pub fn register<S, B>(server: &mut Server<S>, board: &Rc<RefCell<B>>, info: BoardInfo) -> Result<()>
where
    S: ByteStream,
    B: SystemPort + 'static,
{
    let b = Rc::clone(board);
    server.add_handler(
        functions::RESTART.name,
        functions::RESTART.id,
        Box::new(move |call, _| restart(call, &mut *b.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::GET_DEVICE_INFO.name,
        functions::GET_DEVICE_INFO.id,
        Box::new(move |call, stream| get_device_info(call, &mut *b.borrow_mut(), &info, stream)),
    )?;
    Ok(())
}
