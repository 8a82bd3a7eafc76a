//! I²C master functions.
//!
//! One bus, 7-bit addressing, write-then-read with repeated start.
//! The reply always carries three arguments (address, whatever was
//! read, and a status word) so hosts can pair error codes with the
//! partial data that made it across before the bus gave up.

use std::cell::RefCell;
use std::rc::Rc;

use super::functions;
use super::ports::I2cPort;
use super::{bytes_arg, expect_args, int_arg};
use crate::error::Result;
use crate::rpc::{ByteStream, Call, Server};

/// `i2c_begin()`.
fn i2c_begin(call: &Call, i2c: &mut impl I2cPort) -> Result<()> {
    expect_args(call, 0)?;
    i2c.begin();
    Ok(())
}

/// `i2c_trans(address, data, read_len)` → `i2c_trans(address, read, status)`.
fn i2c_trans<S: ByteStream>(call: &Call, i2c: &mut impl I2cPort, stream: &mut S) -> Result<()> {
    expect_args(call, 3)?;
    let address = (int_arg(call, 0)? & 0x7F) as u8;
    let write = bytes_arg(call, 1)?;
    let read_len = int_arg(call, 2)? as usize;

    let mut read = Vec::new();
    read.try_reserve_exact(read_len)?;
    read.resize(read_len, 0);

    let outcome = i2c.transfer(address, write, &mut read);
    read.truncate(outcome.read_count);

    let mut reply = Call::reply_to(call, functions::I2C_TRANS.id, functions::I2C_TRANS.name)?;
    reply.push_int(i32::from(address))?;
    reply.push_bytes(&read)?;
    reply.push_int(outcome.status as i32)?;
    reply.send(stream)
}

/// `i2c_end()`.
fn i2c_end(call: &Call, i2c: &mut impl I2cPort) -> Result<()> {
    expect_args(call, 0)?;
    i2c.end();
    Ok(())
}

pub fn register<S, B>(server: &mut Server<S>, board: &Rc<RefCell<B>>) -> Result<()>
where
    S: ByteStream,
    B: I2cPort + 'static,
{
    let b = Rc::clone(board);
    server.add_handler(
        functions::I2C_BEGIN.name,
        functions::I2C_BEGIN.id,
        Box::new(move |call, _| i2c_begin(call, &mut *b.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::I2C_TRANS.name,
        functions::I2C_TRANS.id,
        Box::new(move |call, stream| i2c_trans(call, &mut *b.borrow_mut(), stream)),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::I2C_END.name,
        functions::I2C_END.id,
        Box::new(move |call, _| i2c_end(call, &mut *b.borrow_mut())),
    )?;
    Ok(())
}
