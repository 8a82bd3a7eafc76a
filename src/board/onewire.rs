//! Bit-banged single-wire sensors, currently just the DHT family.
//!
//! The handler does not decode humidity or temperature; the raw
//! 40-bit frame goes back as-is together with a status word, and the
//! host does the math.  That keeps DHT11-vs-DHT22 scaling quirks out
//! of the firmware.

use std::cell::RefCell;
use std::rc::Rc;

use super::functions;
use super::ports::{OneWirePort, PIN_COUNT};
use super::{expect_args, int_arg};
use crate::error::{Error, Result};
use crate::rpc::{ByteStream, Call, Server};

/// `dhtRead(pin)` → `dhtRead(status, frame)`.
fn dht_read<S: ByteStream>(call: &Call, wire: &mut impl OneWirePort, stream: &mut S) -> Result<()> {
    expect_args(call, 1)?;
    let pin = int_arg(call, 0)?;
    if pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }

    let mut frame = [0u8; 5];
    let status = wire.dht_read(pin as u8, &mut frame);

    let mut reply = Call::reply_to(call, functions::DHT_READ.id, functions::DHT_READ.name)?;
    reply.push_int(status.wire() as i32)?;
    reply.push_bytes(&frame)?;
    reply.send(stream)
}

pub fn register<S, B>(server: &mut Server<S>, board: &Rc<RefCell<B>>) -> Result<()>
where
    S: ByteStream,
    B: OneWirePort + 'static,
{
    let b = Rc::clone(board);
    server.add_handler(
        functions::DHT_READ.name,
        functions::DHT_READ.id,
        Box::new(move |call, stream| dht_read(call, &mut *b.borrow_mut(), stream)),
    )?;
    Ok(())
}
