//! `analogRead`: single-shot 10-bit conversions.

use std::cell::RefCell;
use std::rc::Rc;

use super::functions;
use super::ports::{AdcPort, ADC_CHANNELS};
use super::{expect_args, int_arg};
use crate::error::{Error, Result};
use crate::rpc::{ByteStream, Call, Server};

/// `analogRead(channel)` → `analogRead(channel, value)`.
fn analog_read<S: ByteStream>(call: &Call, adc: &mut impl AdcPort, stream: &mut S) -> Result<()> {
    expect_args(call, 1)?;
    let channel = int_arg(call, 0)?;
    if channel >= u32::from(ADC_CHANNELS) {
        return Err(Error::ArgValue);
    }
    let value = adc.read(channel as u8) & 0x3FF;

    let mut reply = Call::reply_to(call, functions::ANALOG_READ.id, functions::ANALOG_READ.name)?;
    reply.push_int(channel as i32)?;
    reply.push_int(i32::from(value))?;
    reply.send(stream)
}

pub fn register<S, B>(server: &mut Server<S>, board: &Rc<RefCell<B>>) -> Result<()>
where
    S: ByteStream,
    B: AdcPort + 'static,
{
    let b = Rc::clone(board);
    server.add_handler(
        functions::ANALOG_READ.name,
        functions::ANALOG_READ.id,
        Box::new(move |call, stream| analog_read(call, &mut *b.borrow_mut(), stream)),
    )?;
    Ok(())
}
