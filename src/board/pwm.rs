//! PWM functions for the two timer blocks.
//!
//! Periods and high times are microseconds.  The 16-bit block
//! truncates the period to its counter width; the 32-bit block takes
//! it whole.  Duty clamping (high time beyond the period) is the
//! port's job, since it depends on how the counter matches.

use std::cell::RefCell;
use std::rc::Rc;

use super::functions;
use super::ports::{PwmBlock, PwmPort, PWM_CHANNELS};
use super::{expect_args, int_arg};
use crate::error::{Error, Result};
use crate::rpc::{ByteStream, Call, Server};

/// `pwmN_begin(period_us)`.
fn pwm_begin(call: &Call, pwm: &mut impl PwmPort, block: PwmBlock) -> Result<()> {
    expect_args(call, 1)?;
    let period_us = int_arg(call, 0)?;
    let period_us = match block {
        PwmBlock::Pwm0 => period_us & 0xFFFF,
        PwmBlock::Pwm1 => period_us,
    };
    pwm.begin(block, period_us);
    Ok(())
}

/// `pwmN_set(channel, high_time_us)`.
fn pwm_set(call: &Call, pwm: &mut impl PwmPort, block: PwmBlock) -> Result<()> {
    expect_args(call, 2)?;
    let channel = int_arg(call, 0)?;
    let high_time_us = int_arg(call, 1)?;
    if channel >= u32::from(PWM_CHANNELS) {
        return Err(Error::ArgValue);
    }
    pwm.set(block, channel as u8, high_time_us);
    Ok(())
}

/// `pwmN_end()`.
fn pwm_end(call: &Call, pwm: &mut impl PwmPort, block: PwmBlock) -> Result<()> {
    expect_args(call, 0)?;
    pwm.end(block);
    Ok(())
}

pub fn register<S, B>(server: &mut Server<S>, board: &Rc<RefCell<B>>) -> Result<()>
where
    S: ByteStream,
    B: PwmPort + 'static,
{
    for (block, begin, set, end) in [
        (
            PwmBlock::Pwm0,
            functions::PWM0_BEGIN,
            functions::PWM0_SET,
            functions::PWM0_END,
        ),
        (
            PwmBlock::Pwm1,
            functions::PWM1_BEGIN,
            functions::PWM1_SET,
            functions::PWM1_END,
        ),
    ] {
        let b = Rc::clone(board);
        server.add_handler(
            begin.name,
            begin.id,
            Box::new(move |call, _| pwm_begin(call, &mut *b.borrow_mut(), block)),
        )?;

        let b = Rc::clone(board);
        server.add_handler(
            set.name,
            set.id,
            Box::new(move |call, _| pwm_set(call, &mut *b.borrow_mut(), block)),
        )?;

        let b = Rc::clone(board);
        server.add_handler(
            end.name,
            end.id,
            Box::new(move |call, _| pwm_end(call, &mut *b.borrow_mut(), block)),
        )?;
    }
    Ok(())
}
