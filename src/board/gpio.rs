//! GPIO functions: pin mux, digital I/O, interrupts, pulse timing and
//! 8-pin bank access.
//!
//! The interrupt path is the one asynchronous thing the firmware does.
//! `attachInterrupt` arms a hardware slot *and* records which wire
//! form (binary or text) the request arrived in; when the adapter
//! later reports the slot firing, [`InterruptNotifier::notify`] sends
//! an unsolicited `interrupt(slot, event)` call back in that same
//! form, so a binary host never sees a text frame appear mid-stream.

use std::cell::RefCell;
use std::rc::Rc;

use super::functions;
use super::ports::{
    GpioPort, InterruptEvent, InterruptMode, PinFunction, PinMode, INTERRUPT_SLOTS, PIN_COUNT,
    PORT_COUNT,
};
use super::{expect_args, int_arg};
use crate::error::{Error, Result};
use crate::rpc::{ByteStream, Call, CallKind, Server};

// ── Handlers ──────────────────────────────────────────────────────

/// `setPrimary(pin)` / `setSecondary(pin)`.
fn set_function(call: &Call, gpio: &mut impl GpioPort, function: PinFunction) -> Result<()> {
    expect_args(call, 1)?;
    let pin = int_arg(call, 0)?;
    if pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }
    gpio.set_function(pin as u8, function);
    Ok(())
}

/// `pinMode(pin, mode)`.
fn pin_mode(call: &Call, gpio: &mut impl GpioPort) -> Result<()> {
    expect_args(call, 2)?;
    let pin = int_arg(call, 0)?;
    let mode = int_arg(call, 1)?;
    if pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }
    let mode = PinMode::from_wire(mode).ok_or(Error::ArgValue)?;
    gpio.set_mode(pin as u8, mode);
    Ok(())
}

/// `digitalWrite(pin, value)`.  Any nonzero value drives high.
fn digital_write(call: &Call, gpio: &mut impl GpioPort) -> Result<()> {
    expect_args(call, 2)?;
    let pin = int_arg(call, 0)?;
    let value = int_arg(call, 1)?;
    if pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }
    gpio.write(pin as u8, value != 0);
    Ok(())
}

/// `digitalRead(pin)` → `digitalRead(pin, value)`.
fn digital_read<S: ByteStream>(
    call: &Call,
    gpio: &mut impl GpioPort,
    stream: &mut S,
) -> Result<()> {
    expect_args(call, 1)?;
    let pin = int_arg(call, 0)?;
    if pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }
    let value = gpio.read(pin as u8);

    let mut reply = Call::reply_to(call, functions::DIGITAL_READ.id, functions::DIGITAL_READ.name)?;
    reply.push_int(pin as i32)?;
    reply.push_int(i32::from(value))?;
    reply.send(stream)
}

/// `attachInterrupt(slot, pin, mode)`.
fn attach_interrupt(
    call: &Call,
    gpio: &mut impl GpioPort,
    notifier: &mut InterruptNotifier,
) -> Result<()> {
    expect_args(call, 3)?;
    let slot = int_arg(call, 0)?;
    let pin = int_arg(call, 1)?;
    let mode = int_arg(call, 2)?;
    if slot >= u32::from(INTERRUPT_SLOTS) || pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }
    let mode = InterruptMode::from_wire(mode).ok_or(Error::ArgValue)?;

    notifier.arm(slot as u8, call.kind());
    gpio.attach_interrupt(slot as u8, pin as u8, mode);
    Ok(())
}

/// `detachInterrupt(slot)`.
fn detach_interrupt(
    call: &Call,
    gpio: &mut impl GpioPort,
    notifier: &mut InterruptNotifier,
) -> Result<()> {
    expect_args(call, 1)?;
    let slot = int_arg(call, 0)?;
    if slot >= u32::from(INTERRUPT_SLOTS) {
        return Err(Error::ArgValue);
    }
    notifier.disarm(slot as u8);
    gpio.detach_interrupt(slot as u8);
    Ok(())
}

/// `pulseIn(pin, level, timeout_us)` → `pulseIn(pin, micros)`.
fn pulse_in<S: ByteStream>(call: &Call, gpio: &mut impl GpioPort, stream: &mut S) -> Result<()> {
    expect_args(call, 3)?;
    let pin = int_arg(call, 0)?;
    let level = int_arg(call, 1)?;
    let timeout_us = int_arg(call, 2)?;
    if pin >= u32::from(PIN_COUNT) {
        return Err(Error::ArgValue);
    }
    let micros = gpio.pulse_in(pin as u8, level != 0, timeout_us);

    let mut reply = Call::reply_to(call, functions::PULSE_IN.id, functions::PULSE_IN.name)?;
    reply.push_int(pin as i32)?;
    reply.push_int(micros as i32)?;
    reply.send(stream)
}

/// `portMode(port, mask, mode)`.
fn port_mode(call: &Call, gpio: &mut impl GpioPort) -> Result<()> {
    expect_args(call, 3)?;
    let port = int_arg(call, 0)?;
    let mask = int_arg(call, 1)?;
    let mode = int_arg(call, 2)?;
    if port >= u32::from(PORT_COUNT) {
        return Err(Error::ArgValue);
    }
    let mode = PinMode::from_wire(mode).ok_or(Error::ArgValue)?;
    gpio.port_mode(port as u8, mask as u8, mode);
    Ok(())
}

/// `portWrite(port, mask, value)`.
fn port_write(call: &Call, gpio: &mut impl GpioPort) -> Result<()> {
    expect_args(call, 3)?;
    let port = int_arg(call, 0)?;
    let mask = int_arg(call, 1)?;
    let value = int_arg(call, 2)?;
    if port >= u32::from(PORT_COUNT) {
        return Err(Error::ArgValue);
    }
    gpio.port_write(port as u8, mask as u8, value as u8);
    Ok(())
}

/// `portRead(port, mask)` → `portRead(port, value)`.
fn port_read<S: ByteStream>(call: &Call, gpio: &mut impl GpioPort, stream: &mut S) -> Result<()> {
    expect_args(call, 2)?;
    let port = int_arg(call, 0)?;
    let mask = int_arg(call, 1)?;
    if port >= u32::from(PORT_COUNT) {
        return Err(Error::ArgValue);
    }
    let value = gpio.port_read(port as u8, mask as u8);

    let mut reply = Call::reply_to(call, functions::PORT_READ.id, functions::PORT_READ.name)?;
    reply.push_int(port as i32)?;
    reply.push_int(i32::from(value))?;
    reply.send(stream)
}

// ── Interrupt notifications ───────────────────────────────────────

/// Per-slot memory of how `attachInterrupt` arrived, so notifications
/// go back in the same wire form.
#[derive(Debug, Default)]
pub struct InterruptNotifier {
    kinds: [Option<CallKind>; INTERRUPT_SLOTS as usize],
}

impl InterruptNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, slot: u8, kind: CallKind) {
        self.kinds[slot as usize] = Some(kind);
    }

    pub fn disarm(&mut self, slot: u8) {
        self.kinds[slot as usize] = None;
    }

    pub fn kind_of(&self, slot: u8) -> Option<CallKind> {
        self.kinds.get(slot as usize).copied().flatten()
    }

    /// Send one `interrupt(slot, event)` notification.  Events for a
    /// slot the host has since detached are dropped without error;
    /// the race is inherent and the host no longer cares.
    pub fn notify<S: ByteStream>(
        &self,
        slot: u8,
        event: InterruptEvent,
        stream: &mut S,
    ) -> Result<()> {
        let Some(kind) = self.kind_of(slot) else {
            return Ok(());
        };
        let mut call = Call::new();
        call.set_kind(kind);
        call.set_id(functions::INTERRUPT.id);
        call.set_name(functions::INTERRUPT.name)?;
        call.push_int(i32::from(slot))?;
        call.push_int(event.wire() as i32)?;
        call.send(stream)
    }
}

/// Drain captured interrupt events and notify the host.  The firmware
/// main loop calls this between serve cycles.
pub fn pump_interrupts<S, B>(
    gpio: &mut B,
    notifier: &InterruptNotifier,
    stream: &mut S,
) -> Result<()>
where
    S: ByteStream,
    B: GpioPort,
{
    while let Some((slot, event)) = gpio.poll_interrupt() {
        notifier.notify(slot, event, stream)?;
    }
    Ok(())
}

// ── Registration ──────────────────────────────────────────────────

pub fn register<S, B>(
    server: &mut Server<S>,
    board: &Rc<RefCell<B>>,
    notifier: &Rc<RefCell<InterruptNotifier>>,
) -> Result<()>
where
    S: ByteStream,
    B: GpioPort + 'static,
{
    let b = Rc::clone(board);
    server.add_handler(
        functions::SET_PRIMARY.name,
        functions::SET_PRIMARY.id,
        Box::new(move |call, _| set_function(call, &mut *b.borrow_mut(), PinFunction::Primary)),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::SET_SECONDARY.name,
        functions::SET_SECONDARY.id,
        Box::new(move |call, _| set_function(call, &mut *b.borrow_mut(), PinFunction::Secondary)),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::PIN_MODE.name,
        functions::PIN_MODE.id,
        Box::new(move |call, _| pin_mode(call, &mut *b.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::DIGITAL_WRITE.name,
        functions::DIGITAL_WRITE.id,
        Box::new(move |call, _| digital_write(call, &mut *b.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::DIGITAL_READ.name,
        functions::DIGITAL_READ.id,
        Box::new(move |call, stream| digital_read(call, &mut *b.borrow_mut(), stream)),
    )?;

    let b = Rc::clone(board);
    let n = Rc::clone(notifier);
    server.add_handler(
        functions::ATTACH_INTERRUPT.name,
        functions::ATTACH_INTERRUPT.id,
        Box::new(move |call, _| attach_interrupt(call, &mut *b.borrow_mut(), &mut n.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    let n = Rc::clone(notifier);
    server.add_handler(
        functions::DETACH_INTERRUPT.name,
        functions::DETACH_INTERRUPT.id,
        Box::new(move |call, _| detach_interrupt(call, &mut *b.borrow_mut(), &mut n.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::PULSE_IN.name,
        functions::PULSE_IN.id,
        Box::new(move |call, stream| pulse_in(call, &mut *b.borrow_mut(), stream)),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::PORT_MODE.name,
        functions::PORT_MODE.id,
        Box::new(move |call, _| port_mode(call, &mut *b.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::PORT_WRITE.name,
        functions::PORT_WRITE.id,
        Box::new(move |call, _| port_write(call, &mut *b.borrow_mut())),
    )?;

    let b = Rc::clone(board);
    server.add_handler(
        functions::PORT_READ.name,
        functions::PORT_READ.id,
        Box::new(move |call, stream| port_read(call, &mut *b.borrow_mut(), stream)),
    )?;

    Ok(())
}
