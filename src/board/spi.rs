//! SPI master functions for both exposed buses.
//!
//! `spiN_trans` is full duplex: the bus clocks one byte in for every
//! byte out, and the host opts into seeing the inbound side with the
//! `respond` flag.  The read buffer is allocated here, not in the
//! port, so an allocation failure surfaces as [`Error::Alloc`] before
//! any hardware is touched.

use std::cell::RefCell;
use std::rc::Rc;

use super::functions::{self, FunctionDef};
use super::ports::{SpiBus, SpiPort};
use super::{bytes_arg, expect_args, int_arg};
use crate::error::{Error, Result};
use crate::rpc::{ByteStream, Call, Server};

fn trans_def(bus: SpiBus) -> FunctionDef {
    match bus {
        SpiBus::Spi0 => functions::SPI0_TRANS,
        SpiBus::Spi1 => functions::SPI1_TRANS,
    }
}

/// `spiN_begin(divider, mode)`.  Mode is masked to the CPOL/CPHA pair.
fn spi_begin(call: &Call, spi: &mut impl SpiPort, bus: SpiBus) -> Result<()> {
    expect_args(call, 2)?;
    let divider = int_arg(call, 0)?;
    let mode = int_arg(call, 1)? & 0x3;
    spi.begin(bus, divider, mode as u8);
    Ok(())
}

/// `spiN_trans(data, respond)` → `spiN_trans(read)` when respond & 1.
fn spi_trans<S: ByteStream>(
    call: &Call,
    spi: &mut impl SpiPort,
    bus: SpiBus,
    stream: &mut S,
) -> Result<()> {
    expect_args(call, 2)?;
    let data = bytes_arg(call, 0)?;
    let respond = int_arg(call, 1)? & 0x1;

    if respond == 0 {
        spi.transfer(bus, data, None);
        return Ok(());
    }

    let mut read = Vec::new();
    read.try_reserve_exact(data.len())?;
    read.resize(data.len(), 0);
    spi.transfer(bus, data, Some(&mut read));

    let def = trans_def(bus);
    let mut reply = Call::reply_to(call, def.id, def.name)?;
    reply.push_bytes(&read)?;
    reply.send(stream)
}

/// `spiN_end()`.
fn spi_end(call: &Call, spi: &mut impl SpiPort, bus: SpiBus) -> Result<()> {
    expect_args(call, 0)?;
    spi.end(bus);
    Ok(())
}

pub fn register<S, B>(server: &mut Server<S>, board: &Rc<RefCell<B>>) -> Result<()>
where
    S: ByteStream,
    B: SpiPort + 'static,
{
    for (bus, begin, trans, end) in [
        (
            SpiBus::Spi0,
            functions::SPI0_BEGIN,
            functions::SPI0_TRANS,
            functions::SPI0_END,
        ),
        (
            SpiBus::Spi1,
            functions::SPI1_BEGIN,
            functions::SPI1_TRANS,
            functions::SPI1_END,
        ),
    ] {
        let b = Rc::clone(board);
        server.add_handler(
            begin.name,
            begin.id,
            Box::new(move |call, _| spi_begin(call, &mut *b.borrow_mut(), bus)),
        )?;

        let b = Rc::clone(board);
        server.add_handler(
            trans.name,
            trans.id,
            Box::new(move |call, stream| spi_trans(call, &mut *b.borrow_mut(), bus, stream)),
        )?;

        let b = Rc::clone(board);
        server.add_handler(
            end.name,
            end.id,
            Box::new(move |call, _| spi_end(call, &mut *b.borrow_mut(), bus)),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::CallKind;

    /// Echoes each outbound byte back incremented, and logs traffic.
    #[derive(Default)]
    struct LoopbackSpi {
        begun: Vec<(SpiBus, u32, u8)>,
        transfers: Vec<(SpiBus, Vec<u8>, bool)>,
        ended: Vec<SpiBus>,
    }

    impl SpiPort for LoopbackSpi {
        fn begin(&mut self, bus: SpiBus, divider: u32, mode: u8) {
            self.begun.push((bus, divider, mode));
        }
        fn transfer(&mut self, bus: SpiBus, write: &[u8], read: Option<&mut [u8]>) {
            let wants_read = read.is_some();
            if let Some(read) = read {
                for (o, i) in read.iter_mut().zip(write) {
                    *o = i.wrapping_add(1);
                }
            }
            self.transfers.push((bus, write.to_vec(), wants_read));
        }
        fn end(&mut self, bus: SpiBus) {
            self.ended.push(bus);
        }
    }

    #[derive(Default)]
    struct SinkStream {
        written: Vec<u8>,
    }

    impl ByteStream for SinkStream {
        fn available(&self) -> usize {
            0
        }
        fn read(&mut self, _buf: &mut [u8]) -> usize {
            0
        }
        fn read_byte(&mut self) -> u8 {
            0
        }
        fn write(&mut self, data: &[u8]) {
            self.written.extend_from_slice(data);
        }
    }

    fn trans_call(data: &[u8], respond: i32) -> Call {
        let mut call = Call::new();
        call.set_kind(CallKind::Text);
        call.set_name("spi0_trans").unwrap();
        call.push_bytes(data).unwrap();
        call.push_int(respond).unwrap();
        call
    }

    #[test]
    fn begin_masks_the_mode() {
        let mut spi = LoopbackSpi::default();
        let mut call = Call::new();
        call.set_kind(CallKind::Text);
        call.set_name("spi1_begin").unwrap();
        call.push_int(24).unwrap();
        call.push_int(0x7).unwrap();

        spi_begin(&call, &mut spi, SpiBus::Spi1).unwrap();
        assert_eq!(spi.begun, vec![(SpiBus::Spi1, 24, 0x3)]);
    }

    #[test]
    fn trans_with_respond_echoes_read_bytes() {
        let mut spi = LoopbackSpi::default();
        let mut stream = SinkStream::default();

        spi_trans(&trans_call(&[1, 2], 1), &mut spi, SpiBus::Spi0, &mut stream).unwrap();
        assert_eq!(stream.written, b"spi0_trans( [0x02, 0x03])\n");
        assert_eq!(spi.transfers, vec![(SpiBus::Spi0, vec![1, 2], true)]);
    }

    #[test]
    fn trans_without_respond_stays_silent() {
        let mut spi = LoopbackSpi::default();
        let mut stream = SinkStream::default();

        spi_trans(&trans_call(&[9], 0), &mut spi, SpiBus::Spi0, &mut stream).unwrap();
        assert!(stream.written.is_empty());
        assert_eq!(spi.transfers, vec![(SpiBus::Spi0, vec![9], false)]);
    }

    #[test]
    fn trans_checks_argument_types() {
        let mut spi = LoopbackSpi::default();
        let mut stream = SinkStream::default();

        let mut call = Call::new();
        call.set_kind(CallKind::Text);
        call.set_name("spi0_trans").unwrap();
        call.push_int(1).unwrap();
        call.push_int(1).unwrap();

        assert_eq!(
            spi_trans(&call, &mut spi, SpiBus::Spi0, &mut stream),
            Err(Error::ArgType)
        );
        assert!(spi.transfers.is_empty());
    }

    #[test]
    fn end_takes_no_arguments() {
        let mut spi = LoopbackSpi::default();
        let mut call = Call::new();
        call.set_kind(CallKind::Text);
        call.set_name("spi0_end").unwrap();

        spi_end(&call, &mut spi, SpiBus::Spi0).unwrap();
        assert_eq!(spi.ended, vec![SpiBus::Spi0]);

        call.push_int(1).unwrap();
        assert_eq!(spi_end(&call, &mut spi, SpiBus::Spi0), Err(Error::ArgCount));
    }
}
