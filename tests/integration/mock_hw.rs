//! Mock board and stream for integration tests.
//!
//! The board records every port call so tests can assert on the full
//! history without touching real registers, and scripts the inputs
//! (pin levels, ADC counts, bus responses) that handlers read back.
//! The stream captures everything written and serves reads from bytes
//! a test feeds in.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use iobridge::board::ports::{
    AdcPort, DhtStatus, GpioPort, I2cOutcome, I2cPort, InterruptEvent, InterruptMode, OneWirePort,
    PinFunction, PinMode, PwmBlock, PwmPort, SpiBus, SpiPort, SystemPort, ADC_CHANNELS, PIN_COUNT,
};
use iobridge::board::InterruptNotifier;
use iobridge::config::BridgeConfig;
use iobridge::rpc::{ByteStream, Server};

// ── Port call record ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum PortCall {
    SetFunction { pin: u8, function: PinFunction },
    SetMode { pin: u8, mode: PinMode },
    Write { pin: u8, high: bool },
    Read { pin: u8 },
    AttachInterrupt { slot: u8, pin: u8, mode: InterruptMode },
    DetachInterrupt { slot: u8 },
    PulseIn { pin: u8, level: bool, timeout_us: u32 },
    PortMode { port: u8, mask: u8, mode: PinMode },
    PortWrite { port: u8, mask: u8, value: u8 },
    PortRead { port: u8, mask: u8 },
    AdcRead { channel: u8 },
    SpiBegin { bus: SpiBus, divider: u32, mode: u8 },
    SpiTransfer { bus: SpiBus, write: Vec<u8>, respond: bool },
    SpiEnd { bus: SpiBus },
    I2cBegin,
    I2cTransfer { address: u8, write: Vec<u8>, read_len: usize },
    I2cEnd,
    PwmBegin { block: PwmBlock, period_us: u32 },
    PwmSet { block: PwmBlock, channel: u8, high_time_us: u32 },
    PwmEnd { block: PwmBlock },
    DhtRead { pin: u8 },
    Restart,
}

// ── MockBoard ─────────────────────────────────────────────────

/// Scripted board.  SPI transfers echo each outbound byte plus one;
/// everything else reads back from the public fields.
pub struct MockBoard {
    pub calls: Vec<PortCall>,
    pub levels: [bool; PIN_COUNT as usize],
    pub adc: [u16; ADC_CHANNELS as usize],
    pub pulse_us: u32,
    pub events: VecDeque<(u8, InterruptEvent)>,
    pub i2c_read: Vec<u8>,
    pub i2c_status: u32,
    /// `None` serves the full requested length.
    pub i2c_read_count: Option<usize>,
    pub dht_frame: [u8; 5],
    pub dht_status: DhtStatus,
    pub guid: [u8; 16],
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            levels: [false; PIN_COUNT as usize],
            adc: [0; ADC_CHANNELS as usize],
            pulse_us: 0,
            events: VecDeque::new(),
            i2c_read: Vec::new(),
            i2c_status: 0,
            i2c_read_count: None,
            dht_frame: [0; 5],
            dht_status: DhtStatus::Ok,
            guid: core::array::from_fn(|i| i as u8),
        }
    }

    pub fn last_call(&self) -> Option<&PortCall> {
        self.calls.last()
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioPort for MockBoard {
    fn set_function(&mut self, pin: u8, function: PinFunction) {
        self.calls.push(PortCall::SetFunction { pin, function });
    }

    fn set_mode(&mut self, pin: u8, mode: PinMode) {
        self.calls.push(PortCall::SetMode { pin, mode });
    }

    fn write(&mut self, pin: u8, high: bool) {
        self.calls.push(PortCall::Write { pin, high });
        self.levels[pin as usize] = high;
    }

    fn read(&mut self, pin: u8) -> bool {
        self.calls.push(PortCall::Read { pin });
        self.levels[pin as usize]
    }

    fn attach_interrupt(&mut self, slot: u8, pin: u8, mode: InterruptMode) {
        self.calls.push(PortCall::AttachInterrupt { slot, pin, mode });
    }

    fn detach_interrupt(&mut self, slot: u8) {
        self.calls.push(PortCall::DetachInterrupt { slot });
    }

    fn poll_interrupt(&mut self) -> Option<(u8, InterruptEvent)> {
        self.events.pop_front()
    }

    fn pulse_in(&mut self, pin: u8, level: bool, timeout_us: u32) -> u32 {
        self.calls.push(PortCall::PulseIn {
            pin,
            level,
            timeout_us,
        });
        self.pulse_us
    }

    fn port_mode(&mut self, port: u8, mask: u8, mode: PinMode) {
        self.calls.push(PortCall::PortMode { port, mask, mode });
    }

    fn port_write(&mut self, port: u8, mask: u8, value: u8) {
        self.calls.push(PortCall::PortWrite { port, mask, value });
        for bit in 0..8u8 {
            if mask & (1 << bit) != 0 {
                self.levels[(port * 8 + bit) as usize] = value & (1 << bit) != 0;
            }
        }
    }

    fn port_read(&mut self, port: u8, mask: u8) -> u8 {
        self.calls.push(PortCall::PortRead { port, mask });
        let mut value = 0u8;
        for bit in 0..8u8 {
            if mask & (1 << bit) != 0 && self.levels[(port * 8 + bit) as usize] {
                value |= 1 << bit;
            }
        }
        value
    }
}

impl AdcPort for MockBoard {
    fn read(&mut self, channel: u8) -> u16 {
        self.calls.push(PortCall::AdcRead { channel });
        self.adc[channel as usize]
    }
}

impl SpiPort for MockBoard {
    fn begin(&mut self, bus: SpiBus, divider: u32, mode: u8) {
        self.calls.push(PortCall::SpiBegin { bus, divider, mode });
    }

    fn transfer(&mut self, bus: SpiBus, write: &[u8], read: Option<&mut [u8]>) {
        self.calls.push(PortCall::SpiTransfer {
            bus,
            write: write.to_vec(),
            respond: read.is_some(),
        });
        if let Some(read) = read {
            for (dst, src) in read.iter_mut().zip(write) {
                *dst = src.wrapping_add(1);
            }
        }
    }

    fn end(&mut self, bus: SpiBus) {
        self.calls.push(PortCall::SpiEnd { bus });
    }
}

impl I2cPort for MockBoard {
    fn begin(&mut self) {
        self.calls.push(PortCall::I2cBegin);
    }

    fn transfer(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> I2cOutcome {
        self.calls.push(PortCall::I2cTransfer {
            address,
            write: write.to_vec(),
            read_len: read.len(),
        });
        for (dst, src) in read.iter_mut().zip(&self.i2c_read) {
            *dst = *src;
        }
        I2cOutcome {
            read_count: self.i2c_read_count.unwrap_or(read.len()).min(read.len()),
            status: self.i2c_status,
        }
    }

    fn end(&mut self) {
        self.calls.push(PortCall::I2cEnd);
    }
}

impl PwmPort for MockBoard {
    fn begin(&mut self, block: PwmBlock, period_us: u32) {
        self.calls.push(PortCall::PwmBegin { block, period_us });
    }

    fn set(&mut self, block: PwmBlock, channel: u8, high_time_us: u32) {
        self.calls.push(PortCall::PwmSet {
            block,
            channel,
            high_time_us,
        });
    }

    fn end(&mut self, block: PwmBlock) {
        self.calls.push(PortCall::PwmEnd { block });
    }
}

impl OneWirePort for MockBoard {
    fn dht_read(&mut self, pin: u8, frame: &mut [u8; 5]) -> DhtStatus {
        self.calls.push(PortCall::DhtRead { pin });
        *frame = self.dht_frame;
        self.dht_status
    }
}

impl SystemPort for MockBoard {
    fn guid(&self) -> [u8; 16] {
        self.guid
    }

    fn restart(&mut self) {
        self.calls.push(PortCall::Restart);
    }
}

// ── ScriptedStream ────────────────────────────────────────────

/// Test stream: reads come from whatever the test fed in, writes are
/// captured for assertion.
pub struct ScriptedStream {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

#[allow(dead_code)]
impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn take_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }
}

impl ByteStream for ScriptedStream {
    fn available(&self) -> usize {
        self.rx.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn read_byte(&mut self) -> u8 {
        self.rx.pop_front().unwrap_or(0)
    }

    fn write(&mut self, data: &[u8]) {
        self.tx.extend_from_slice(data);
    }
}

// ── Harness ───────────────────────────────────────────────────

/// A fully registered server over a scripted stream and mock board.
pub struct TestBridge {
    pub server: Server<ScriptedStream>,
    pub board: Rc<RefCell<MockBoard>>,
    pub notifier: Rc<RefCell<InterruptNotifier>>,
}

#[allow(dead_code)]
impl TestBridge {
    /// Feed wire bytes, run one cycle, hand back whatever was written.
    /// Panics if the cycle reports an error; use the server directly
    /// for malformed-input tests.
    pub fn send(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.server.stream_mut().feed(bytes);
        self.server.cycle().expect("cycle");
        self.server.stream_mut().take_tx()
    }

    /// Drain captured interrupt events into the stream.
    pub fn pump(&mut self) -> Vec<u8> {
        iobridge::board::pump_interrupts(
            &mut *self.board.borrow_mut(),
            &self.notifier.borrow(),
            self.server.stream_mut(),
        )
        .expect("pump");
        self.server.stream_mut().take_tx()
    }

    pub fn calls(&self) -> Vec<PortCall> {
        self.board.borrow().calls.clone()
    }
}

pub fn bridge() -> TestBridge {
    let cfg = BridgeConfig::default();
    let board = Rc::new(RefCell::new(MockBoard::new()));
    let notifier = Rc::new(RefCell::new(InterruptNotifier::new()));
    let mut server = Server::with_config(ScriptedStream::new(), &cfg.protocol);
    iobridge::board::register_all(&mut server, &board, &notifier, cfg.board)
        .expect("registration");
    TestBridge {
        server,
        board,
        notifier,
    }
}
