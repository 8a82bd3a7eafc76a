//! Port traits: the boundary between protocol handlers and the pins.
//!
//! ```text
//!   Server ──▶ handler ──▶ Port trait ──▶ Adapter (esp-idf)
//! ```
//!
//! Handlers validate wire arguments and translate them into calls on
//! these traits; adapters implement them against real peripherals (or
//! against plain state in tests).  The traits are deliberately dumb:
//! every range and type check happens before a port method runs, so
//! implementations may index arrays with the values they are given.
//!
//! Pin numbers are board positions (0..[`PIN_COUNT`]), not SoC GPIO
//! numbers; the adapter owns that mapping.

// ───────────────────────────────────────────────────────────────
// Board geometry
// ───────────────────────────────────────────────────────────────

/// Host-addressable pin positions on the header.
pub const PIN_COUNT: u8 = 34;

/// 8-pin banks addressed by the `port*` functions.
pub const PORT_COUNT: u8 = 4;

/// Concurrently armable pin-interrupt slots.
pub const INTERRUPT_SLOTS: u8 = 8;

/// ADC inputs reachable through `analogRead`.
pub const ADC_CHANNELS: u8 = 8;

/// PWM outputs per timer block.
pub const PWM_CHANNELS: u8 = 3;

// ───────────────────────────────────────────────────────────────
// Wire-level enums
// ───────────────────────────────────────────────────────────────

/// Pin drive/input configuration selected by `pinMode` / `portMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// High-impedance input, no resistor.
    Input,
    /// Push-pull output.
    Output,
    InputPullDown,
    InputPullUp,
}

impl PinMode {
    /// Decode the wire value.  3 is a reserved hole in the numbering
    /// (repeater mode on some pads) and is rejected.
    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Input),
            1 => Some(Self::Output),
            2 => Some(Self::InputPullDown),
            4 => Some(Self::InputPullUp),
            _ => None,
        }
    }
}

/// Which of the two mux functions a pin is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFunction {
    /// Plain GPIO.
    Primary,
    /// The pad's alternate peripheral (SPI, ADC, PWM, ...).
    Secondary,
}

/// Trigger condition for an armed interrupt slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptMode {
    LowLevel,
    HighLevel,
    /// Both edges.
    Change,
    Rising,
    Falling,
}

impl InterruptMode {
    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::LowLevel),
            1 => Some(Self::HighLevel),
            2 => Some(Self::Change),
            3 => Some(Self::Rising),
            4 => Some(Self::Falling),
            _ => None,
        }
    }
}

/// What actually fired, reported back to the host in `interrupt`
/// notifications.  Wire values mirror [`InterruptMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptEvent {
    LowLevel = 0,
    HighLevel = 1,
    Change = 2,
    Rising = 3,
    Falling = 4,
}

impl InterruptEvent {
    pub fn wire(self) -> u32 {
        self as u32
    }
}

/// The two SPI masters exposed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiBus {
    Spi0,
    Spi1,
}

/// The two PWM timer blocks.  `Pwm0` counts 16 bits and `Pwm1` 32;
/// [`PwmPort::begin`] masks the period accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmBlock {
    Pwm0,
    Pwm1,
}

// ───────────────────────────────────────────────────────────────
// GPIO port (pins, banks, interrupts, pulse timing)
// ───────────────────────────────────────────────────────────────

/// Digital pin access.
///
/// Interrupts are split across the boundary: [`attach_interrupt`]
/// arms the hardware, the ISR side captures events into an adapter
/// queue, and the main loop drains them through [`poll_interrupt`]
/// between serve cycles.  Nothing here runs in interrupt context.
///
/// [`attach_interrupt`]: GpioPort::attach_interrupt
/// [`poll_interrupt`]: GpioPort::poll_interrupt
pub trait GpioPort {
    /// Route `pin` to its primary or secondary mux function.
    fn set_function(&mut self, pin: u8, function: PinFunction);

    /// Configure direction and resistors for one pin.
    fn set_mode(&mut self, pin: u8, mode: PinMode);

    /// Drive an output pin.
    fn write(&mut self, pin: u8, high: bool);

    /// Sample a pin.
    fn read(&mut self, pin: u8) -> bool;

    /// Arm interrupt `slot` to watch `pin` under `mode`.  Re-arming a
    /// live slot retargets it.
    fn attach_interrupt(&mut self, slot: u8, pin: u8, mode: InterruptMode);

    /// Disarm `slot`.  Disarming an idle slot is a no-op.
    fn detach_interrupt(&mut self, slot: u8);

    /// Pop one captured interrupt event, oldest first.
    fn poll_interrupt(&mut self) -> Option<(u8, InterruptEvent)>;

    /// Measure the length of the next `level` pulse on `pin`, in
    /// microseconds.  0 when no pulse completes within `timeout_us`.
    fn pulse_in(&mut self, pin: u8, level: bool, timeout_us: u32) -> u32;

    /// Configure the masked pins of an 8-pin bank in one go.
    fn port_mode(&mut self, port: u8, mask: u8, mode: PinMode);

    /// Write the masked bits of `value` to a bank; unmasked pins keep
    /// their state.
    fn port_write(&mut self, port: u8, mask: u8, value: u8);

    /// Sample a bank; unmasked positions read as 0.
    fn port_read(&mut self, port: u8, mask: u8) -> u8;
}

// ───────────────────────────────────────────────────────────────
// Analog / bus ports
// ───────────────────────────────────────────────────────────────

/// Single-shot analog conversion.
pub trait AdcPort {
    /// Convert `channel` once and return the 10-bit result (0..=1023).
    fn read(&mut self, channel: u8) -> u16;
}

/// SPI master access.  The handlers size all buffers; `transfer`
/// shifts one read byte in per written byte out.
pub trait SpiPort {
    /// Configure and enable a bus.  `divider` scales the base clock,
    /// `mode` is the usual CPOL/CPHA pair (0..=3).
    fn begin(&mut self, bus: SpiBus, divider: u32, mode: u8);

    /// Full-duplex transfer.  When `read` is `Some`, it is exactly
    /// `write.len()` bytes and receives the inbound side.
    fn transfer(&mut self, bus: SpiBus, write: &[u8], read: Option<&mut [u8]>);

    /// Disable a bus and release its pins.
    fn end(&mut self, bus: SpiBus);
}

/// Outcome of one I²C transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cOutcome {
    /// Bytes actually read before the bus stopped (≤ requested).
    pub read_count: usize,
    /// 0 on success, else a bus status code ([`i2c_status`]).
    pub status: u32,
}

/// I²C master access (single port, 7-bit addressing).
pub trait I2cPort {
    /// Enable the bus at the standard 100 kHz rate.
    fn begin(&mut self);

    /// Write `write`, repeated-start, then read up to `read.len()`
    /// bytes.  Either side may be empty.
    fn transfer(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> I2cOutcome;

    /// Disable the bus.
    fn end(&mut self);
}

/// Status codes carried in the third `i2c_trans` reply argument.
/// Zero is success; the nonzero values keep the classic NXP bus codes
/// host libraries already switch on.
pub mod i2c_status {
    pub const OK: u32 = 0;
    /// Catch-all for protocol violations and lost arbitration recovery.
    pub const BUS_ERROR: u32 = 1;
    /// Address byte NACKed while writing.
    pub const ADDR_WRITE_NACK: u32 = 0x20;
    /// Data byte NACKed mid-write.
    pub const DATA_WRITE_NACK: u32 = 0x30;
    /// Arbitration lost to another master.
    pub const ARBITRATION_LOST: u32 = 0x38;
    /// Address byte NACKed while reading.
    pub const ADDR_READ_NACK: u32 = 0x48;
    /// Slave stopped early during a read.
    pub const EARLY_READ_NACK: u32 = 0x58;
}

/// PWM timer access.
pub trait PwmPort {
    /// Start a block free-running with the given cycle period in
    /// microseconds.  All channels begin at 0% duty.
    fn begin(&mut self, block: PwmBlock, period_us: u32);

    /// Set one channel's high time in microseconds.  High times past
    /// the period pin the output high.
    fn set(&mut self, block: PwmBlock, channel: u8, high_time_us: u32);

    /// Stop a block and release its outputs.
    fn end(&mut self, block: PwmBlock);
}

// ───────────────────────────────────────────────────────────────
// 1-wire sensor port
// ───────────────────────────────────────────────────────────────

/// Result of a DHT-class sensor read.  Wire values, reported in the
/// first `dhtRead` reply argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtStatus {
    Ok = 0,
    /// Sensor never answered the start pulse.
    Timeout = 1,
    /// A frame arrived but its checksum byte disagreed.
    ChecksumMismatch = 2,
}

impl DhtStatus {
    pub fn wire(self) -> u32 {
        self as u32
    }
}

/// Bit-banged single-wire sensor access.
pub trait OneWirePort {
    /// One DHT11/DHT22 exchange on `pin`: issue the start pulse, clock
    /// in the 40-bit frame into `frame` (humidity, temperature,
    /// checksum).  `frame` is left as read even on checksum failure so
    /// hosts can inspect the raw bytes.
    fn dht_read(&mut self, pin: u8, frame: &mut [u8; 5]) -> DhtStatus;
}

// ───────────────────────────────────────────────────────────────
// System port (identity + reset)
// ───────────────────────────────────────────────────────────────

/// Chip-level services that back `GetDeviceInfo` and `restart`.
pub trait SystemPort {
    /// 16-byte device-unique id.
    fn guid(&self) -> [u8; 16];

    /// Reset the device after a short grace delay so the in-flight
    /// reply drains out of the USB FIFO first.
    fn restart(&mut self);
}
