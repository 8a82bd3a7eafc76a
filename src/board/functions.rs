//! Host-callable function directory.
//!
//! Single source of truth: registration and reply construction both
//! reference these entries rather than hard-coding numbers.  Binary
//! frames carry the id, text frames the name.  Host libraries bake
//! this table in, so ids are wire ABI: gaps stay gaps and nothing is
//! ever renumbered.

/// One directory entry: numeric id plus text name of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDef {
    pub id: u32,
    pub name: &'static str,
}

// ---------------------------------------------------------------------------
// Pin mux + digital I/O
// ---------------------------------------------------------------------------

pub const SET_PRIMARY: FunctionDef = FunctionDef { id: 1, name: "setPrimary" };
pub const SET_SECONDARY: FunctionDef = FunctionDef { id: 2, name: "setSecondary" };
pub const PIN_MODE: FunctionDef = FunctionDef { id: 3, name: "pinMode" };
pub const DIGITAL_WRITE: FunctionDef = FunctionDef { id: 4, name: "digitalWrite" };
pub const DIGITAL_READ: FunctionDef = FunctionDef { id: 5, name: "digitalRead" };

// ---------------------------------------------------------------------------
// Pin interrupts
// ---------------------------------------------------------------------------

pub const ATTACH_INTERRUPT: FunctionDef = FunctionDef { id: 6, name: "attachInterrupt" };
pub const DETACH_INTERRUPT: FunctionDef = FunctionDef { id: 7, name: "detachInterrupt" };
/// Device→host only: unsolicited notification when an armed slot fires.
pub const INTERRUPT: FunctionDef = FunctionDef { id: 8, name: "interrupt" };

// ---------------------------------------------------------------------------
// Pulse timing + analog
// ---------------------------------------------------------------------------

pub const PULSE_IN: FunctionDef = FunctionDef { id: 9, name: "pulseIn" };
pub const ANALOG_READ: FunctionDef = FunctionDef { id: 10, name: "analogRead" };

// ---------------------------------------------------------------------------
// SPI masters
// ---------------------------------------------------------------------------

pub const SPI0_BEGIN: FunctionDef = FunctionDef { id: 20, name: "spi0_begin" };
pub const SPI0_TRANS: FunctionDef = FunctionDef { id: 21, name: "spi0_trans" };
pub const SPI0_END: FunctionDef = FunctionDef { id: 22, name: "spi0_end" };

pub const SPI1_BEGIN: FunctionDef = FunctionDef { id: 30, name: "spi1_begin" };
pub const SPI1_TRANS: FunctionDef = FunctionDef { id: 31, name: "spi1_trans" };
pub const SPI1_END: FunctionDef = FunctionDef { id: 32, name: "spi1_end" };

// ---------------------------------------------------------------------------
// I²C master
// ---------------------------------------------------------------------------

pub const I2C_BEGIN: FunctionDef = FunctionDef { id: 40, name: "i2c_begin" };
pub const I2C_TRANS: FunctionDef = FunctionDef { id: 41, name: "i2c_trans" };
pub const I2C_END: FunctionDef = FunctionDef { id: 42, name: "i2c_end" };

// ---------------------------------------------------------------------------
// PWM blocks
// ---------------------------------------------------------------------------

pub const PWM0_BEGIN: FunctionDef = FunctionDef { id: 50, name: "pwm0_begin" };
pub const PWM0_SET: FunctionDef = FunctionDef { id: 51, name: "pwm0_set" };
pub const PWM0_END: FunctionDef = FunctionDef { id: 52, name: "pwm0_end" };

pub const PWM1_BEGIN: FunctionDef = FunctionDef { id: 60, name: "pwm1_begin" };
pub const PWM1_SET: FunctionDef = FunctionDef { id: 61, name: "pwm1_set" };
pub const PWM1_END: FunctionDef = FunctionDef { id: 62, name: "pwm1_end" };

// ---------------------------------------------------------------------------
// Bank (port) I/O
// ---------------------------------------------------------------------------

pub const PORT_WRITE: FunctionDef = FunctionDef { id: 70, name: "portWrite" };
pub const PORT_READ: FunctionDef = FunctionDef { id: 71, name: "portRead" };
pub const PORT_MODE: FunctionDef = FunctionDef { id: 72, name: "portMode" };

// ---------------------------------------------------------------------------
// Sensors + system
// ---------------------------------------------------------------------------

pub const DHT_READ: FunctionDef = FunctionDef { id: 200, name: "dhtRead" };
pub const RESTART: FunctionDef = FunctionDef { id: 251, name: "restart" };
pub const GET_DEVICE_INFO: FunctionDef = FunctionDef { id: 255, name: "GetDeviceInfo" };

/// Every directory entry, for sanity checks and tooling.
pub const ALL: &[FunctionDef] = &[
    SET_PRIMARY,
    SET_SECONDARY,
    PIN_MODE,
    DIGITAL_WRITE,
    DIGITAL_READ,
    ATTACH_INTERRUPT,
    DETACH_INTERRUPT,
    INTERRUPT,
    PULSE_IN,
    ANALOG_READ,
    SPI0_BEGIN,
    SPI0_TRANS,
    SPI0_END,
    SPI1_BEGIN,
    SPI1_TRANS,
    SPI1_END,
    I2C_BEGIN,
    I2C_TRANS,
    I2C_END,
    PWM0_BEGIN,
    PWM0_SET,
    PWM0_END,
    PWM1_BEGIN,
    PWM1_SET,
    PWM1_END,
    PORT_WRITE,
    PORT_READ,
    PORT_MODE,
    DHT_READ,
    RESTART,
    GET_DEVICE_INFO,
];
