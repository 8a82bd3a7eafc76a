//! IoBridge firmware entry point.
//!
//! A USB I/O bridge: hosts call board functions (GPIO, ADC, SPI, I²C,
//! PWM, DHT) over a CDC serial link, and armed pin interrupts flow
//! back as asynchronous notifications.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                  │
//! │                                                          │
//! │  UsbSerialStream          BoardHw                        │
//! │  (ByteStream)             (Gpio/Adc/Spi/I2c/Pwm/…Port)   │
//! │                                                          │
//! │  ────────────── Port Trait Boundary ──────────────       │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │        Server (framing, dispatch, replies)     │      │
//! │  │        board handlers (validation, wiring)     │      │
//! │  └────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Module declarations ───────────────────────────────────────
pub mod board;
pub mod config;
pub mod rpc;
mod error;

pub mod adapters;

// ── Imports ───────────────────────────────────────────────────
use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use log::{info, warn};

use adapters::board_hw::BoardHw;
use adapters::usb_serial::UsbSerialStream;
use board::InterruptNotifier;
use config::BridgeConfig;
use rpc::Server;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  IoBridge v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Bring up the hardware ──────────────────────────────
    let stream = match UsbSerialStream::install() {
        Ok(s) => s,
        Err(e) => {
            // No transport means no way to serve anything; halt and
            // let the watchdog reset us.
            log::error!("USB serial init failed: {}; halting", e);
            #[allow(clippy::empty_loop)]
            loop {}
        }
    };
    let hw = match BoardHw::new() {
        Ok(hw) => hw,
        Err(e) => {
            log::error!("board init failed: {}; halting", e);
            #[allow(clippy::empty_loop)]
            loop {}
        }
    };

    // ── 3. Configuration ──────────────────────────────────────
    let cfg = BridgeConfig::default();
    info!(
        "config: fw 0x{:08X}, part 0x{:04X}, data timeout {} cycles",
        cfg.board.firmware_version, cfg.board.part_number, cfg.protocol.data_timeout_cycles
    );

    // ── 4. Wire the server ────────────────────────────────────
    let board = Rc::new(RefCell::new(hw));
    let notifier = Rc::new(RefCell::new(InterruptNotifier::new()));
    let mut server = Server::with_config(stream, &cfg.protocol);
    board::register_all(&mut server, &board, &notifier, cfg.board)?;
    info!(
        "serve: {} functions registered, entering loop",
        board::functions::ALL.len()
    );

    // ── 5. Serve forever ──────────────────────────────────────
    loop {
        if let Err(e) = server.cycle() {
            warn!("serve: {}", e);
        }
        let pumped = board::pump_interrupts(
            &mut *board.borrow_mut(),
            &notifier.borrow(),
            server.stream_mut(),
        );
        if let Err(e) = pumped {
            warn!("interrupt pump: {}", e);
        }
    }
}
