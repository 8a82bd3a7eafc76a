//! USB Serial/JTAG transport.
//!
//! The ESP32-S3 exposes a CDC-ACM endpoint on its built-in USB
//! Serial/JTAG controller; this adapter installs the ESP-IDF driver
//! for it and bends the driver's FIFO API into [`ByteStream`].
//!
//! `available()` must answer without blocking, but the IDF driver only
//! reports data by actually reading it, so incoming bytes are pumped
//! into a parser-side ring first.  The ring sits behind a `RefCell`
//! because `available(&self)` is a read-only probe as far as the
//! server is concerned.

use core::cell::RefCell;

use esp_idf_svc::sys::*;
use heapless::Deque;
use log::{info, warn};

use crate::rpc::ByteStream;

/// Parser-side RX ring capacity.
const RX_RING_CAP: usize = 512;
/// FIFO sizes handed to the IDF driver, per direction.
const DRIVER_BUF_BYTES: usize = 256;
/// FreeRTOS ticks to wait per TX attempt.
const TX_WAIT_TICKS: u32 = 10;
/// TX attempts before a write is dropped (host likely absent).
const TX_RETRIES: u32 = 5;

// ── Error type ────────────────────────────────────────────────

/// Errors from the USB Serial/JTAG driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbSerialError {
    InstallFailed(i32),
}

impl core::fmt::Display for UsbSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InstallFailed(rc) => {
                write!(f, "USB Serial/JTAG driver install failed (rc={})", rc)
            }
        }
    }
}

impl std::error::Error for UsbSerialError {}

// ── Stream ────────────────────────────────────────────────────

/// [`ByteStream`] over the ESP32-S3 USB Serial/JTAG controller.
pub struct UsbSerialStream {
    rx: RefCell<Deque<u8, RX_RING_CAP>>,
}

impl UsbSerialStream {
    /// Install the IDF driver and wrap it.  Call once at boot.
    pub fn install() -> Result<Self, UsbSerialError> {
        let mut cfg = usb_serial_jtag_driver_config_t {
            tx_buffer_size: DRIVER_BUF_BYTES as _,
            rx_buffer_size: DRIVER_BUF_BYTES as _,
        };
        // SAFETY: the driver copies the config before returning.
        let ret = unsafe { usb_serial_jtag_driver_install(&mut cfg) };
        if ret != ESP_OK as i32 {
            return Err(UsbSerialError::InstallFailed(ret));
        }
        info!("usb_serial: driver installed (rx/tx {} B)", DRIVER_BUF_BYTES);
        Ok(Self {
            rx: RefCell::new(Deque::new()),
        })
    }

    /// Drain the driver FIFO into the parser-side ring without
    /// blocking.  Stops when the ring is full; further bytes wait in
    /// the driver FIFO until the parser catches up.
    fn pump_rx(&self) {
        let mut ring = self.rx.borrow_mut();
        loop {
            let free = ring.capacity() - ring.len();
            if free == 0 {
                return;
            }
            let mut chunk = [0u8; 64];
            let want = free.min(chunk.len());
            // SAFETY: chunk is a live stack buffer of at least `want` bytes.
            let got =
                unsafe { usb_serial_jtag_read_bytes(chunk.as_mut_ptr().cast(), want as _, 0) };
            if got <= 0 {
                return;
            }
            for &b in &chunk[..got as usize] {
                // Cannot fail: got <= want <= free.
                let _ = ring.push_back(b);
            }
        }
    }
}

impl ByteStream for UsbSerialStream {
    fn available(&self) -> usize {
        self.pump_rx();
        self.rx.borrow().len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        self.pump_rx();
        let mut ring = self.rx.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match ring.pop_front() {
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
        if let Some(b) = self.rx.borrow_mut().pop_front() {
            return b;
        }
        self.pump_rx();
        self.rx.borrow_mut().pop_front().unwrap_or(0)
    }

    fn write(&mut self, data: &[u8]) {
        let mut rest = data;
        let mut retries = TX_RETRIES;
        while !rest.is_empty() {
            // SAFETY: rest points at live bytes for the whole call.
            let sent = unsafe {
                usb_serial_jtag_write_bytes(rest.as_ptr().cast(), rest.len() as _, TX_WAIT_TICKS)
            };
            if sent > 0 {
                rest = &rest[sent as usize..];
                retries = TX_RETRIES;
                continue;
            }
            retries -= 1;
            if retries == 0 {
                warn!("usb_serial: TX stalled, dropping {} bytes", rest.len());
                return;
            }
        }
    }
}
