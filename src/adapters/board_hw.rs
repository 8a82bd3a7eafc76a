//! ESP32-S3 board adapter: every port trait over raw ESP-IDF calls.
//!
//! Logical pin positions map onto the S3 GPIOs that are free on a
//! devkit-style module:
//!
//! ```text
//!   position  0..=17    GPIO  1..=18
//!   position  18        GPIO  21
//!   position  19..=33   GPIO 33..=47
//! ```
//!
//! GPIO 0 is the boot strap, 19/20 carry USB D−/D+, and 22..=32 are
//! absent or claimed by flash/PSRAM, so positions skip them.  ADC
//! channels 0..=7 sit on positions 0..=7 (GPIO 1..=8).  The fixed SPI,
//! I²C and PWM routings below overlap the same header; a position
//! belongs to whichever feature last claimed it, like the pad mux it
//! models.

use core::sync::atomic::{AtomicU8, Ordering};

use esp_idf_svc::sys::*;
use log::{debug, info, warn};

use crate::board::ports::{
    i2c_status, AdcPort, DhtStatus, GpioPort, I2cOutcome, I2cPort, InterruptEvent, InterruptMode,
    OneWirePort, PinFunction, PinMode, PwmBlock, PwmPort, SpiBus, SpiPort, SystemPort,
    ADC_CHANNELS, INTERRUPT_SLOTS, PIN_COUNT, PWM_CHANNELS,
};

// ── Pin map ───────────────────────────────────────────────────

/// Logical position → S3 GPIO number.
const PIN_MAP: [i32; PIN_COUNT as usize] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, //
    21, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47,
];

// Fixed peripheral routings.  SPI0 rides the FSPI IOMUX pads for full
// clock range; SPI3 has no IOMUX on the S3 and goes through the matrix.
const SPI0_SCLK_GPIO: i32 = 12;
const SPI0_MOSI_GPIO: i32 = 11;
const SPI0_MISO_GPIO: i32 = 13;
const SPI1_SCLK_GPIO: i32 = 36;
const SPI1_MOSI_GPIO: i32 = 35;
const SPI1_MISO_GPIO: i32 = 37;

const I2C_SDA_GPIO: i32 = 8;
const I2C_SCL_GPIO: i32 = 9;
/// Standard-mode clock; the header is expected to carry external
/// pull-ups, so the weak internal ones stay off.
const I2C_SCL_HZ: u32 = 100_000;
const I2C_TIMEOUT_MS: i32 = 100;

const PWM0_GPIOS: [i32; PWM_CHANNELS as usize] = [4, 5, 6];
const PWM1_GPIOS: [i32; PWM_CHANNELS as usize] = [15, 16, 17];
/// LEDC duty span at 10-bit resolution; a duty of the full span pins
/// the output high.
const PWM_DUTY_SPAN: u32 = 1 << 10;

/// Dividers scale a 48 MHz base; the SPI driver rounds to the nearest
/// clock it can actually make.
const SPI_BASE_HZ: u32 = 48_000_000;

/// High-phase width separating a DHT 0-bit (~27 µs) from a 1-bit (~70 µs).
const DHT_ONE_THRESHOLD_US: i64 = 45;

// ── Error type ────────────────────────────────────────────────

/// Errors during boot-time adapter construction.  Runtime faults on a
/// live board are logged and absorbed instead; the port traits are
/// infallible by contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    IsrInstallFailed(i32),
    AdcInitFailed(i32),
    MacReadFailed(i32),
}

impl core::fmt::Display for HwError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::MacReadFailed(rc) => write!(f, "eFuse MAC read failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwError {}

// ── ISR event ring ────────────────────────────────────────────
//
// Pin ISRs produce, the main loop consumes.  Events pack into one
// byte (slot in the high nibble, event code in the low) so the ring
// is a plain byte buffer behind two atomic indices.

const INT_QUEUE_CAP: usize = 32;

static INT_HEAD: AtomicU8 = AtomicU8::new(0);
static INT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: written only by the producing ISR at head, read only by the
// main-loop consumer at tail; the atomics order the two sides.
static mut INT_BUFFER: [u8; INT_QUEUE_CAP] = [0; INT_QUEUE_CAP];

/// Armed wire-mode per slot, `SLOT_DISARMED` when idle.  The ISR
/// trampoline reads these to know what to report.
static INT_MODE: [AtomicU8; INTERRUPT_SLOTS as usize] =
    [const { AtomicU8::new(SLOT_DISARMED) }; INTERRUPT_SLOTS as usize];
/// GPIO each slot watches (valid while armed).
static INT_GPIO: [AtomicU8; INTERRUPT_SLOTS as usize] =
    [const { AtomicU8::new(0) }; INTERRUPT_SLOTS as usize];

const SLOT_DISARMED: u8 = 0xFF;

fn mode_wire(mode: InterruptMode) -> u8 {
    match mode {
        InterruptMode::LowLevel => 0,
        InterruptMode::HighLevel => 1,
        InterruptMode::Change => 2,
        InterruptMode::Rising => 3,
        InterruptMode::Falling => 4,
    }
}

fn int_type(mode: InterruptMode) -> gpio_int_type_t {
    match mode {
        InterruptMode::LowLevel => gpio_int_type_t_GPIO_INTR_LOW_LEVEL,
        InterruptMode::HighLevel => gpio_int_type_t_GPIO_INTR_HIGH_LEVEL,
        InterruptMode::Change => gpio_int_type_t_GPIO_INTR_ANYEDGE,
        InterruptMode::Rising => gpio_int_type_t_GPIO_INTR_POSEDGE,
        InterruptMode::Falling => gpio_int_type_t_GPIO_INTR_NEGEDGE,
    }
}

/// Push one captured event.  Safe from ISR context (lock-free).
/// Returns `false` when the ring is full and the event is dropped.
fn push_pin_event(slot: u8, event: InterruptEvent) -> bool {
    let head = INT_HEAD.load(Ordering::Relaxed);
    let tail = INT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % INT_QUEUE_CAP as u8;

    if next_head == tail {
        return false;
    }

    // SAFETY: single producer; the slot at head is ours until the
    // Release store below publishes it.
    unsafe {
        INT_BUFFER[head as usize] = (slot << 4) | event.wire() as u8;
    }

    INT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the oldest captured event.  Main-loop side only.
fn pop_pin_event() -> Option<(u8, InterruptEvent)> {
    let tail = INT_TAIL.load(Ordering::Relaxed);
    let head = INT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None;
    }

    // SAFETY: single consumer; head was published with Release.
    let raw = unsafe { INT_BUFFER[tail as usize] };
    INT_TAIL.store((tail + 1) % INT_QUEUE_CAP as u8, Ordering::Release);

    let event = match raw & 0x0F {
        0 => InterruptEvent::LowLevel,
        1 => InterruptEvent::HighLevel,
        2 => InterruptEvent::Change,
        3 => InterruptEvent::Rising,
        4 => InterruptEvent::Falling,
        _ => return None,
    };
    Some((raw >> 4, event))
}

unsafe extern "C" fn pin_isr(arg: *mut core::ffi::c_void) {
    let slot = (arg as usize) & 0x07;
    let mode = INT_MODE[slot].load(Ordering::Relaxed);
    if mode == SLOT_DISARMED {
        return;
    }
    let gpio = INT_GPIO[slot].load(Ordering::Relaxed) as i32;

    // Mask the source until the main loop drains this event; level
    // triggers would otherwise refire before the handler ever runs.
    // SAFETY: register writes/reads on the armed pin; ISR context.
    unsafe { gpio_intr_disable(gpio) };

    let event = match mode {
        0 => InterruptEvent::LowLevel,
        1 => InterruptEvent::HighLevel,
        3 => InterruptEvent::Rising,
        4 => InterruptEvent::Falling,
        // Change: the status register does not say which edge fired;
        // sample the pin while the edge is fresh.
        _ => {
            if unsafe { gpio_get_level(gpio) } != 0 {
                InterruptEvent::Rising
            } else {
                InterruptEvent::Falling
            }
        }
    };
    push_pin_event(slot as u8, event);
}

// ── Adapter ───────────────────────────────────────────────────

/// The physical board: one struct implementing all seven port traits
/// against the ESP-IDF drivers.
pub struct BoardHw {
    guid: [u8; 16],
    adc1: adc_oneshot_unit_handle_t,
    spi_dev: [spi_device_handle_t; 2],
    i2c_bus: i2c_master_bus_handle_t,
    /// Cycle period per PWM block, 0 while the block is down.
    pwm_period_us: [u32; 2],
}

impl BoardHw {
    /// Bring up the shared services (ISR dispatcher, ADC unit, chip
    /// id).  Buses and timers start on their `begin` calls instead.
    pub fn new() -> Result<Self, HwError> {
        // SAFETY: called once at boot from the main task.
        // ESP_ERR_INVALID_STATE means the service already exists.
        let ret = unsafe { gpio_install_isr_service(0) };
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwError::IsrInstallFailed(ret));
        }

        let adc1 = init_adc1()?;
        let guid = read_guid()?;

        info!(
            "board_hw: ready ({} pins, {} ADC channels, guid {:02X}{:02X}{:02X}{:02X}…)",
            PIN_COUNT, ADC_CHANNELS, guid[0], guid[1], guid[2], guid[3]
        );
        Ok(Self {
            guid,
            adc1,
            spi_dev: [core::ptr::null_mut(); 2],
            i2c_bus: core::ptr::null_mut(),
            pwm_period_us: [0; 2],
        })
    }
}

fn init_adc1() -> Result<adc_oneshot_unit_handle_t, HwError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
    // SAFETY: handle is written once here; the config is copied.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
    if ret != ESP_OK as i32 {
        return Err(HwError::AdcInitFailed(ret));
    }

    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    for ch in 0..ADC_CHANNELS as u32 {
        let ret = unsafe { adc_oneshot_config_channel(handle, ch, &chan_cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwError::AdcInitFailed(ret));
        }
    }
    Ok(handle)
}

fn read_guid() -> Result<[u8; 16], HwError> {
    let mut mac = [0u8; 6];
    // SAFETY: mac is a live 6-byte buffer, the size the call contract fixes.
    let ret = unsafe { esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != ESP_OK as i32 {
        return Err(HwError::MacReadFailed(ret));
    }
    // Factory MAC in the leading bytes, rest zero.
    let mut guid = [0u8; 16];
    guid[..6].copy_from_slice(&mac);
    Ok(guid)
}

// ── GPIO ──────────────────────────────────────────────────────

impl GpioPort for BoardHw {
    fn set_function(&mut self, pin: u8, function: PinFunction) {
        let g = PIN_MAP[pin as usize];
        // The S3 routes peripherals through the GPIO matrix rather
        // than a per-pad mux: a reset detaches whatever held the pad,
        // and the next pinMode or bus begin claims it again.
        // SAFETY: g comes from PIN_MAP, a valid GPIO.
        let ret = unsafe { gpio_reset_pin(g) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: pin {} reset failed (rc={})", pin, ret);
        }
        debug!("board_hw: pin {} -> {:?}", pin, function);
    }

    fn set_mode(&mut self, pin: u8, mode: PinMode) {
        let g = PIN_MAP[pin as usize];
        let (dir, pull_up, pull_down) = match mode {
            PinMode::Input => (
                gpio_mode_t_GPIO_MODE_INPUT,
                gpio_pullup_t_GPIO_PULLUP_DISABLE,
                gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            ),
            PinMode::Output => (
                gpio_mode_t_GPIO_MODE_OUTPUT,
                gpio_pullup_t_GPIO_PULLUP_DISABLE,
                gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            ),
            PinMode::InputPullDown => (
                gpio_mode_t_GPIO_MODE_INPUT,
                gpio_pullup_t_GPIO_PULLUP_DISABLE,
                gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
            ),
            PinMode::InputPullUp => (
                gpio_mode_t_GPIO_MODE_INPUT,
                gpio_pullup_t_GPIO_PULLUP_ENABLE,
                gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            ),
        };
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << g,
            mode: dir,
            pull_up_en: pull_up,
            pull_down_en: pull_down,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            ..Default::default()
        };
        // SAFETY: the driver copies the config before returning.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: pin {} mode config failed (rc={})", pin, ret);
        }
    }

    fn write(&mut self, pin: u8, high: bool) {
        // SAFETY: gpio_set_level is a register write on a mapped pin;
        // main-loop only.
        unsafe {
            gpio_set_level(PIN_MAP[pin as usize], if high { 1 } else { 0 });
        }
    }

    fn read(&mut self, pin: u8) -> bool {
        // SAFETY: gpio_get_level is a read-only register access.
        (unsafe { gpio_get_level(PIN_MAP[pin as usize]) }) != 0
    }

    fn attach_interrupt(&mut self, slot: u8, pin: u8, mode: InterruptMode) {
        // Quiesce whatever the slot watched before.
        self.detach_interrupt(slot);

        let g = PIN_MAP[pin as usize];
        INT_GPIO[slot as usize].store(g as u8, Ordering::Relaxed);
        INT_MODE[slot as usize].store(mode_wire(mode), Ordering::Release);

        // SAFETY: the ISR service is installed in new(); the slot
        // index travels as the opaque handler argument.
        unsafe {
            gpio_set_intr_type(g, int_type(mode));
            gpio_isr_handler_add(g, Some(pin_isr), slot as usize as *mut core::ffi::c_void);
            gpio_intr_enable(g);
        }
        debug!("board_hw: slot {} armed on pin {} ({:?})", slot, pin, mode);
    }

    fn detach_interrupt(&mut self, slot: u8) {
        let mode = INT_MODE[slot as usize].swap(SLOT_DISARMED, Ordering::AcqRel);
        if mode == SLOT_DISARMED {
            return;
        }
        let g = INT_GPIO[slot as usize].load(Ordering::Relaxed) as i32;
        // SAFETY: the slot was armed, so the handler is registered.
        unsafe {
            gpio_intr_disable(g);
            gpio_isr_handler_remove(g);
        }
    }

    fn poll_interrupt(&mut self) -> Option<(u8, InterruptEvent)> {
        let (slot, event) = pop_pin_event()?;
        // The ISR masked the source; unmask it now that the event is
        // consumed, unless the slot was disarmed in the meantime.
        if INT_MODE[slot as usize].load(Ordering::Acquire) != SLOT_DISARMED {
            let g = INT_GPIO[slot as usize].load(Ordering::Relaxed) as i32;
            // SAFETY: register write on the still-armed pin.
            unsafe { gpio_intr_enable(g) };
        }
        Some((slot, event))
    }

    fn pulse_in(&mut self, pin: u8, level: bool, timeout_us: u32) -> u32 {
        let g = PIN_MAP[pin as usize];
        let want = if level { 1 } else { 0 };
        // Three phases under one deadline: let any in-progress pulse
        // finish, wait for the next one to start, then time it.
        // SAFETY: level/timer reads only; main-loop context.
        unsafe {
            let deadline = esp_timer_get_time() + timeout_us as i64;
            while gpio_get_level(g) == want {
                if esp_timer_get_time() >= deadline {
                    return 0;
                }
            }
            while gpio_get_level(g) != want {
                if esp_timer_get_time() >= deadline {
                    return 0;
                }
            }
            let start = esp_timer_get_time();
            while gpio_get_level(g) == want {
                if esp_timer_get_time() >= deadline {
                    return 0;
                }
            }
            (esp_timer_get_time() - start) as u32
        }
    }

    fn port_mode(&mut self, port: u8, mask: u8, mode: PinMode) {
        for bit in 0..8u8 {
            if mask & (1 << bit) != 0 {
                self.set_mode(port * 8 + bit, mode);
            }
        }
    }

    fn port_write(&mut self, port: u8, mask: u8, value: u8) {
        for bit in 0..8u8 {
            if mask & (1 << bit) != 0 {
                self.write(port * 8 + bit, value & (1 << bit) != 0);
            }
        }
    }

    fn port_read(&mut self, port: u8, mask: u8) -> u8 {
        let mut value = 0u8;
        for bit in 0..8u8 {
            if mask & (1 << bit) != 0 && GpioPort::read(self, port * 8 + bit) {
                value |= 1 << bit;
            }
        }
        value
    }
}

// ── ADC ───────────────────────────────────────────────────────

impl AdcPort for BoardHw {
    fn read(&mut self, channel: u8) -> u16 {
        let mut raw: i32 = 0;
        // SAFETY: the unit handle is created in new() and never freed.
        let ret = unsafe { adc_oneshot_read(self.adc1, channel as u32, &mut raw) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: ADC ch{} read failed (rc={})", channel, ret);
            return 0;
        }
        // 12-bit conversion, 10-bit wire value.
        (raw.max(0) as u16) >> 2
    }
}

// ── SPI ───────────────────────────────────────────────────────

fn spi_index(bus: SpiBus) -> usize {
    match bus {
        SpiBus::Spi0 => 0,
        SpiBus::Spi1 => 1,
    }
}

fn spi_host(bus: SpiBus) -> spi_host_device_t {
    match bus {
        SpiBus::Spi0 => spi_host_device_t_SPI2_HOST,
        SpiBus::Spi1 => spi_host_device_t_SPI3_HOST,
    }
}

fn spi_pins(bus: SpiBus) -> (i32, i32, i32) {
    match bus {
        SpiBus::Spi0 => (SPI0_SCLK_GPIO, SPI0_MOSI_GPIO, SPI0_MISO_GPIO),
        SpiBus::Spi1 => (SPI1_SCLK_GPIO, SPI1_MOSI_GPIO, SPI1_MISO_GPIO),
    }
}

impl SpiPort for BoardHw {
    fn begin(&mut self, bus: SpiBus, divider: u32, mode: u8) {
        let i = spi_index(bus);
        if !self.spi_dev[i].is_null() {
            // Re-begin reconfigures from scratch.
            SpiPort::end(self, bus);
        }

        let (sclk, mosi, miso) = spi_pins(bus);
        let mut bus_cfg = spi_bus_config_t::default();
        bus_cfg.__bindgen_anon_1.mosi_io_num = mosi;
        bus_cfg.__bindgen_anon_2.miso_io_num = miso;
        bus_cfg.sclk_io_num = sclk;
        bus_cfg.__bindgen_anon_3.quadwp_io_num = -1;
        bus_cfg.__bindgen_anon_4.quadhd_io_num = -1;

        // SAFETY: configs are copied by the driver; main-loop only.
        let ret = unsafe {
            spi_bus_initialize(spi_host(bus), &bus_cfg, spi_common_dma_t_SPI_DMA_CH_AUTO)
        };
        if ret != ESP_OK as i32 {
            warn!("board_hw: spi{} bus init failed (rc={})", i, ret);
            return;
        }

        // Chip select stays with the host; boards drive it via
        // ordinary pin writes around the transfer.
        let dev_cfg = spi_device_interface_config_t {
            mode,
            clock_speed_hz: (SPI_BASE_HZ / divider.max(1)) as i32,
            spics_io_num: -1,
            queue_size: 1,
            ..Default::default()
        };
        let mut dev: spi_device_handle_t = core::ptr::null_mut();
        let ret = unsafe { spi_bus_add_device(spi_host(bus), &dev_cfg, &mut dev) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: spi{} device add failed (rc={})", i, ret);
            unsafe { spi_bus_free(spi_host(bus)) };
            return;
        }
        self.spi_dev[i] = dev;
    }

    fn transfer(&mut self, bus: SpiBus, write: &[u8], read: Option<&mut [u8]>) {
        let i = spi_index(bus);
        let dev = self.spi_dev[i];
        if dev.is_null() {
            warn!("board_hw: spi{} transfer before begin", i);
            if let Some(read) = read {
                read.fill(0);
            }
            return;
        }
        if write.is_empty() {
            return;
        }

        let mut trans = spi_transaction_t::default();
        trans.length = write.len() * 8;
        trans.__bindgen_anon_1.tx_buffer = write.as_ptr().cast();
        if let Some(read) = read {
            trans.rxlength = read.len() * 8;
            trans.__bindgen_anon_2.rx_buffer = read.as_mut_ptr().cast();
        }

        // SAFETY: both buffers outlive this blocking call.
        let ret = unsafe { spi_device_transmit(dev, &mut trans) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: spi{} transfer failed (rc={})", i, ret);
        }
    }

    fn end(&mut self, bus: SpiBus) {
        let i = spi_index(bus);
        if self.spi_dev[i].is_null() {
            return;
        }
        // SAFETY: the handle came from spi_bus_add_device and is
        // dropped exactly once.
        unsafe {
            spi_bus_remove_device(self.spi_dev[i]);
            spi_bus_free(spi_host(bus));
        }
        self.spi_dev[i] = core::ptr::null_mut();
    }
}

// ── I²C ───────────────────────────────────────────────────────

impl I2cPort for BoardHw {
    fn begin(&mut self) {
        if !self.i2c_bus.is_null() {
            return;
        }
        let mut cfg = i2c_master_bus_config_t::default();
        cfg.i2c_port = -1;
        cfg.sda_io_num = I2C_SDA_GPIO;
        cfg.scl_io_num = I2C_SCL_GPIO;
        cfg.clk_source = soc_periph_i2c_clk_src_t_I2C_CLK_SRC_DEFAULT;
        cfg.glitch_ignore_cnt = 7;

        let mut bus: i2c_master_bus_handle_t = core::ptr::null_mut();
        // SAFETY: config is copied; bus handle is written once.
        let ret = unsafe { i2c_new_master_bus(&cfg, &mut bus) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: I2C bus init failed (rc={})", ret);
            return;
        }
        self.i2c_bus = bus;
    }

    fn transfer(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> I2cOutcome {
        if self.i2c_bus.is_null() {
            return I2cOutcome {
                read_count: 0,
                status: i2c_status::BUS_ERROR,
            };
        }

        let dev_cfg = i2c_device_config_t {
            device_address: address as u16,
            scl_speed_hz: I2C_SCL_HZ,
            ..Default::default()
        };
        let mut dev: i2c_master_dev_handle_t = core::ptr::null_mut();
        // SAFETY: the bus handle is live; the device is removed below
        // before the handles can dangle.
        let ret = unsafe { i2c_master_bus_add_device(self.i2c_bus, &dev_cfg, &mut dev) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: I2C device add failed (rc={})", ret);
            return I2cOutcome {
                read_count: 0,
                status: i2c_status::BUS_ERROR,
            };
        }

        // SAFETY: buffers outlive the blocking transaction.
        let ret = unsafe {
            match (write.is_empty(), read.is_empty()) {
                (false, false) => i2c_master_transmit_receive(
                    dev,
                    write.as_ptr(),
                    write.len(),
                    read.as_mut_ptr(),
                    read.len(),
                    I2C_TIMEOUT_MS,
                ),
                (false, true) => {
                    i2c_master_transmit(dev, write.as_ptr(), write.len(), I2C_TIMEOUT_MS)
                }
                (true, false) => {
                    i2c_master_receive(dev, read.as_mut_ptr(), read.len(), I2C_TIMEOUT_MS)
                }
                // Empty both ways: a plain address ping.
                (true, true) => i2c_master_probe(self.i2c_bus, address as u16, I2C_TIMEOUT_MS),
            }
        };
        unsafe {
            i2c_master_bus_rm_device(dev);
        }

        // The driver folds every failure into one opaque error; map it
        // onto the closest classic bus code by transfer direction.
        // Reads are all-or-nothing under this driver.
        if ret == ESP_OK as i32 {
            I2cOutcome {
                read_count: read.len(),
                status: i2c_status::OK,
            }
        } else if write.is_empty() && !read.is_empty() {
            I2cOutcome {
                read_count: 0,
                status: i2c_status::ADDR_READ_NACK,
            }
        } else {
            I2cOutcome {
                read_count: 0,
                status: i2c_status::ADDR_WRITE_NACK,
            }
        }
    }

    fn end(&mut self) {
        if self.i2c_bus.is_null() {
            return;
        }
        // SAFETY: the handle came from i2c_new_master_bus and is
        // dropped exactly once.
        unsafe {
            i2c_del_master_bus(self.i2c_bus);
        }
        self.i2c_bus = core::ptr::null_mut();
    }
}

// ── PWM (LEDC) ────────────────────────────────────────────────

fn pwm_index(block: PwmBlock) -> usize {
    match block {
        PwmBlock::Pwm0 => 0,
        PwmBlock::Pwm1 => 1,
    }
}

fn pwm_timer(block: PwmBlock) -> ledc_timer_t {
    match block {
        PwmBlock::Pwm0 => ledc_timer_t_LEDC_TIMER_0,
        PwmBlock::Pwm1 => ledc_timer_t_LEDC_TIMER_1,
    }
}

/// Block 0 owns LEDC channels 0..3, block 1 channels 3..6.
fn pwm_channel(block: PwmBlock, channel: u8) -> ledc_channel_t {
    ledc_channel_t_LEDC_CHANNEL_0 + (pwm_index(block) as u32 * PWM_CHANNELS as u32) + channel as u32
}

fn pwm_gpios(block: PwmBlock) -> &'static [i32; PWM_CHANNELS as usize] {
    match block {
        PwmBlock::Pwm0 => &PWM0_GPIOS,
        PwmBlock::Pwm1 => &PWM1_GPIOS,
    }
}

impl PwmPort for BoardHw {
    fn begin(&mut self, block: PwmBlock, period_us: u32) {
        let i = pwm_index(block);
        let period = period_us.max(1);

        let timer = ledc_timer_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            timer_num: pwm_timer(block),
            duty_resolution: ledc_timer_bit_t_LEDC_TIMER_10_BIT,
            freq_hz: (1_000_000 / period).max(1),
            clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        };
        // SAFETY: main-loop only; the driver copies the configs.
        let ret = unsafe { ledc_timer_config(&timer) };
        if ret != ESP_OK as i32 {
            warn!("board_hw: pwm{} timer config failed (rc={})", i, ret);
            return;
        }

        for (ch, &gpio) in pwm_gpios(block).iter().enumerate() {
            unsafe {
                ledc_channel_config(&ledc_channel_config_t {
                    speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
                    channel: pwm_channel(block, ch as u8),
                    timer_sel: pwm_timer(block),
                    gpio_num: gpio,
                    duty: 0,
                    hpoint: 0,
                    ..Default::default()
                });
            }
        }
        self.pwm_period_us[i] = period;
    }

    fn set(&mut self, block: PwmBlock, channel: u8, high_time_us: u32) {
        let period = self.pwm_period_us[pwm_index(block)];
        if period == 0 {
            warn!("board_hw: pwm{} set before begin", pwm_index(block));
            return;
        }
        let duty = (high_time_us as u64 * PWM_DUTY_SPAN as u64 / period as u64)
            .min(PWM_DUTY_SPAN as u64) as u32;
        // SAFETY: the channel was configured in begin(); duty writes
        // are main-loop only.
        unsafe {
            ledc_set_duty(
                ledc_mode_t_LEDC_LOW_SPEED_MODE,
                pwm_channel(block, channel),
                duty,
            );
            ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, pwm_channel(block, channel));
        }
    }

    fn end(&mut self, block: PwmBlock) {
        let i = pwm_index(block);
        if self.pwm_period_us[i] == 0 {
            return;
        }
        // SAFETY: channels and timer were configured in begin().
        unsafe {
            for ch in 0..PWM_CHANNELS {
                ledc_stop(ledc_mode_t_LEDC_LOW_SPEED_MODE, pwm_channel(block, ch), 0);
            }
            ledc_timer_pause(ledc_mode_t_LEDC_LOW_SPEED_MODE, pwm_timer(block));
        }
        self.pwm_period_us[i] = 0;
    }
}

// ── 1-wire (DHT) ──────────────────────────────────────────────

/// Spin until `gpio` reads `level`; false when `timeout_us` elapses.
unsafe fn wait_level(gpio: i32, level: i32, timeout_us: u32) -> bool {
    // SAFETY: level/timer reads only.
    unsafe {
        let deadline = esp_timer_get_time() + timeout_us as i64;
        while gpio_get_level(gpio) != level {
            if esp_timer_get_time() >= deadline {
                return false;
            }
        }
    }
    true
}

/// Clock the 40 response bits off the bus, MSB first.  The bit value
/// rides in the high-phase width: ~27 µs is a 0, ~70 µs a 1.
unsafe fn clock_in_frame(gpio: i32, frame: &mut [u8; 5]) -> DhtStatus {
    // SAFETY: level/timer reads only; interrupts are masked by the caller.
    unsafe {
        // Response preamble: ~80 µs low, ~80 µs high, then bit one's
        // low phase.
        if !wait_level(gpio, 0, 100) {
            return DhtStatus::Timeout;
        }
        if !wait_level(gpio, 1, 200) {
            return DhtStatus::Timeout;
        }
        if !wait_level(gpio, 0, 200) {
            return DhtStatus::Timeout;
        }

        for bit in 0..40 {
            if !wait_level(gpio, 1, 100) {
                return DhtStatus::Timeout;
            }
            let start = esp_timer_get_time();
            if !wait_level(gpio, 0, 150) {
                return DhtStatus::Timeout;
            }
            if esp_timer_get_time() - start > DHT_ONE_THRESHOLD_US {
                frame[bit / 8] |= 0x80 >> (bit % 8);
            }
        }
    }
    DhtStatus::Ok
}

impl OneWirePort for BoardHw {
    fn dht_read(&mut self, pin: u8, frame: &mut [u8; 5]) -> DhtStatus {
        let g = PIN_MAP[pin as usize];
        frame.fill(0);

        // Start signal: hold the line low long enough for both DHT11
        // and DHT22, then release it to the pull-up.
        // SAFETY: open-drain output on a mapped pin; main-loop only.
        unsafe {
            gpio_set_direction(g, gpio_mode_t_GPIO_MODE_OUTPUT_OD);
            gpio_set_level(g, 0);
            esp_rom_delay_us(18_000);
            gpio_set_level(g, 1);
            gpio_set_direction(g, gpio_mode_t_GPIO_MODE_INPUT);
            gpio_set_pull_mode(g, gpio_pull_mode_t_GPIO_PULLUP_ONLY);
        }

        // The whole frame lasts under 5 ms; sample it with interrupts
        // masked so another ISR cannot stretch a bit mid-read.
        let status = esp_idf_hal::interrupt::free(|| unsafe { clock_in_frame(g, frame) });
        if status != DhtStatus::Ok {
            return status;
        }

        let sum = frame[0]
            .wrapping_add(frame[1])
            .wrapping_add(frame[2])
            .wrapping_add(frame[3]);
        if sum != frame[4] {
            return DhtStatus::ChecksumMismatch;
        }
        DhtStatus::Ok
    }
}

// ── System ────────────────────────────────────────────────────

impl SystemPort for BoardHw {
    fn guid(&self) -> [u8; 16] {
        self.guid
    }

    fn restart(&mut self) {
        info!("board_hw: restarting");
        // Grace period so the reply ahead of us drains out of the USB
        // FIFO before the controller drops off the bus.
        std::thread::sleep(core::time::Duration::from_secs(1));
        // SAFETY: esp_restart never returns; nothing to clean up.
        unsafe { esp_restart() };
    }
}
