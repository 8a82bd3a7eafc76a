//! Adapters: concrete implementations of the board port traits.
//!
//! | Adapter      | Implements         | Connects to                  |
//! |--------------|--------------------|------------------------------|
//! | `board_hw`   | GpioPort           | ESP32-S3 GPIO matrix + ISRs  |
//! |              | AdcPort            | ADC1 oneshot driver          |
//! |              | SpiPort            | SPI2 / SPI3 master driver    |
//! |              | I2cPort            | I2C master bus driver        |
//! |              | PwmPort            | LEDC timers + channels       |
//! |              | OneWirePort        | Bit-banged DHT bus           |
//! |              | SystemPort         | eFuse MAC, software reset    |
//! | `usb_serial` | ByteStream         | USB Serial/JTAG controller   |
//!
//! Both adapters talk to the hardware through raw `esp_idf_svc::sys`
//! bindings, so they only compile for an ESP-IDF target.  Host-side
//! builds (tests, fuzzing) use mock ports instead.

#[cfg(feature = "espidf")]
pub mod board_hw;
#[cfg(feature = "espidf")]
pub mod usb_serial;
