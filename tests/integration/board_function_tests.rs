//! Every board function family end to end: wire bytes in, port calls
//! and wire replies out, through a fully registered server.

use crate::mock_hw::{bridge, PortCall};
use iobridge::board::ports::{
    DhtStatus, InterruptEvent, InterruptMode, PinFunction, PinMode, PwmBlock, SpiBus,
};

// ── GPIO ──────────────────────────────────────────────────────

#[test]
fn set_primary_and_secondary_route_pins() {
    let mut br = bridge();

    assert!(br.send(b"setPrimary(4)").is_empty());
    assert!(br.send(b"setSecondary(7)").is_empty());

    assert_eq!(
        br.calls(),
        vec![
            PortCall::SetFunction {
                pin: 4,
                function: PinFunction::Primary,
            },
            PortCall::SetFunction {
                pin: 7,
                function: PinFunction::Secondary,
            },
        ]
    );
}

#[test]
fn out_of_range_pins_are_rejected() {
    let mut br = bridge();

    assert!(br.send(b"setPrimary(34)").is_empty());
    assert!(br.send(b"digitalWrite(40, 1)").is_empty());

    assert!(br.calls().is_empty());
}

#[test]
fn reserved_pin_mode_is_rejected() {
    let mut br = bridge();

    br.send(b"pinMode(3, 4)");
    assert_eq!(
        br.calls(),
        vec![PortCall::SetMode {
            pin: 3,
            mode: PinMode::InputPullUp,
        }]
    );

    br.board.borrow_mut().calls.clear();
    br.send(b"pinMode(3, 3)");
    br.send(b"pinMode(3, 5)");
    assert!(br.calls().is_empty());
}

#[test]
fn digital_write_drives_any_nonzero_high() {
    let mut br = bridge();

    br.send(b"digitalWrite(2, 0xFF)");
    br.send(b"digitalWrite(2, 0)");

    assert_eq!(
        br.calls(),
        vec![
            PortCall::Write { pin: 2, high: true },
            PortCall::Write { pin: 2, high: false },
        ]
    );
}

#[test]
fn digital_read_low_uses_minimal_encoding() {
    let mut br = bridge();

    // Pin 5 is low; the reply value 0 encodes with no immediate bytes.
    let tx = br.send(&[0xD4, 0x00, 0x03, 0x05, 0x81, 0x05]);

    assert_eq!(tx, [0xD4, 0x00, 0x04, 0x05, 0x81, 0x05, 0x80]);
}

#[test]
fn text_attach_notifies_in_text() {
    let mut br = bridge();

    br.send(b"attachInterrupt(0, 2, 3)");
    assert_eq!(
        br.calls(),
        vec![PortCall::AttachInterrupt {
            slot: 0,
            pin: 2,
            mode: InterruptMode::Rising,
        }]
    );

    br.board
        .borrow_mut()
        .events
        .push_back((0, InterruptEvent::Rising));
    assert_eq!(br.pump(), b"interrupt( 0x00, 0x03)\n");
}

#[test]
fn binary_attach_notifies_in_binary() {
    let mut br = bridge();

    br.send(&[0xD4, 0x00, 0x06, 0x06, 0x80, 0x81, 0x02, 0x81, 0x03]);
    br.board
        .borrow_mut()
        .events
        .push_back((0, InterruptEvent::Rising));

    assert_eq!(br.pump(), [0xD4, 0x00, 0x04, 0x08, 0x80, 0x81, 0x03]);
}

#[test]
fn events_for_disarmed_slots_vanish() {
    let mut br = bridge();

    // Never armed.
    br.board
        .borrow_mut()
        .events
        .push_back((1, InterruptEvent::Falling));
    assert!(br.pump().is_empty());

    // Armed, then detached.
    br.send(b"attachInterrupt(1, 2, 4)");
    br.send(b"detachInterrupt(1)");
    br.board
        .borrow_mut()
        .events
        .push_back((1, InterruptEvent::Falling));
    assert!(br.pump().is_empty());
}

#[test]
fn detach_out_of_range_is_rejected() {
    let mut br = bridge();

    br.send(b"detachInterrupt(8)");

    assert!(br.calls().is_empty());
}

#[test]
fn pulse_in_replies_measured_width() {
    let mut br = bridge();
    br.board.borrow_mut().pulse_us = 1500;

    let tx = br.send(b"pulseIn(0x06, 1, 10000)");

    assert_eq!(tx, b"pulseIn( 0x06, 0x05DC)\n");
    assert_eq!(
        br.calls(),
        vec![PortCall::PulseIn {
            pin: 6,
            level: true,
            timeout_us: 10000,
        }]
    );
}

#[test]
fn pulse_in_timeout_replies_zero() {
    let mut br = bridge();

    assert_eq!(br.send(b"pulseIn(0x06, 0, 100)"), b"pulseIn( 0x06, 0x00)\n");
}

#[test]
fn port_write_then_read_round_trip() {
    let mut br = bridge();

    br.send(b"portMode(1, 0x0F, 1)");
    br.send(b"portWrite(1, 0x0F, 0x05)");
    let tx = br.send(b"portRead(1, 0xFF)");

    assert_eq!(tx, b"portRead( 0x01, 0x05)\n");
    assert_eq!(
        br.calls(),
        vec![
            PortCall::PortMode {
                port: 1,
                mask: 0x0F,
                mode: PinMode::Output,
            },
            PortCall::PortWrite {
                port: 1,
                mask: 0x0F,
                value: 0x05,
            },
            PortCall::PortRead { port: 1, mask: 0xFF },
        ]
    );
}

#[test]
fn port_out_of_range_is_rejected() {
    let mut br = bridge();

    assert!(br.send(b"portRead(4, 0xFF)").is_empty());

    assert!(br.calls().is_empty());
}

// ── ADC ───────────────────────────────────────────────────────

#[test]
fn analog_read_clamps_to_ten_bits() {
    let mut br = bridge();
    br.board.borrow_mut().adc[3] = 0xFFFF;

    assert_eq!(br.send(b"analogRead(3)"), b"analogRead( 0x03, 0x03FF)\n");
}

#[test]
fn analog_read_channel_out_of_range_is_rejected() {
    let mut br = bridge();

    assert!(br.send(b"analogRead(8)").is_empty());

    assert!(br.calls().is_empty());
}

// ── SPI ───────────────────────────────────────────────────────

#[test]
fn spi0_full_session() {
    let mut br = bridge();

    assert!(br.send(b"spi0_begin(24, 7)").is_empty());
    let tx = br.send(b"spi0_trans([0x01, 0x02], 1)");
    assert!(br.send(b"spi0_end()").is_empty());

    // The mock echoes each outbound byte plus one.
    assert_eq!(tx, b"spi0_trans( [0x02, 0x03])\n");
    assert_eq!(
        br.calls(),
        vec![
            PortCall::SpiBegin {
                bus: SpiBus::Spi0,
                divider: 24,
                mode: 3,
            },
            PortCall::SpiTransfer {
                bus: SpiBus::Spi0,
                write: vec![0x01, 0x02],
                respond: true,
            },
            PortCall::SpiEnd { bus: SpiBus::Spi0 },
        ]
    );
}

#[test]
fn spi_trans_without_respond_stays_silent() {
    let mut br = bridge();

    assert!(br.send(b"spi1_trans([0xAA], 0)").is_empty());

    assert_eq!(
        br.calls(),
        vec![PortCall::SpiTransfer {
            bus: SpiBus::Spi1,
            write: vec![0xAA],
            respond: false,
        }]
    );
}

#[test]
fn spi1_routes_by_binary_id() {
    let mut br = bridge();

    let tx = br.send(&[0xD4, 0x00, 0x06, 0x1F, 0xA1, 0x01, 0x10, 0x81, 0x01]);

    assert_eq!(tx, [0xD4, 0x00, 0x04, 0x1F, 0xA1, 0x01, 0x11]);
    assert_eq!(
        br.calls(),
        vec![PortCall::SpiTransfer {
            bus: SpiBus::Spi1,
            write: vec![0x10],
            respond: true,
        }]
    );
}

// ── I2C ───────────────────────────────────────────────────────

#[test]
fn i2c_session_replies_data_and_status() {
    let mut br = bridge();
    br.board.borrow_mut().i2c_read = vec![0xA0, 0xA1];

    br.send(b"i2c_begin()");
    let tx = br.send(b"i2c_trans(0x48, [], 2)");
    br.send(b"i2c_end()");

    assert_eq!(tx, b"i2c_trans( 0x48, [0xA0, 0xA1], 0x00)\n");
    assert_eq!(
        br.calls(),
        vec![
            PortCall::I2cBegin,
            PortCall::I2cTransfer {
                address: 0x48,
                write: vec![],
                read_len: 2,
            },
            PortCall::I2cEnd,
        ]
    );
}

#[test]
fn i2c_address_is_masked_to_seven_bits() {
    let mut br = bridge();

    let tx = br.send(b"i2c_trans(0xC8, [], 0)");

    assert_eq!(tx, b"i2c_trans( 0x48, [], 0x00)\n");
}

#[test]
fn i2c_short_read_truncates_the_reply() {
    let mut br = bridge();
    {
        let mut board = br.board.borrow_mut();
        board.i2c_read = vec![0xA0, 0xA1];
        board.i2c_read_count = Some(1);
        board.i2c_status = 0x58;
    }

    let tx = br.send(b"i2c_trans(0x10, [], 2)");

    assert_eq!(tx, b"i2c_trans( 0x10, [0xA0], 0x58)\n");
}

// ── PWM ───────────────────────────────────────────────────────

#[test]
fn pwm0_period_is_masked_to_sixteen_bits() {
    let mut br = bridge();

    br.send(b"pwm0_begin(0x12345)");

    assert_eq!(
        br.calls(),
        vec![PortCall::PwmBegin {
            block: PwmBlock::Pwm0,
            period_us: 0x2345,
        }]
    );
}

#[test]
fn pwm1_period_keeps_all_bits() {
    let mut br = bridge();

    br.send(b"pwm1_begin(0x12345)");

    assert_eq!(
        br.calls(),
        vec![PortCall::PwmBegin {
            block: PwmBlock::Pwm1,
            period_us: 0x12345,
        }]
    );
}

#[test]
fn pwm_channel_out_of_range_is_rejected() {
    let mut br = bridge();

    br.send(b"pwm0_set(3, 100)");
    assert!(br.calls().is_empty());

    br.send(b"pwm0_set(2, 100)");
    br.send(b"pwm1_end()");
    assert_eq!(
        br.calls(),
        vec![
            PortCall::PwmSet {
                block: PwmBlock::Pwm0,
                channel: 2,
                high_time_us: 100,
            },
            PortCall::PwmEnd {
                block: PwmBlock::Pwm1,
            },
        ]
    );
}

// ── 1-wire ────────────────────────────────────────────────────

#[test]
fn dht_read_replies_status_then_frame() {
    let mut br = bridge();
    br.board.borrow_mut().dht_frame = [0x02, 0x26, 0x00, 0xF6, 0x1E];

    let tx = br.send(b"dhtRead(0)");

    assert_eq!(tx, b"dhtRead( 0x00, [0x02, 0x26, 0x00, 0xF6, 0x1E])\n");
    assert_eq!(br.calls(), vec![PortCall::DhtRead { pin: 0 }]);
}

#[test]
fn dht_failure_still_reports_the_frame() {
    let mut br = bridge();
    {
        let mut board = br.board.borrow_mut();
        board.dht_status = DhtStatus::ChecksumMismatch;
        board.dht_frame = [0x01, 0x02, 0x03, 0x04, 0x05];
    }

    let tx = br.send(b"dhtRead(7)");

    // First reply argument is the status word, not the pin.
    assert_eq!(tx, b"dhtRead( 0x02, [0x01, 0x02, 0x03, 0x04, 0x05])\n");
}

// ── System ────────────────────────────────────────────────────

#[test]
fn device_info_layout_is_frozen() {
    let mut br = bridge();

    let tx = br.send(&[0xD4, 0x00, 0x01, 0xFF]);

    #[rustfmt::skip]
    let expected = [
        0xD4, 0x00, 0x1E, 0xFF,
        0x84, 0x42, 0x00, 0x00, 0x02,
        0xA1, 0x10,
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
        0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x82, 0x10, 0x01,
        0x82, 0x01, 0x00,
    ];
    assert_eq!(tx, expected);
}

#[test]
fn restart_reaches_the_port_silently() {
    let mut br = bridge();

    assert!(br.send(b"restart()").is_empty());

    assert_eq!(br.calls(), vec![PortCall::Restart]);
}

#[test]
fn wrong_argument_counts_are_rejected() {
    let mut br = bridge();

    assert!(br.send(b"restart(1)").is_empty());
    assert!(br.send(b"GetDeviceInfo(5)").is_empty());

    assert!(br.calls().is_empty());
}

#[test]
fn wrong_argument_type_is_rejected() {
    let mut br = bridge();

    assert!(br.send(b"digitalWrite(\"a\", 1)").is_empty());

    assert!(br.calls().is_empty());
}
