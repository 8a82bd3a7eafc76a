//! Server framing behavior end to end: fragmentation, resync, the
//! idle budget, handler fan-out, and the default handler.

use std::cell::RefCell;
use std::rc::Rc;

use crate::mock_hw::{bridge, PortCall};
use iobridge::board::ports::PinMode;
use iobridge::Error;

const DIGITAL_READ_PIN5: [u8; 6] = [0xD4, 0x00, 0x03, 0x05, 0x81, 0x05];
const DIGITAL_READ_PIN5_HIGH: [u8; 8] = [0xD4, 0x00, 0x05, 0x05, 0x81, 0x05, 0x81, 0x01];
/// `restart` has no arguments and never replies; handy as a probe.
const RESTART: [u8; 4] = [0xD4, 0x00, 0x01, 0xFB];

#[test]
fn whole_binary_frame_dispatches_in_one_cycle() {
    let mut br = bridge();
    br.board.borrow_mut().levels[5] = true;

    let tx = br.send(&DIGITAL_READ_PIN5);

    assert_eq!(tx, DIGITAL_READ_PIN5_HIGH);
    assert_eq!(br.calls(), vec![PortCall::Read { pin: 5 }]);
}

#[test]
fn byte_at_a_time_delivery_parses_identically() {
    let mut br = bridge();
    br.board.borrow_mut().levels[5] = true;

    let mut replies = Vec::new();
    for &b in &DIGITAL_READ_PIN5 {
        replies.extend(br.send(&[b]));
    }

    assert_eq!(replies, DIGITAL_READ_PIN5_HIGH);
    assert_eq!(br.calls(), vec![PortCall::Read { pin: 5 }]);
}

#[test]
fn garbage_before_a_frame_resyncs() {
    let mut br = bridge();

    let mut bytes = vec![0x00, 0x07, 0x1F, 0xFE];
    bytes.extend(RESTART);
    let tx = br.send(&bytes);

    assert!(tx.is_empty());
    assert_eq!(br.calls(), vec![PortCall::Restart]);
}

#[test]
fn unknown_binary_id_is_ignored() {
    let mut br = bridge();

    let tx = br.send(&[0xD4, 0x00, 0x01, 0x63]);

    assert!(tx.is_empty());
    assert!(br.calls().is_empty());
}

#[test]
fn unknown_text_name_is_ignored() {
    let mut br = bridge();

    let tx = br.send(b"frobnicate()");

    assert!(tx.is_empty());
    assert!(br.calls().is_empty());
}

#[test]
fn zero_length_binary_frame_is_malformed() {
    let mut br = bridge();

    br.server.stream_mut().feed(&[0xD4, 0x00, 0x00]);
    assert_eq!(br.server.cycle(), Err(Error::Format));

    // The server recovers; the next frame serves normally.
    let tx = br.send(&RESTART);
    assert!(tx.is_empty());
    assert_eq!(br.calls(), vec![PortCall::Restart]);
}

#[test]
fn lying_tag_cannot_steal_from_the_next_frame() {
    let mut br = bridge();

    // One-byte body left, but the tag claims four immediate bytes.
    br.server.stream_mut().feed(&[0xD4, 0x00, 0x02, 0x05, 0x84]);
    assert_eq!(br.server.cycle(), Err(Error::Format));

    br.board.borrow_mut().levels[5] = true;
    let tx = br.send(&DIGITAL_READ_PIN5);
    assert_eq!(tx, DIGITAL_READ_PIN5_HIGH);
}

#[test]
fn half_frame_times_out_and_is_discarded() {
    let mut br = bridge();
    br.server.set_data_timeout(3);

    br.server.stream_mut().feed(&[0xD4, 0x00]);
    for _ in 0..5 {
        let _ = br.server.cycle();
    }

    // The leftover length byte reads as inter-frame garbage, and a
    // fresh frame serves normally.
    let tx = br.send(&RESTART);
    assert!(tx.is_empty());
    assert_eq!(br.calls(), vec![PortCall::Restart]);
}

#[test]
fn decimal_text_arguments_parse() {
    let mut br = bridge();

    let tx = br.send(b"pinMode(5,1)");

    assert!(tx.is_empty());
    assert_eq!(
        br.calls(),
        vec![PortCall::SetMode {
            pin: 5,
            mode: PinMode::Output,
        }]
    );
}

#[test]
fn reply_kind_mirrors_request_kind() {
    let mut br = bridge();
    br.board.borrow_mut().levels[5] = true;

    assert_eq!(br.send(b"digitalRead(0x05)"), b"digitalRead( 0x05, 0x01)\n");
    assert_eq!(br.send(&DIGITAL_READ_PIN5), DIGITAL_READ_PIN5_HIGH);
}

#[test]
fn fan_out_runs_every_matching_handler() {
    let mut br = bridge();
    let seen = Rc::new(RefCell::new(0u32));
    let in_handler = seen.clone();
    br.server
        .add_handler(
            "digitalWrite",
            4,
            Box::new(move |_call, _stream| {
                *in_handler.borrow_mut() += 1;
                Ok(())
            }),
        )
        .expect("add");

    br.send(b"digitalWrite(3, 1)");

    assert_eq!(*seen.borrow(), 1, "the extra handler ran");
    assert_eq!(br.calls(), vec![PortCall::Write { pin: 3, high: true }]);
}

#[test]
fn default_handler_runs_only_when_nothing_matches() {
    let mut br = bridge();
    let fallback = Rc::new(RefCell::new(Vec::new()));
    let in_handler = fallback.clone();
    br.server.set_default_handler(Box::new(move |call, _stream| {
        in_handler.borrow_mut().push(call.name().to_string());
        Ok(())
    }));

    br.send(b"frobnicate()");
    br.send(b"digitalWrite(3, 0)");

    assert_eq!(*fallback.borrow(), vec!["frobnicate".to_string()]);
}
