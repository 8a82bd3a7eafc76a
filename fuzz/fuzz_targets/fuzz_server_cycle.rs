//! Fuzz target: `Server::cycle`
//!
//! Drives arbitrary byte soup through the streaming call parser and
//! asserts that it never panics and never wedges: after the soup is
//! consumed and the idle budget fires, a well-formed frame must still
//! dispatch.
//!
//! cargo fuzz run fuzz_server_cycle

#![no_main]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use iobridge::rpc::{ByteStream, Server};
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct SoupStream {
    rx: VecDeque<u8>,
}

impl ByteStream for SoupStream {
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

    fn write(&mut self, _data: &[u8]) {}
}

fuzz_target!(|data: &[u8]| {
    let mut server = Server::new(SoupStream::default());
    // One-cycle idle budget so half-parsed soup is abandoned quickly.
    server.set_data_timeout(1);

    let pinged = Rc::new(RefCell::new(false));
    let flag = pinged.clone();
    server
        .add_handler(
            "ping",
            0x7F,
            Box::new(move |_call, _stream| {
                *flag.borrow_mut() = true;
                Ok(())
            }),
        )
        .unwrap();
    server.set_default_handler(Box::new(|_call, _stream| Ok(())));

    server.stream_mut().rx.extend(data);

    // A blocked stage holds bytes in the stream until the idle reset
    // releases them, so each wedge costs at most two cycles.
    for _ in 0..data.len() * 2 + 8 {
        if server.stream_mut().available() == 0 {
            break;
        }
        let _ = server.cycle();
    }

    // Flush any half-parsed text state through the idle budget.
    let _ = server.cycle();
    let _ = server.cycle();

    // The parser must be back at frame start: a valid frame dispatches.
    server.stream_mut().rx.extend([0xD4, 0x00, 0x01, 0x7F]);
    let _ = server.cycle();
    assert!(*pinged.borrow(), "parser wedged after byte soup");
});
