//! Streaming function-call server.
//!
//! Consumes bytes from a [`ByteStream`] one `cycle()` at a time, feeds
//! them through an incremental parser that understands both wire
//! formats, and fans completed [`Call`]s out through the [`Registry`].
//! The parser holds its position between cycles, so frames may arrive
//! in any fragmentation: one byte per cycle parses exactly like a
//! whole frame at once.
//!
//! Error recovery is local: unparseable input drops the partial call
//! and rescans from the next byte (resync), a malformed-but-framed
//! sequence additionally surfaces `Error::Format` from that cycle, and
//! a stalled peer is cut loose by the idle budget.  The server itself
//! never dies; the next cycle always starts clean.
//!
//! ```text
//!              ┌── 0xD4 ──▶ BinaryLength ──▶ BinaryBody ──▶ dispatch
//! FunctionStart┤
//!              └── name( ─▶ ParamStart ─▶ Int/Str/Array … ─▶ ')' ─▶ dispatch
//! ```

use log::{debug, warn};

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::rpc::call::{
    is_name_char, Call, CallKind, BINARY_MARKER, TAG_BYTES, TAG_INT, TAG_STR,
};
use crate::rpc::registry::{Handler, HandlerId, Registry};
use crate::rpc::transport::ByteStream;

/// Radix a numeric stage is accumulating in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Radix {
    Dec,
    Hex,
    Bin,
    Oct,
}

impl Radix {
    fn digit(self, c: u8) -> Option<u32> {
        let c = char::from(c);
        match self {
            Self::Dec => c.to_digit(10),
            Self::Hex => c.to_digit(16),
            Self::Bin => c.to_digit(2),
            Self::Oct => c.to_digit(8),
        }
    }

    /// Fold one digit in; overflow wraps like the 32-bit registers the
    /// hosts of this protocol have always used.
    fn accumulate(self, acc: u32, digit: u32) -> u32 {
        match self {
            Self::Dec => acc.wrapping_mul(10).wrapping_add(digit),
            Self::Hex => (acc << 4) | digit,
            Self::Bin => (acc << 1) | digit,
            Self::Oct => (acc << 3) | digit,
        }
    }
}

/// Parser position, held across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Scanning for a frame start: `0xD4` or a `name(`.
    FunctionStart,
    /// Binary: waiting for the two big-endian length bytes.
    BinaryLength,
    /// Binary: waiting for the whole body, then decoding it.
    BinaryBody,
    /// Text: before an argument (or the closing paren).
    ParamStart,
    /// Text: saw a leading `0`, sniffing the radix.
    IntRadix,
    /// Text: accumulating an integer argument.
    Int(Radix),
    /// Text: inside a quoted string.
    Str,
    /// Text: byte after a backslash.
    StrEscape,
    /// Text: `\x` hex escape digits.
    StrHex,
    /// Text: octal escape digits.
    StrOctal,
    /// Text: inside `[`, before an element.
    Array,
    /// Text: array element starting with `0`.
    ArrayRadix,
    /// Text: accumulating an array element value.
    ArrayInt(Radix),
    /// Text: `'c'` array element (needs both bytes at once).
    ArrayChar,
    /// Text: after an array element, before `,` or `]`.
    ArrayEnd,
    /// Text: after an argument, before `,` or `)`.
    ParamEnd,
}

/// Function-call server bound to one stream.
///
/// Owns the stream, the handler registry, and all parse state.  Drive
/// it with [`Server::cycle`] from the firmware main loop; between
/// cycles the caller is free to use [`Server::stream_mut`] to push
/// unsolicited outbound calls (interrupt notifications do this).
pub struct Server<S: ByteStream> {
    stream: S,
    registry: Registry<S>,
    stage: Stage,
    current: Call,
    /// Name / string / array / binary-payload accumulation buffer.
    scratch: Vec<u8>,
    /// Integer being accumulated (argument value, payload length, or
    /// escape byte, depending on the stage).
    acc: u32,
    /// Binary remaining-length counter, or escape digit count.
    pending: u32,
    /// Idle budget in cycles; 0 disables the timeout.
    data_timeout: u32,
    idle_cycles: u32,
}

impl<S: ByteStream> Server<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            registry: Registry::new(),
            stage: Stage::FunctionStart,
            current: Call::new(),
            scratch: Vec::new(),
            acc: 0,
            pending: 0,
            data_timeout: 0,
            idle_cycles: 0,
        }
    }

    pub fn with_config(stream: S, config: &ProtocolConfig) -> Self {
        let mut server = Self::new(stream);
        server.set_data_timeout(config.data_timeout_cycles);
        server
    }

    // ── Registry passthroughs ─────────────────────────────────────

    pub fn add_handler(
        &mut self,
        name: &str,
        id: u32,
        callback: Handler<S>,
    ) -> Result<HandlerId> {
        self.registry.add(name, id, callback)
    }

    pub fn remove_handler(&mut self, token: HandlerId) -> Result<()> {
        self.registry.remove(token)
    }

    pub fn set_default_handler(&mut self, callback: Handler<S>) {
        self.registry.set_default(callback);
    }

    pub fn clear_default_handler(&mut self) {
        self.registry.clear_default();
    }

    // ── Configuration & access ────────────────────────────────────

    /// Cycles without forward progress before a half-parsed frame is
    /// abandoned.  0 disables the budget (the default).
    pub fn set_data_timeout(&mut self, cycles: u32) {
        self.data_timeout = cycles;
    }

    pub fn data_timeout(&self) -> u32 {
        self.data_timeout
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Tear the server down, handing the stream back.
    pub fn into_stream(self) -> S {
        self.stream
    }

    // ── Serving ───────────────────────────────────────────────────

    /// One non-blocking slice of work: consume at most what the stream
    /// reports available, dispatch any calls completed along the way.
    ///
    /// Format and allocation failures are reported for this invocation
    /// only; the partial call is dropped and the server stays usable.
    pub fn cycle(&mut self) -> Result<()> {
        let mut avail = self.stream.available();
        let had = avail;
        let result = self.drain(&mut avail);

        if had == avail {
            self.tick_idle();
        } else {
            self.idle_cycles = 0;
        }
        result
    }

    /// Serve forever.  Firmware entry points that have nothing to
    /// interleave use this instead of hand-rolling the loop.
    pub fn run(&mut self) -> ! {
        loop {
            if let Err(e) = self.cycle() {
                warn!("rpc: cycle error: {e}");
            }
        }
    }

    fn tick_idle(&mut self) {
        if self.data_timeout == 0 || !self.mid_parse() {
            return;
        }
        self.idle_cycles += 1;
        if self.idle_cycles >= self.data_timeout {
            warn!("rpc: idle timeout mid-frame, dropping partial state");
            self.reset_to_start();
            self.idle_cycles = 0;
        }
    }

    /// True while any partial frame state exists, including a name
    /// accumulated in `FunctionStart` that has not seen its `(` yet.
    fn mid_parse(&self) -> bool {
        self.stage != Stage::FunctionStart || !self.scratch.is_empty()
    }

    fn drain(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            match self.stage {
                Stage::FunctionStart => self.on_function_start(avail)?,
                Stage::BinaryLength => {
                    if *avail < 2 {
                        return Ok(());
                    }
                    let hi = self.next(avail);
                    let lo = self.next(avail);
                    self.pending = (u32::from(hi) << 8) | u32::from(lo);
                    self.stage = Stage::BinaryBody;
                }
                Stage::BinaryBody => {
                    if *avail < self.pending as usize {
                        return Ok(());
                    }
                    self.on_binary_body(avail)?;
                }
                Stage::ParamStart => self.on_param_start(avail)?,
                Stage::IntRadix => {
                    let c = self.next(avail);
                    self.on_int_radix(c)?;
                }
                Stage::Int(radix) => self.on_int(radix, avail)?,
                Stage::Str => self.on_str(avail)?,
                Stage::StrEscape => {
                    let c = self.next(avail);
                    self.on_str_escape(c)?;
                }
                Stage::StrHex => self.on_str_hex(avail)?,
                Stage::StrOctal => self.on_str_octal(avail)?,
                Stage::Array => self.on_array(avail)?,
                Stage::ArrayRadix => {
                    let c = self.next(avail);
                    self.on_array_radix(c)?;
                }
                Stage::ArrayInt(radix) => self.on_array_int(radix, avail)?,
                Stage::ArrayChar => {
                    if *avail < 2 {
                        return Ok(());
                    }
                    self.on_array_char(avail)?;
                }
                Stage::ArrayEnd => self.on_array_end(avail)?,
                Stage::ParamEnd => self.on_param_end(avail)?,
            }
        }
        Ok(())
    }

    fn next(&mut self, avail: &mut usize) -> u8 {
        *avail -= 1;
        self.stream.read_byte()
    }

    /// Silent resync: drop all partial state, rescan from the next byte.
    fn reset_to_start(&mut self) {
        self.stage = Stage::FunctionStart;
        self.scratch.clear();
        self.current = Call::new();
    }

    /// Abort the current call and pass the error through.
    fn abort(&mut self, e: Error) -> Error {
        self.reset_to_start();
        e
    }

    fn abort_format(&mut self) -> Error {
        self.abort(Error::Format)
    }

    /// Hand the completed call to the registry and start over.
    fn dispatch(&mut self) {
        let call = core::mem::take(&mut self.current);
        self.stage = Stage::FunctionStart;
        self.scratch.clear();

        match call.kind() {
            CallKind::Binary => {
                debug!("rpc: dispatch id {} ({} args)", call.id(), call.arg_count());
            }
            _ => {
                debug!("rpc: dispatch '{}' ({} args)", call.name(), call.arg_count());
            }
        }

        let Self { registry, stream, .. } = self;
        registry.dispatch(&call, stream);
    }

    fn push_scratch(&mut self, b: u8) -> Result<()> {
        if let Err(e) = self.scratch.try_reserve(1) {
            return Err(self.abort(e.into()));
        }
        self.scratch.push(b);
        Ok(())
    }

    // ── Frame-start & binary stages ───────────────────────────────

    fn on_function_start(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            if c == BINARY_MARKER {
                self.current = Call::new();
                self.current.set_kind(CallKind::Binary);
                self.scratch.clear();
                self.stage = Stage::BinaryLength;
                return Ok(());
            }
            if c == b'(' {
                self.current = Call::new();
                self.current.set_kind(CallKind::Text);
                // Only name characters reach scratch here, so this is
                // always valid UTF-8.
                let name = core::str::from_utf8(&self.scratch).unwrap_or_default();
                if let Err(e) = self.current.set_name(name) {
                    return Err(self.abort(e));
                }
                self.scratch.clear();
                self.stage = Stage::ParamStart;
                return Ok(());
            }
            if is_name_char(c) {
                self.push_scratch(c)?;
            } else {
                // Garbage between frames; drop any name fragment.
                self.scratch.clear();
            }
        }
        Ok(())
    }

    fn on_binary_body(&mut self, avail: &mut usize) -> Result<()> {
        let id = self.next(avail);
        self.current.set_id(u32::from(id));
        let mut remaining = match self.pending.checked_sub(1) {
            Some(r) => r,
            // Zero-length frame cannot even hold the id byte.
            None => return Err(self.abort_format()),
        };

        while remaining > 0 {
            let tag = self.next(avail);
            let imm = u32::from(tag & 0x0F);
            // Charge the tag and its immediates before reading them; a
            // lying tag must not steal bytes from the next frame.
            remaining = match remaining.checked_sub(1 + imm) {
                Some(r) => r,
                None => return Err(self.abort_format()),
            };
            self.acc = 0;
            for _ in 0..imm {
                self.acc = (self.acc << 8) | u32::from(self.next(avail));
            }

            match tag & 0xF0 {
                TAG_INT => {
                    if let Err(e) = self.current.push_int(self.acc as i32) {
                        return Err(self.abort(e));
                    }
                }
                TAG_STR | TAG_BYTES => {
                    let len = self.acc;
                    remaining = match remaining.checked_sub(len) {
                        Some(r) => r,
                        None => return Err(self.abort_format()),
                    };
                    self.read_payload(len as usize, avail)?;
                    let pushed = if tag & 0xF0 == TAG_STR {
                        self.current.push_str(&self.scratch)
                    } else {
                        self.current.push_bytes(&self.scratch)
                    };
                    if let Err(e) = pushed {
                        return Err(self.abort(e));
                    }
                    self.scratch.clear();
                }
                _ => return Err(self.abort_format()),
            }
        }

        self.dispatch();
        Ok(())
    }

    /// Bulk-read `len` payload bytes into scratch.
    fn read_payload(&mut self, len: usize, avail: &mut usize) -> Result<()> {
        self.scratch.clear();
        if let Err(e) = self.scratch.try_reserve_exact(len) {
            return Err(self.abort(e.into()));
        }
        self.scratch.resize(len, 0);
        let got = self.stream.read(&mut self.scratch[..]);
        *avail = avail.saturating_sub(got);
        // A short read violates the stream contract; clamp rather than
        // carry stale zero bytes into the argument.
        self.scratch.truncate(got);
        Ok(())
    }

    // ── Text stages ───────────────────────────────────────────────

    fn on_param_start(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            match c {
                b' ' => continue,
                b'0' => {
                    self.acc = 0;
                    self.stage = Stage::IntRadix;
                }
                b'1'..=b'9' => {
                    self.acc = u32::from(c - b'0');
                    self.stage = Stage::Int(Radix::Dec);
                }
                b'"' => {
                    self.scratch.clear();
                    self.stage = Stage::Str;
                }
                b'[' => {
                    self.scratch.clear();
                    self.stage = Stage::Array;
                }
                b')' => self.dispatch(),
                _ => self.reset_to_start(),
            }
            break;
        }
        Ok(())
    }

    fn on_int_radix(&mut self, c: u8) -> Result<()> {
        match c {
            b'x' => self.stage = Stage::Int(Radix::Hex),
            b'b' => self.stage = Stage::Int(Radix::Bin),
            b'0'..=b'7' => {
                self.acc = u32::from(c - b'0');
                self.stage = Stage::Int(Radix::Oct);
            }
            b',' | b' ' | b')' => return self.finish_int(c),
            _ => self.reset_to_start(),
        }
        Ok(())
    }

    fn on_int(&mut self, radix: Radix, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            if let Some(d) = radix.digit(c) {
                self.acc = radix.accumulate(self.acc, d);
                continue;
            }
            match c {
                b',' | b' ' | b')' => self.finish_int(c)?,
                _ => self.reset_to_start(),
            }
            break;
        }
        Ok(())
    }

    /// Append the accumulated int and move past its terminator.
    fn finish_int(&mut self, terminator: u8) -> Result<()> {
        if let Err(e) = self.current.push_int(self.acc as i32) {
            return Err(self.abort(e));
        }
        match terminator {
            b',' => self.stage = Stage::ParamStart,
            b' ' => self.stage = Stage::ParamEnd,
            _ => self.dispatch(), // ')'
        }
        Ok(())
    }

    fn on_str(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            self.string_accept(c)?;
            if self.stage != Stage::Str {
                break;
            }
        }
        Ok(())
    }

    /// One byte of quoted-string input.  Escape stages re-dispatch their
    /// terminating byte through here after flushing.
    fn string_accept(&mut self, c: u8) -> Result<()> {
        match c {
            b'\\' => self.stage = Stage::StrEscape,
            b'"' => {
                if let Err(e) = self.current.push_str(&self.scratch) {
                    return Err(self.abort(e));
                }
                self.scratch.clear();
                self.stage = Stage::ParamEnd;
            }
            0x20..=0x7E => return self.push_scratch(c),
            _ => self.reset_to_start(),
        }
        Ok(())
    }

    fn on_str_escape(&mut self, c: u8) -> Result<()> {
        let mapped = match c {
            b'x' => {
                self.acc = 0;
                self.pending = 0;
                self.stage = Stage::StrHex;
                return Ok(());
            }
            b'0'..=b'7' => {
                self.acc = u32::from(c - b'0');
                self.pending = 1;
                self.stage = Stage::StrOctal;
                return Ok(());
            }
            b'n' => b'\n',
            b'r' => b'\r',
            b'b' => 0x08,
            b't' => b'\t',
            b'f' => 0x0C,
            b'a' => 0x07,
            b'v' => 0x0B,
            // \\ \" \' \? and anything unrecognized pass through.
            other => other,
        };
        self.stage = Stage::Str;
        self.push_scratch(mapped)
    }

    fn on_str_hex(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            if let Some(d) = Radix::Hex.digit(c) {
                self.acc = (self.acc << 4) | d;
                self.pending += 1;
                if self.pending == 2 {
                    let byte = self.acc as u8;
                    self.stage = Stage::Str;
                    self.push_scratch(byte)?;
                    break;
                }
                continue;
            }
            // Terminator: flush what accumulated (zero digits flush
            // 0x00), then replay the byte as plain string input.
            let byte = self.acc as u8;
            self.stage = Stage::Str;
            self.push_scratch(byte)?;
            self.string_accept(c)?;
            break;
        }
        Ok(())
    }

    fn on_str_octal(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            if let Some(d) = Radix::Oct.digit(c) {
                self.acc = (self.acc << 3) | d;
                self.pending += 1;
                if self.pending == 3 {
                    let byte = self.acc as u8;
                    self.stage = Stage::Str;
                    self.push_scratch(byte)?;
                    break;
                }
                continue;
            }
            let byte = self.acc as u8;
            self.stage = Stage::Str;
            self.push_scratch(byte)?;
            self.string_accept(c)?;
            break;
        }
        Ok(())
    }

    fn on_array(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            match c {
                b' ' => continue,
                b'0' => {
                    self.acc = 0;
                    self.stage = Stage::ArrayRadix;
                }
                b'1'..=b'9' => {
                    self.acc = u32::from(c - b'0');
                    self.stage = Stage::ArrayInt(Radix::Dec);
                }
                b'\'' => self.stage = Stage::ArrayChar,
                b']' => self.finish_array()?,
                _ => self.reset_to_start(),
            }
            break;
        }
        Ok(())
    }

    fn on_array_radix(&mut self, c: u8) -> Result<()> {
        match c {
            b'x' => self.stage = Stage::ArrayInt(Radix::Hex),
            b'b' => self.stage = Stage::ArrayInt(Radix::Bin),
            b'0'..=b'7' => {
                self.acc = u32::from(c - b'0');
                self.stage = Stage::ArrayInt(Radix::Oct);
            }
            b',' | b' ' | b']' => return self.finish_array_int(c),
            _ => self.reset_to_start(),
        }
        Ok(())
    }

    fn on_array_int(&mut self, radix: Radix, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            if let Some(d) = radix.digit(c) {
                self.acc = radix.accumulate(self.acc, d);
                continue;
            }
            match c {
                b',' | b' ' | b']' => self.finish_array_int(c)?,
                _ => self.reset_to_start(),
            }
            break;
        }
        Ok(())
    }

    /// Store the accumulated element (truncated to a byte) and move past
    /// its terminator.
    fn finish_array_int(&mut self, terminator: u8) -> Result<()> {
        let byte = self.acc as u8;
        self.push_scratch(byte)?;
        match terminator {
            b',' => self.stage = Stage::Array,
            b' ' => self.stage = Stage::ArrayEnd,
            _ => return self.finish_array(), // ']'
        }
        Ok(())
    }

    /// Close the array argument out of scratch (possibly empty).
    fn finish_array(&mut self) -> Result<()> {
        if let Err(e) = self.current.push_bytes(&self.scratch) {
            return Err(self.abort(e));
        }
        self.scratch.clear();
        self.stage = Stage::ParamEnd;
        Ok(())
    }

    fn on_array_char(&mut self, avail: &mut usize) -> Result<()> {
        let b = self.next(avail);
        let quote = self.next(avail);
        if quote != b'\'' || !(0x20..=0x7E).contains(&b) {
            return Err(self.abort_format());
        }
        self.push_scratch(b)?;
        self.stage = Stage::ArrayEnd;
        Ok(())
    }

    fn on_array_end(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            match c {
                b' ' => continue,
                b',' => self.stage = Stage::Array,
                b']' => self.finish_array()?,
                _ => return Err(self.abort_format()),
            }
            break;
        }
        Ok(())
    }

    fn on_param_end(&mut self, avail: &mut usize) -> Result<()> {
        while *avail > 0 {
            let c = self.next(avail);
            match c {
                b' ' => continue,
                b',' => self.stage = Stage::ParamStart,
                b')' => self.dispatch(),
                _ => self.reset_to_start(),
            }
            break;
        }
        Ok(())
    }
}
