//! Function-call value and its two wire encodings.
//!
//! A [`Call`] is one remote invocation: a textual name, a numeric id, a
//! wire-format kind, and an ordered list of typed arguments.  The same
//! value can be rendered two ways:
//!
//! Binary frame (compact, host tooling):
//! ```text
//! ┌──────┬─────────┬────┬──────────────────────────┐
//! │ 0xD4 │ len u16 │ id │ argument bytes …         │
//! │      │ BE      │ 1B │ tag + immediates (+data) │
//! └──────┴─────────┴────┴──────────────────────────┘
//! ```
//! `len` counts the bytes from `id` through the last argument byte,
//! inclusive.  Each argument starts with a tag byte `(class << 4) | n`:
//! class `0x8` int, `0x9` string, `0xA` byte array; `n` is the number of
//! big-endian immediate bytes that follow (0..=4, minimal; leading zero
//! bytes dropped).  For ints the immediates are the value; for strings
//! and byte arrays they are the payload length, and the raw payload
//! follows.
//!
//! Text frame (human-typable from any serial terminal):
//! ```text
//! name( 0x1A, "hi", [0x01, 0x02])\n
//! ```
//! Ints render as `0x` + uppercase hex with a minimal even digit count;
//! strings render as raw bytes between double quotes (no output
//! escaping); byte arrays render as a bracketed `0xHH` list.
//!
//! A freshly created call has kind [`CallKind::Auto`]; serializing it
//! before the kind is resolved is an error, not silence.

use crate::error::{Error, Result};
use crate::rpc::transport::ByteStream;

/// Marker byte that opens every binary frame.
pub(crate) const BINARY_MARKER: u8 = 0xD4;

/// Argument tag classes (high nibble of the tag byte).
pub(crate) const TAG_INT: u8 = 0x80;
pub(crate) const TAG_STR: u8 = 0x90;
pub(crate) const TAG_BYTES: u8 = 0xA0;

/// Sentinel for a call whose numeric id was never assigned.
pub const ID_UNSET: u32 = u32::MAX;

/// Characters the text format accepts in a function name.
pub(crate) fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Wire format a call is parsed from / serialized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Transient default; must be resolved before serialization.
    Auto,
    Binary,
    Text,
}

/// Discriminant of an argument slot.
///
/// `Void` is the answer for out-of-range positions; position queries
/// never fail, mirroring how handlers probe argument lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Void,
    Int,
    Str,
    Bytes,
}

/// One typed argument, owning its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i32),
    /// Raw bytes: escapes on the text wire can inject any byte value,
    /// so no UTF-8 guarantee is made.
    Str(Vec<u8>),
    Bytes(Vec<u8>),
}

impl Arg {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Int(_) => ArgKind::Int,
            Self::Str(_) => ArgKind::Str,
            Self::Bytes(_) => ArgKind::Bytes,
        }
    }
}

/// One remote function invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    kind: CallKind,
    name: String,
    id: u32,
    args: Vec<Arg>,
}

impl Default for Call {
    fn default() -> Self {
        Self::new()
    }
}

impl Call {
    /// Empty call: kind `Auto`, id unset, no name, no arguments.
    pub fn new() -> Self {
        Self {
            kind: CallKind::Auto,
            name: String::new(),
            id: ID_UNSET,
            args: Vec::new(),
        }
    }

    /// Start a reply to `req`: same wire kind as the request, addressed
    /// by `id`/`name`.  Handlers answer in whichever format the host
    /// spoke.
    pub fn reply_to(req: &Call, id: u32, name: &str) -> Result<Self> {
        let mut call = Self::new();
        call.set_kind(req.kind());
        call.set_id(id);
        call.set_name(name)?;
        Ok(call)
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: CallKind) {
        self.kind = kind;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let mut s = String::new();
        s.try_reserve_exact(name.len())?;
        s.push_str(name);
        self.name = s;
        Ok(())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Type of the argument at `pos`; `Void` when out of range.
    pub fn kind_at(&self, pos: usize) -> ArgKind {
        self.args.get(pos).map_or(ArgKind::Void, Arg::kind)
    }

    /// Int value at `pos`; `None` when out of range or not an int.
    pub fn int_at(&self, pos: usize) -> Option<i32> {
        match self.args.get(pos) {
            Some(Arg::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// String payload at `pos`; `None` when out of range or not a string.
    pub fn str_at(&self, pos: usize) -> Option<&[u8]> {
        match self.args.get(pos) {
            Some(Arg::Str(p)) => Some(p.as_slice()),
            _ => None,
        }
    }

    /// Byte-array payload at `pos`; `None` when out of range or not one.
    pub fn bytes_at(&self, pos: usize) -> Option<&[u8]> {
        match self.args.get(pos) {
            Some(Arg::Bytes(p)) => Some(p.as_slice()),
            _ => None,
        }
    }

    /// Overwrite the int at `pos`.  Errors unless `pos` holds an int.
    pub fn set_int_at(&mut self, pos: usize, value: i32) -> Result<()> {
        match self.args.get_mut(pos) {
            Some(Arg::Int(v)) => {
                *v = value;
                Ok(())
            }
            _ => Err(Error::Invalid),
        }
    }

    pub fn push_int(&mut self, value: i32) -> Result<()> {
        self.push_arg(Arg::Int(value))
    }

    pub fn push_str(&mut self, payload: &[u8]) -> Result<()> {
        self.push_arg(Arg::Str(copy_payload(payload)?))
    }

    pub fn push_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.push_arg(Arg::Bytes(copy_payload(payload)?))
    }

    fn push_arg(&mut self, arg: Arg) -> Result<()> {
        self.args.try_reserve(1)?;
        self.args.push(arg);
        Ok(())
    }

    // ── Serialization ─────────────────────────────────────────────

    /// Render the full frame for the resolved kind.
    ///
    /// `Auto` kind is `Error::Invalid`; a binary body that overflows the
    /// 16-bit length field is `Error::Format`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self.kind {
            CallKind::Binary => self.encode_binary(),
            CallKind::Text => self.encode_text(),
            CallKind::Auto => Err(Error::Invalid),
        }
    }

    /// Serialize and push the frame as one `write` call.
    pub fn send<S: ByteStream>(&self, stream: &mut S) -> Result<()> {
        let frame = self.encode()?;
        stream.write(&frame);
        Ok(())
    }

    fn encode_binary(&self) -> Result<Vec<u8>> {
        let body = self.binary_body_len();
        if body > usize::from(u16::MAX) {
            return Err(Error::Format);
        }

        let mut out = Vec::new();
        out.try_reserve_exact(3 + body)?;
        out.push(BINARY_MARKER);
        out.extend_from_slice(&(body as u16).to_be_bytes());
        // The id travels as a single byte; wider ids truncate.
        out.push(self.id as u8);

        for arg in &self.args {
            match arg {
                Arg::Int(v) => push_tagged(&mut out, TAG_INT, *v as u32),
                Arg::Str(p) => {
                    push_tagged(&mut out, TAG_STR, p.len() as u32);
                    out.extend_from_slice(p);
                }
                Arg::Bytes(p) => {
                    push_tagged(&mut out, TAG_BYTES, p.len() as u32);
                    out.extend_from_slice(p);
                }
            }
        }
        Ok(out)
    }

    /// Bytes from the id through the last argument byte: the value of
    /// the frame's length field.
    fn binary_body_len(&self) -> usize {
        let mut n = 1;
        for arg in &self.args {
            n += match arg {
                Arg::Int(v) => 1 + immediate_len(*v as u32),
                Arg::Str(p) | Arg::Bytes(p) => {
                    1 + immediate_len(p.len() as u32) + p.len()
                }
            };
        }
        n
    }

    fn encode_text(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.text_len())?;
        out.extend_from_slice(self.name.as_bytes());
        out.push(b'(');

        let last = self.args.len().saturating_sub(1);
        for (i, arg) in self.args.iter().enumerate() {
            out.push(b' ');
            match arg {
                Arg::Int(v) => push_text_int(&mut out, *v as u32),
                Arg::Str(p) => {
                    out.push(b'"');
                    out.extend_from_slice(p);
                    out.push(b'"');
                }
                Arg::Bytes(p) => {
                    out.push(b'[');
                    for (j, b) in p.iter().enumerate() {
                        if j != 0 {
                            out.extend_from_slice(b", ");
                        }
                        out.extend_from_slice(b"0x");
                        push_hex_byte(&mut out, *b);
                    }
                    out.push(b']');
                }
            }
            if i != last {
                out.push(b',');
            }
        }
        out.extend_from_slice(b")\n");
        Ok(out)
    }

    /// Exact byte length of the text rendering.
    fn text_len(&self) -> usize {
        let mut n = self.name.len() + 3; // name + '(' + ")\n"
        let count = self.args.len();
        for (i, arg) in self.args.iter().enumerate() {
            n += 1; // leading space
            n += match arg {
                Arg::Int(v) => 2 + hex_digits(*v as u32),
                Arg::Str(p) => 2 + p.len(),
                Arg::Bytes(p) => {
                    2 + 4 * p.len() + 2 * p.len().saturating_sub(1)
                }
            };
            if i + 1 != count {
                n += 1; // comma
            }
        }
        n
    }
}

/// Number of minimal big-endian immediate bytes for `v`.
fn immediate_len(v: u32) -> usize {
    if v == 0 {
        0
    } else if v < 0x100 {
        1
    } else if v < 0x1_0000 {
        2
    } else if v < 0x100_0000 {
        3
    } else {
        4
    }
}

/// Tag byte + minimal big-endian immediates.
fn push_tagged(out: &mut Vec<u8>, class: u8, v: u32) {
    let n = immediate_len(v);
    out.push(class | n as u8);
    for i in (0..n).rev() {
        out.push((v >> (8 * i)) as u8);
    }
}

/// Uppercase hex digit count the text form uses for `v` (even, minimal).
fn hex_digits(v: u32) -> usize {
    if v > 0xFF_FFFF {
        8
    } else if v > 0xFFFF {
        6
    } else if v > 0xFF {
        4
    } else {
        2
    }
}

fn push_hex_byte(out: &mut Vec<u8>, b: u8) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    out.push(HEX[usize::from(b >> 4)]);
    out.push(HEX[usize::from(b & 0xF)]);
}

/// `0x` + minimal even uppercase hex.
fn push_text_int(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(b"0x");
    if v > 0xFF_FFFF {
        push_hex_byte(out, (v >> 24) as u8);
    }
    if v > 0xFFFF {
        push_hex_byte(out, (v >> 16) as u8);
    }
    if v > 0xFF {
        push_hex_byte(out, (v >> 8) as u8);
    }
    push_hex_byte(out, v as u8);
}

fn copy_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let mut v = Vec::new();
    v.try_reserve_exact(payload.len())?;
    v.extend_from_slice(payload);
    Ok(v)
}
