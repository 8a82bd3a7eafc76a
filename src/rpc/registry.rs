//! Handler registry: who answers which function.
//!
//! Entries pair a text name with a numeric id so one registration serves
//! both wire formats: binary calls match on id, text calls match on
//! name.  Dispatch fans out to *every* matching entry in registration
//! order; several subsystems may observe the same function.  A single
//! default slot catches calls nothing matched.
//!
//! Callbacks are boxed closures handed the parsed [`Call`] (borrowed;
//! copy out anything you keep) and the stream, so replies go out on the
//! same channel the request came in on.  Closures have no identity to
//! compare, so `add` hands back a [`HandlerId`] token and removal takes
//! the token.

use log::warn;

use crate::error::{Error, Result};
use crate::rpc::call::{is_name_char, Call, CallKind};

/// Handler callback: borrow the call, reply on the stream if needed.
///
/// Return values are logged, never acted on; dispatch is fire-and-forget
/// fan-out.
pub type Handler<S> = Box<dyn FnMut(&Call, &mut S) -> Result<()>>;

/// Token identifying one registration; returned by [`Registry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

struct Entry<S> {
    name: String,
    id: u32,
    token: HandlerId,
    callback: Handler<S>,
}

/// Ordered handler table plus the default slot.
pub struct Registry<S> {
    entries: Vec<Entry<S>>,
    default: Option<Handler<S>>,
    next_token: u64,
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default: None,
            next_token: 0,
        }
    }

    /// Register a callback under `name` (text matching) and `id` (binary
    /// matching).
    ///
    /// Names are restricted to the characters the text parser can read
    /// back (ASCII alphanumerics and `_`); anything else is
    /// `Error::Invalid`.
    pub fn add(&mut self, name: &str, id: u32, callback: Handler<S>) -> Result<HandlerId> {
        if !name.bytes().all(is_name_char) {
            return Err(Error::Invalid);
        }
        self.entries.try_reserve(1)?;
        let mut owned = String::new();
        owned.try_reserve_exact(name.len())?;
        owned.push_str(name);

        let token = HandlerId(self.next_token);
        self.next_token += 1;
        self.entries.push(Entry {
            name: owned,
            id,
            token,
            callback,
        });
        Ok(token)
    }

    /// Drop the registration behind `token`.  `Error::Invalid` if it was
    /// already removed.
    pub fn remove(&mut self, token: HandlerId) -> Result<()> {
        match self.entries.iter().position(|e| e.token == token) {
            Some(i) => {
                self.entries.remove(i);
                Ok(())
            }
            None => Err(Error::Invalid),
        }
    }

    /// Install the catch-all for calls no entry matches.
    pub fn set_default(&mut self, callback: Handler<S>) {
        self.default = Some(callback);
    }

    pub fn clear_default(&mut self) {
        self.default = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fan the call out to every matching entry, or to the default.
    ///
    /// No match and no default is a logged no-op; parsing continues
    /// regardless of what handlers return.
    pub fn dispatch(&mut self, call: &Call, stream: &mut S) {
        let mut matched = false;
        for entry in &mut self.entries {
            let hit = match call.kind() {
                CallKind::Binary => entry.id == call.id(),
                CallKind::Text => entry.name == call.name(),
                CallKind::Auto => false,
            };
            if hit {
                matched = true;
                if let Err(e) = (entry.callback)(call, stream) {
                    warn!("rpc: handler '{}' failed: {e}", entry.name);
                }
            }
        }

        if !matched {
            match self.default.as_mut() {
                Some(callback) => {
                    if let Err(e) = callback(call, stream) {
                        warn!("rpc: default handler failed: {e}");
                    }
                }
                None => match call.kind() {
                    CallKind::Binary => warn!("rpc: no handler for id {}", call.id()),
                    _ => warn!("rpc: no handler for '{}'", call.name()),
                },
            }
        }
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
