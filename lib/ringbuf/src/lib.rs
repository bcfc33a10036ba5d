// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring buffer for tracing agent state transitions and error paths.
//!
//! This is a single-threaded-cooperative adaptation of a ring buffer
//! originally designed for instrumenting embedded tasks and drivers: a fixed
//! capacity, `Copy`-only buffer of the most recent N entries, with adjacent
//! duplicate entries collapsed into a repeat count rather than each
//! occupying their own slot.
//!
//! ## Constraints
//!
//! The entry type must implement [`Copy`]; de-duplication additionally
//! requires [`PartialEq`].
//!
//! ## Creating a ring buffer
//!
//! ```
//! ringbuf!(u32, 16, 0);
//! ringbuf_entry!(42u32);
//! ```
//!
//! You can also name the ring buffer to distinguish between several in the
//! same module:
//!
//! ```
//! ringbuf!(MY_RINGBUF, u32, 16, 0);
//! ringbuf_entry!(MY_RINGBUF, 42u32);
//! ```
//!
//! ### Entry de-duplication
//!
//! By default, recording the same value (same source line and payload) as
//! the most recent entry increments that entry's count instead of
//! allocating a new slot. This can be disabled with the trailing `no_dedup`
//! argument, in which case every call to [`ringbuf_entry!`] advances the
//! write cursor.

use std::cell::RefCell;

/// Declares a ring buffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ring buffer named `NAME`,
/// containing entries of type `Type`, with room for `N` such entries, all
/// initially `expr`. `NAME` defaults to `__RINGBUF` if omitted, to support
/// the common case of one ring buffer per module.
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        static $name: $crate::Ringbuf<$t, u16, $n> =
            $crate::Ringbuf::new($crate::RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: $init,
            });
    };
    ($name:ident, $t:ty, $n:expr, $init:expr, no_dedup) => {
        static $name: $crate::Ringbuf<$t, (), $n> =
            $crate::Ringbuf::new($crate::RingbufEntry {
                line: 0,
                generation: 0,
                count: (),
                payload: $init,
            });
    };
    ($t:ty, $n:expr, $init:expr, no_dedup) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init, no_dedup);
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

/// Inserts data into a named ring buffer (declared with [`ringbuf!`]).
///
/// `ringbuf_entry!(NAME, expr)` inserts `expr` into the ring buffer called
/// `NAME`. If the name is omitted, it defaults to `__RINGBUF`.
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate both buf and payload before recording, so that neither
        // expression can accidentally observe the other's binding.
        let (p, buf) = ($payload, &$buf);
        $crate::RecordEntry::record_entry(buf, line!() as u16, p);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

/// Inserts data into a ring buffer declared at the root of this crate.
#[allow(clippy::crate_in_macro_def)]
#[macro_export]
macro_rules! ringbuf_entry_root {
    ($payload:expr) => {
        $crate::ringbuf_entry!(crate::__RINGBUF, $payload);
    };
    ($buf:ident, $payload:expr) => {
        $crate::ringbuf_entry!(crate::$buf, $payload);
    };
}

/// A single [`Ringbuf`] entry, carrying a payload of arbitrary type.
///
/// When a new entry is identical (same `line` and `payload`) to the most
/// recently recorded one, `count` is incremented in place rather than
/// allocating a new entry.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy, C> {
    pub line: u16,
    pub generation: u16,
    pub payload: T,
    pub count: C,
}

#[derive(Debug)]
struct RingbufState<T: Copy, C, const N: usize> {
    last: Option<usize>,
    buffer: [RingbufEntry<T, C>; N],
}

/// A ring buffer of parametrized entry type and size.
///
/// Constructed via the [`ringbuf!`] macro; interior mutability is provided
/// by a [`RefCell`], which is sound under this crate's single-threaded
/// cooperative scheduling model (never more than one in-flight request).
pub struct Ringbuf<T: Copy, C, const N: usize> {
    state: RefCell<RingbufState<T, C, N>>,
}

// SAFETY: this crate's consumers run under a single-threaded cooperative
// scheduler (no in-flight concurrent access to a ring buffer is possible),
// matching the reference ring buffer's sole caller. This Sync impl only
// allows a `Ringbuf` to live in a `static`, not to be soundly accessed from
// multiple threads at once.
unsafe impl<T: Copy, C, const N: usize> Sync for Ringbuf<T, C, N> {}

impl<T: Copy, C, const N: usize> Ringbuf<T, C, N> {
    pub const fn new(init: RingbufEntry<T, C>) -> Self
    where
        RingbufEntry<T, C>: Copy,
    {
        Ringbuf {
            state: RefCell::new(RingbufState {
                last: None,
                buffer: [init; N],
            }),
        }
    }

    /// Returns a snapshot of the entries currently held, oldest first.
    pub fn snapshot(&self) -> Vec<RingbufEntry<T, C>>
    where
        C: Copy,
    {
        let state = self.state.borrow();
        state.buffer.to_vec()
    }
}

/// An abstraction over types in which ring buffer entries can be recorded.
///
/// Implemented for [`Ringbuf`] so that [`ringbuf_entry!`] can be written
/// without knowing the concrete entry type.
pub trait RecordEntry<T: Copy> {
    /// Records a `T`-typed entry. `line` is the source line the call site
    /// captured via `line!()`.
    fn record_entry(&self, line: u16, payload: T);
}

impl<T: Copy + PartialEq, const N: usize> RecordEntry<T> for Ringbuf<T, u16, N> {
    fn record_entry(&self, line: u16, payload: T) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        let last = state.last.unwrap_or(usize::MAX);

        if let Some(ent) = state.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }

        state.do_record(last, line, 1, payload);
    }
}

impl<T: Copy, const N: usize> RecordEntry<T> for Ringbuf<T, (), N> {
    fn record_entry(&self, line: u16, payload: T) {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            return;
        };
        let last = state.last.unwrap_or(usize::MAX);
        state.do_record(last, line, (), payload);
    }
}

impl<T: Copy, C, const N: usize> RingbufState<T, C, N> {
    fn do_record(&mut self, last: usize, line: u16, count: C, payload: T) {
        let ndx = {
            let last_plus_1 = last.wrapping_add(1);
            if last_plus_1 >= self.buffer.len() {
                0
            } else {
                last_plus_1
            }
        };
        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            payload,
            count,
            generation: ent.generation.wrapping_add(1),
        };
        self.last = Some(ndx);
    }
}

#[cfg(test)]
mod tests {
    #[derive(Copy, Clone, Debug, PartialEq)]
    enum Trace {
        None,
        Opened(u32),
        Closed,
    }

    ringbuf!(Trace, 4, Trace::None);

    #[test]
    fn dedup_collapses_repeats() {
        ringbuf_entry!(Trace::Opened(1));
        ringbuf_entry!(Trace::Opened(1));
        ringbuf_entry!(Trace::Opened(1));

        let snap = __RINGBUF.snapshot();
        let last = snap[__RINGBUF.state.borrow().last.unwrap()];
        assert_eq!(last.payload, Trace::Opened(1));
        assert_eq!(last.count, 3);
    }

    #[test]
    fn distinct_entries_occupy_distinct_slots() {
        ringbuf_entry!(Trace::Opened(7));
        ringbuf_entry!(Trace::Closed);

        let idx = __RINGBUF.state.borrow().last.unwrap();
        assert_eq!(__RINGBUF.snapshot()[idx].payload, Trace::Closed);
    }
}
