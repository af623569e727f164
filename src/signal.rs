// Signal kinds, per-process dispositions, and the bounded delivery queue.
//
// The kind/disposition table below is the language-neutral replacement for
// the original kernel's X-macro `SIGNALS` list: a single compile-time array
// of `(name, kind, default disposition)` tuples from which the catchable
// count and the initial per-process handler table are derived mechanically.

use crate::param::MAX_SIGNALS;

/// Stable signal identifiers. Catchable kinds are listed first so that
/// `SIGNAL_CATCHABLE_COUNT` is simply "how many variants precede `Kill`".
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum SignalKind {
    /// Kernel-to-process: fired by the scheduler when an armed alarm
    /// deadline is reached.
    Alarm = 0,
    /// Process-to-process: carries an arbitrary 64-bit payload.
    Message = 1,
    /// Uncatchable: unconditionally terminates the receiver.
    Kill = 2,
}

impl SignalKind {
    pub const fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(SignalKind::Alarm),
            1 => Some(SignalKind::Message),
            2 => Some(SignalKind::Kill),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_catchable(self) -> bool {
        self.index() < SIGNAL_CATCHABLE_COUNT
    }
}

/// Number of catchable signal kinds. Everything at or after this index in
/// the kind space is uncatchable and dispatched straight to its kernel-side
/// handler, ignoring per-process disposition.
pub const SIGNAL_CATCHABLE_COUNT: usize = 2;

/// Total number of signal kinds, catchable and not.
pub const SIGNAL_COUNT: usize = 3;

/// `(name, kind, default disposition)` table the rest of this module is
/// derived from. Only catchable kinds carry a meaningful default
/// disposition; uncatchable kinds always terminate and ignore this table.
pub const SIGNAL_TABLE: [(&str, SignalKind, Disposition); SIGNAL_COUNT] = [
    ("ALARM", SignalKind::Alarm, Disposition::Ignore),
    ("MESSAGE", SignalKind::Message, Disposition::Ignore),
    ("KILL", SignalKind::Kill, Disposition::Terminate),
];

/// Per-process disposition for a catchable signal kind.
///
/// The original kernel encodes `Ignore`/`Terminate` as the sentinel integers
/// 0 and -1, distinguished from a real user handler address by numeric
/// value alone. This tagged sum removes that overload: `User` carries the
/// handler's entry address in the *process's* address space, which is not a
/// Rust function pointer and must never be called directly from kernel
/// context.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Disposition {
    Ignore,
    Terminate,
    User(usize),
}

/// One enqueued signal.
#[derive(Copy, Clone, Debug)]
pub struct SignalValue {
    pub kind: SignalKind,
    pub sender_pid: u32,
    pub payload: u64,
}

impl SignalValue {
    pub const fn zero() -> Self {
        SignalValue {
            kind: SignalKind::Alarm,
            sender_pid: 0,
            payload: 0,
        }
    }
}

/// Result of `SignalQueue::push`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SendError {
    /// `count + 1 >= MAX_SIGNALS`: the effective usable capacity (511, one
    /// less than `MAX_SIGNALS`) has been reached.
    QueueFull,
}

/// Bounded per-process FIFO of pending signals.
///
/// Invariants: `count in [0, MAX_SIGNALS]`, `read` and `write` in
/// `[0, MAX_SIGNALS)`, and `(write - read) mod MAX_SIGNALS == count`.
#[derive(Copy, Clone)]
pub struct SignalQueue {
    queue: [SignalValue; MAX_SIGNALS],
    read: usize,
    write: usize,
    count: usize,
}

impl SignalQueue {
    pub const fn new() -> Self {
        SignalQueue {
            queue: [SignalValue::zero(); MAX_SIGNALS],
            read: 0,
            write: 0,
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Enqueue `signal`. Mirrors the kernel's own bound: the queue is full
    /// once `count + 1 == MAX_SIGNALS`, leaving `MAX_SIGNALS - 1` usable
    /// slots, not `MAX_SIGNALS`.
    pub fn push(&mut self, signal: SignalValue) -> Result<(), SendError> {
        if self.count + 1 >= MAX_SIGNALS {
            return Err(SendError::QueueFull);
        }

        self.queue[self.write] = signal;
        self.write = (self.write + 1) % MAX_SIGNALS;
        self.count += 1;
        Ok(())
    }

    /// Pop the oldest pending signal, if any.
    pub fn pop(&mut self) -> Option<SignalValue> {
        if self.count == 0 {
            return None;
        }

        let signal = self.queue[self.read];
        self.read = (self.read + 1) % MAX_SIGNALS;
        self.count -= 1;
        Some(signal)
    }
}

/// Per-process signal-handling state: the pending-signal queue, one
/// disposition per catchable kind, and the user-writable page used as the
/// stack while a handler executes.
#[derive(Copy, Clone)]
pub struct Signaling {
    pub queue: SignalQueue,
    pub handlers: [Disposition; SIGNAL_CATCHABLE_COUNT],
    pub stack: Option<*mut u8>,
}

impl Signaling {
    pub const fn new() -> Self {
        Signaling {
            queue: SignalQueue::new(),
            handlers: default_handlers(),
            stack: None,
        }
    }
}

/// Build the initial per-process disposition array from `SIGNAL_TABLE`,
/// mechanically, rather than writing out each catchable kind by hand.
const fn default_handlers() -> [Disposition; SIGNAL_CATCHABLE_COUNT] {
    let mut handlers = [Disposition::Ignore; SIGNAL_CATCHABLE_COUNT];
    let mut i = 0;
    while i < SIGNAL_CATCHABLE_COUNT {
        handlers[i] = SIGNAL_TABLE[i].2;
        i += 1;
    }
    handlers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catchable_count_matches_table() {
        assert!(SignalKind::Alarm.is_catchable());
        assert!(SignalKind::Message.is_catchable());
        assert!(!SignalKind::Kill.is_catchable());
    }

    #[test]
    fn queue_respects_ring_buffer_invariant() {
        let mut q = SignalQueue::new();
        for i in 0..10 {
            q.push(SignalValue {
                kind: SignalKind::Message,
                sender_pid: 1,
                payload: i,
            })
            .unwrap();
        }
        assert_eq!(q.len(), 10);
        for i in 0..10 {
            let v = q.pop().unwrap();
            assert_eq!(v.payload, i);
        }
        assert!(q.pop().is_none());
    }

    #[test]
    fn effective_capacity_is_max_signals_minus_one() {
        let mut q = SignalQueue::new();
        let mut delivered = 0usize;
        loop {
            let res = q.push(SignalValue {
                kind: SignalKind::Alarm,
                sender_pid: 1,
                payload: 0,
            });
            match res {
                Ok(()) => delivered += 1,
                Err(SendError::QueueFull) => break,
            }
        }
        assert_eq!(delivered, MAX_SIGNALS - 1);
    }

    #[test]
    fn fifo_order_is_preserved_across_wraparound() {
        let mut q = SignalQueue::new();
        for i in 0..(MAX_SIGNALS - 1) {
            q.push(SignalValue {
                kind: SignalKind::Message,
                sender_pid: 1,
                payload: i as u64,
            })
            .unwrap();
        }
        for i in 0..200 {
            assert_eq!(q.pop().unwrap().payload, i as u64);
            q.push(SignalValue {
                kind: SignalKind::Message,
                sender_pid: 1,
                payload: (MAX_SIGNALS - 1 + i) as u64,
            })
            .unwrap();
        }
        for i in 200..(MAX_SIGNALS - 1) {
            assert_eq!(q.pop().unwrap().payload, i as u64);
        }
    }
}
