//! Thread-safe slots that the workers use to hand data to each other.
//!
//! Every publish replaces the whole value under one lock, so a reader only
//! ever sees a value exactly as some writer stored it. Nobody holds a lock
//! across anything slower than a copy.

use crate::stage::StageCommand;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

// Values are only ever swapped whole, so a poisoned lock still guards a
// consistent value.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the most recently published value of `T`. Cloning the cell gives
/// another handle onto the same slot.
#[derive(Debug, Default)]
pub struct LatestCell<T> {
    slot: Arc<Mutex<T>>,
}

impl<T> Clone for LatestCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> LatestCell<T> {
    /// Makes a cell holding `init` until the first publish.
    pub fn new(init: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(init)),
        }
    }

    /// Replaces the stored value.
    pub fn publish(&self, value: T) {
        *lock(&self.slot) = value;
    }

    /// Copies the stored value out.
    pub fn read(&self) -> T {
        lock(&self.slot).clone()
    }
}

/// The mailbox for stage move commands. Anyone may submit; the stage worker
/// consumes with [`CommandCell::take()`], which clears the `fresh` flag in
/// the same critical section so a command is executed at most once.
#[derive(Debug, Clone, Default)]
pub struct CommandCell {
    slot: Arc<Mutex<StageCommand>>,
}

impl CommandCell {
    /// Makes an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh command to move to `(x, y)`, replacing any command
    /// that has not been taken yet.
    pub fn submit(&self, x: f64, y: f64) {
        *lock(&self.slot) = StageCommand { x, y, fresh: true };
    }

    /// Swaps in a stale copy of the stored command and returns what was
    /// there before.
    pub fn take(&self) -> StageCommand {
        let mut guard = lock(&self.slot);
        let prev = *guard;
        guard.fresh = false;
        prev
    }

    /// Like [`CommandCell::take()`] but only yields fresh commands.
    pub fn take_fresh(&self) -> Option<StageCommand> {
        let cmd = self.take();
        cmd.fresh.then_some(cmd)
    }
}

/// A one-shot startup handshake. A worker calls [`ReadySignal::set()`] once
/// it has finished initializing (or failed to); the orchestrator blocks in
/// [`ReadySignal::wait()`] until then.
#[derive(Debug, Clone, Default)]
pub struct ReadySignal {
    inner: Arc<(Mutex<Option<bool>>, Condvar)>,
}

impl ReadySignal {
    /// Makes an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the outcome and wakes everyone waiting. `true` means ready,
    /// `false` means the worker gave up during initialization.
    pub fn set(&self, ready: bool) {
        let (flag, cv) = &*self.inner;
        *lock(flag) = Some(ready);
        cv.notify_all();
    }

    /// Blocks until [`ReadySignal::set()`] has been called and returns the
    /// value it was called with.
    pub fn wait(&self) -> bool {
        let (flag, cv) = &*self.inner;
        let mut guard = lock(flag);
        loop {
            if let Some(ready) = *guard {
                return ready;
            }
            guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Reads the outcome without blocking.
    pub fn peek(&self) -> Option<bool> {
        *lock(&self.inner.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Pair {
        a: u64,
        b: u64,
    }

    #[test]
    fn read_sees_latest_publish() {
        let cell = LatestCell::new(Pair { a: 0, b: 0 });
        cell.publish(Pair { a: 1, b: 1 });
        cell.publish(Pair { a: 2, b: 2 });
        assert_eq!(cell.read(), Pair { a: 2, b: 2 });
    }

    #[test]
    fn readers_never_see_torn_values() {
        let cell = LatestCell::new(Pair { a: 0, b: 0 });
        let writer_cell = cell.clone();

        let writer = thread::spawn(move || {
            for i in 0..20_000 {
                writer_cell.publish(Pair { a: i, b: i });
            }
        });

        for _ in 0..20_000 {
            let p = cell.read();
            assert_eq!(p.a, p.b);
        }
        writer.join().unwrap();
    }

    #[test]
    fn take_consumes_a_command_exactly_once() {
        let cell = CommandCell::new();
        cell.submit(-100.0, -120.0);

        let first = cell.take();
        assert!(first.fresh);
        assert_eq!((first.x, first.y), (-100.0, -120.0));

        let second = cell.take();
        assert!(!second.fresh);
        assert!(cell.take_fresh().is_none());
    }

    #[test]
    fn concurrent_takers_share_one_command() {
        let cell = CommandCell::new();
        cell.submit(1.0, 2.0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = cell.clone();
                thread::spawn(move || c.take_fresh().is_some())
            })
            .collect();

        let taken = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&t| t)
            .count();
        assert_eq!(taken, 1);
    }

    #[test]
    fn ready_signal_wakes_waiter() {
        let signal = ReadySignal::new();
        let setter = signal.clone();
        assert_eq!(signal.peek(), None);

        let th = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set(true);
        });

        assert!(signal.wait());
        th.join().unwrap();
        assert_eq!(signal.peek(), Some(true));
    }

    #[test]
    fn ready_signal_reports_failure() {
        let signal = ReadySignal::new();
        signal.set(false);
        assert!(!signal.wait());
    }
}
