//! Synchronization primitives used by the scheduler.
//!
//! Every shared scheduler structure (queues, pools, the counter table, the
//! ready list) sits behind its own [`SpinLock`]: acquisition is a busy-wait,
//! locks are non-reentrant, and they are held only for the duration of the
//! queue/table operation itself. Cross-thread blocking waits go through
//! [`ThreadSignal`] instead.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use crossbeam_utils::Backoff;

/// A busy-wait mutex guarding a value.
///
/// Fine-grained and non-reentrant. Contended acquires back off with
/// [`Backoff`], which degrades from spinning to `thread::yield_now` under
/// sustained contention.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the lock provides the exclusion required to hand out &mut T across
// threads, so Send on T is the only requirement.
unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning until it is available.
    pub fn lock(&self) -> SpinGuard<'_, T> {
        let backoff = Backoff::new();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return SpinGuard { lock: self };
            }
            // Spin on a plain load so contending cores don't ping-pong the
            // cache line with failed CAS attempts.
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// Attempts to acquire the lock without spinning.
    pub fn try_lock(&self) -> Option<SpinGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinGuard { lock: self })
        } else {
            None
        }
    }
}

pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock, so access is exclusive.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// A one-shot cross-thread completion signal.
///
/// Attached to a job counter by the blocking submission path and fired exactly
/// once, when that counter reaches zero. The `fired` flag makes the signal
/// race-free: a notify that lands before the waiter reaches `wait` is not
/// lost.
pub struct ThreadSignal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl ThreadSignal {
    pub fn new() -> Self {
        ThreadSignal {
            fired: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Blocks the calling OS thread until the signal fires.
    pub fn wait(&self) {
        let mut fired = self.fired.lock().unwrap();
        while !*fired {
            fired = self.cond.wait(fired).unwrap();
        }
    }

    /// Fires the signal, waking every current and future waiter.
    pub fn notify_all(&self) {
        let mut fired = self.fired.lock().unwrap();
        *fired = true;
        self.cond.notify_all();
    }
}

impl Default for ThreadSignal {
    fn default() -> Self {
        ThreadSignal::new()
    }
}
