//! Cooperative execution contexts for jobs.
//!
//! A [`Fiber`] is an independently resumable call stack: a job runs on it,
//! may suspend itself mid-function (recording why it yielded), and is resumed
//! later, possibly on a different worker thread. Context switching is done by
//! `corosensei` stackful coroutines; the saved state carries no thread
//! affinity, which is what lets a job "block" on a dependency while its
//! worker thread moves on to other work.

use std::cell::Cell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::ptr;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use tracing::error;

use crate::job::{JobEntry, JobHandle, JobOrigin};

/// Why a fiber voluntarily suspended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YieldReason {
    /// Waiting for the counter named by this handle to reach zero.
    WaitForCounter(JobHandle),
}

/// Outcome of one [`Fiber::resume`] transfer.
#[derive(Debug)]
pub enum FiberRun {
    /// The job ran to completion; the fiber is dead.
    Completed,
    /// The job suspended itself and can be resumed later.
    Suspended(YieldReason),
}

type FiberCoroutine = Coroutine<(), YieldReason, (), &'static mut DefaultStack>;

thread_local! {
    /// Yielder of the fiber currently running on this thread, null outside
    /// fiber execution. Set by [`Fiber::resume`] (and by the fiber entry on
    /// first launch), cleared when control returns to the worker.
    static ACTIVE_YIELDER: Cell<*const Yielder<(), YieldReason>> = const { Cell::new(ptr::null()) };
}

pub struct Fiber {
    coroutine: FiberCoroutine,
    /// Captured after the first resume; points into the fiber's own stack,
    /// so it stays valid wherever the fiber migrates.
    yielder: *const Yielder<(), YieldReason>,
}

// SAFETY: the coroutine's stack and closure are Send (enforced at JobEntry
// construction) and the yielder pointer targets that same stack.
unsafe impl Send for Fiber {}

impl Fiber {
    /// Prepares a fiber whose first resume runs `entry` on `stack`.
    ///
    /// The `'static` on the stack borrow is a promise, not a fact: the caller
    /// must keep the stack alive and in place until the fiber is dropped
    /// (the scheduler releases a job's stack to its pool only after the
    /// fiber is gone).
    pub fn new(stack: &'static mut DefaultStack, entry: JobEntry, origin: JobOrigin) -> Fiber {
        let coroutine = Coroutine::with_stack(stack, move |yielder, ()| {
            ACTIVE_YIELDER.set(yielder as *const _);

            // A panicking job must not unwind through the context switch.
            // Cancellation (dropping a suspended fiber) also unwinds through
            // here with a private payload type, which must pass through
            // untouched; only ordinary panic payloads are swallowed.
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| entry.invoke())) {
                if let Some(&msg) = payload.downcast_ref::<&str>() {
                    error!(%origin, msg, "job panicked");
                } else if let Some(msg) = payload.downcast_ref::<String>() {
                    error!(%origin, %msg, "job panicked");
                } else {
                    resume_unwind(payload);
                }
            }
        });

        Fiber {
            coroutine,
            yielder: ptr::null(),
        }
    }

    /// Transfers control to the fiber. Returns when the job completes or
    /// voluntarily yields; there is no preemption.
    pub fn resume(&mut self) -> FiberRun {
        ACTIVE_YIELDER.set(self.yielder);
        let result = self.coroutine.resume(());
        self.yielder = ACTIVE_YIELDER.get();
        ACTIVE_YIELDER.set(ptr::null());

        match result {
            CoroutineResult::Yield(reason) => FiberRun::Suspended(reason),
            CoroutineResult::Return(()) => FiberRun::Completed,
        }
    }
}

/// Suspends the fiber currently running on this thread.
///
/// Control returns to the worker loop that resumed the fiber, not to the
/// job's caller; the job continues from here when it is next resumed.
///
/// # Panics
///
/// Panics when called outside of a running job.
pub fn yield_current(reason: YieldReason) {
    let yielder = ACTIVE_YIELDER.get();
    assert!(
        !yielder.is_null(),
        "yield called outside of a running job"
    );
    // SAFETY: a non-null TLS yielder points into the resume frame of the
    // fiber this thread is currently executing.
    unsafe { (*yielder).suspend(reason) };
}

/// Whether the calling code is running inside a fiber.
pub fn is_in_job() -> bool {
    !ACTIVE_YIELDER.get().is_null()
}

/// Test/demo helper owning a fiber together with its backing stack.
#[cfg(test)]
pub(crate) struct StackedFiber {
    // Field order matters: the fiber must drop before the stack it runs on.
    pub fiber: Fiber,
    _stack: Box<DefaultStack>,
}

#[cfg(test)]
impl StackedFiber {
    pub fn new(entry: JobEntry) -> StackedFiber {
        let mut stack = Box::new(DefaultStack::new(64 * 1024).expect("stack allocation"));
        // SAFETY: `stack` is heap-pinned in this struct and outlives `fiber`
        // by field order.
        let stack_ref = unsafe {
            std::mem::transmute::<&mut DefaultStack, &'static mut DefaultStack>(stack.as_mut())
        };
        StackedFiber {
            fiber: Fiber::new(stack_ref, entry, JobOrigin::caller()),
            _stack: stack,
        }
    }
}
