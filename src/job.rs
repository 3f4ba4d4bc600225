//! Job descriptors and the types that name them.
//!
//! A job is a closure captured into a fixed-size inline payload (no heap
//! allocation on the submission path) plus the handle of the completion
//! counter it decrements and the source location that submitted it.

use std::fmt;
use std::mem::{self, MaybeUninit};
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// Maximum size of a job closure's captured state in bytes.
pub const JOB_PAYLOAD_SIZE: usize = 256;
/// Maximum alignment of a job closure's captured state.
pub const JOB_PAYLOAD_ALIGN: usize = 16;

/// Opaque name of one live job counter.
///
/// Handles are process-wide, monotonically increasing and never reused while
/// the counter they name is alive. The zero handle never names a counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobHandle(pub(crate) u64);

impl JobHandle {
    /// The handle of a descriptor that has not been submitted yet.
    pub const INVALID: JobHandle = JobHandle(0);

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Submission priority. High and medium feed the main worker pool (high is
/// always drained first); low feeds the async pool and must never suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPriority {
    High,
    Medium,
    Low,
}

/// Source location a job was created at, carried for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct JobOrigin {
    location: &'static Location<'static>,
}

impl JobOrigin {
    #[track_caller]
    pub fn caller() -> JobOrigin {
        JobOrigin {
            location: Location::caller(),
        }
    }
}

impl fmt::Display for JobOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.location.file(), self.location.line())
    }
}

#[repr(align(16))]
struct Payload([MaybeUninit<u8>; JOB_PAYLOAD_SIZE]);

/// A job's entry point: a closure stored inline in a fixed-size buffer.
///
/// The closure's captured state must fit [`JOB_PAYLOAD_SIZE`] bytes at
/// [`JOB_PAYLOAD_ALIGN`] alignment; both are checked at compile time. The
/// entry is invoked at most once; an entry dropped without being invoked
/// (for example a descriptor still queued at teardown) drops its captures.
pub struct JobEntry {
    invoke_fn: unsafe fn(*mut u8),
    drop_fn: unsafe fn(*mut u8),
    payload: Payload,
    taken: bool,
}

// SAFETY: construction requires the captured closure to be Send, and the
// payload bytes are just that closure.
unsafe impl Send for JobEntry {}

unsafe fn invoke_closure<F: FnOnce()>(payload: *mut u8) {
    // SAFETY: the payload holds a live F written by from_closure; read moves
    // it out so it is consumed exactly once.
    let f = (payload as *mut F).read();
    f();
}

unsafe fn drop_closure<F>(payload: *mut u8) {
    (payload as *mut F).drop_in_place();
}

impl JobEntry {
    pub fn from_closure<F>(f: F) -> JobEntry
    where
        F: FnOnce() + Send + 'static,
    {
        const {
            assert!(
                mem::size_of::<F>() <= JOB_PAYLOAD_SIZE,
                "job closure captures exceed the inline payload size"
            );
            assert!(
                mem::align_of::<F>() <= JOB_PAYLOAD_ALIGN,
                "job closure captures exceed the inline payload alignment"
            );
        }

        let mut payload = Payload([MaybeUninit::uninit(); JOB_PAYLOAD_SIZE]);
        // SAFETY: the payload is large and aligned enough per the asserts
        // above.
        unsafe { (payload.0.as_mut_ptr() as *mut F).write(f) };

        JobEntry {
            invoke_fn: invoke_closure::<F>,
            drop_fn: drop_closure::<F>,
            payload,
            taken: false,
        }
    }

    /// Runs the captured closure, consuming the entry.
    pub(crate) fn invoke(mut self) {
        self.taken = true;
        // SAFETY: `taken` guarantees the payload is read exactly once; the
        // Drop impl skips taken entries.
        unsafe { (self.invoke_fn)(self.payload.0.as_mut_ptr() as *mut u8) };
    }
}

impl Drop for JobEntry {
    fn drop(&mut self) {
        if !self.taken {
            // SAFETY: the closure was never moved out.
            unsafe { (self.drop_fn)(self.payload.0.as_mut_ptr() as *mut u8) };
        }
    }
}

/// One schedulable unit of work.
///
/// Immutable once enqueued, except that submission stamps the completion
/// handle of the batch's shared counter.
pub struct JobDesc {
    pub(crate) entry: JobEntry,
    pub(crate) completion: JobHandle,
    pub(crate) origin: JobOrigin,
}

impl JobDesc {
    /// Captures `f` as a job. The caller's source location is recorded for
    /// diagnostics.
    #[track_caller]
    pub fn new<F>(f: F) -> JobDesc
    where
        F: FnOnce() + Send + 'static,
    {
        JobDesc {
            entry: JobEntry::from_closure(f),
            completion: JobHandle::INVALID,
            origin: JobOrigin::caller(),
        }
    }

    /// Handle of the batch this job belongs to; [`JobHandle::INVALID`] until
    /// submission.
    pub fn completion(&self) -> JobHandle {
        self.completion
    }

    pub fn origin(&self) -> JobOrigin {
        self.origin
    }
}
