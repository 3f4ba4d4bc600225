//! Worker thread loops.
//!
//! Normal workers serve the ready-to-resume list first, then the high and
//! medium queues. A smaller pool of async workers drains only the low queue
//! for fire-and-forget background work; jobs launched there must never
//! suspend, so the main scheduling pool is never starved by them.
//!
//! Each worker installs a base scratch context for its thread, optionally
//! pins itself to a core, and idles with an exponential backoff when no work
//! is available. A worker exits once the shutdown flag is set and it finds no
//! more queued work.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use crossbeam_utils::Backoff;
use tracing::debug;

use crate::allocator::OwnedArena;
use crate::context::Context;
use crate::job_system::{JobSystem, Work};

thread_local! {
    /// The scheduler this worker thread belongs to. Backs
    /// [`JobSystem::current`] for job bodies.
    static TLS_SYSTEM: RefCell<Weak<JobSystem>> = RefCell::new(Weak::new());
}

pub(crate) fn current_system() -> Option<Arc<JobSystem>> {
    TLS_SYSTEM.with(|slot| slot.borrow().upgrade())
}

fn bind_current(system: &Arc<JobSystem>) {
    TLS_SYSTEM.with(|slot| *slot.borrow_mut() = Arc::downgrade(system));
}

fn maybe_pin(system: &JobSystem, index: usize) {
    if !system.desc().pin_workers {
        return;
    }
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if index < core_ids.len() {
            core_affinity::set_for_current(core_ids[index]);
        }
    }
}

fn execute(system: &JobSystem, worker_id: usize, work: Work) {
    #[cfg(not(feature = "profile"))]
    let _ = worker_id;
    match work {
        Work::Resume(job) => {
            #[cfg(feature = "profile")]
            let _span = crate::profile::SpanGuard::new("resume", worker_id);
            system.resume_working_job(job);
        }
        Work::Launch(desc) => {
            #[cfg(feature = "profile")]
            let _span = crate::profile::SpanGuard::new("launch", worker_id);
            system.launch_job(desc, true);
        }
    }
}

pub(crate) fn worker_loop(system: Arc<JobSystem>, id: usize) {
    bind_current(&system);
    maybe_pin(&system, id);

    // The thread's base scratch context; job contexts push over it.
    let scratch = OwnedArena::with_capacity(system.desc().scratch_size);
    let _base = Context::init(scratch.view());

    debug!(worker = id, "worker started");
    #[cfg(feature = "profile")]
    let _collector = crate::profile::CollectorGuard;

    let backoff = Backoff::new();
    loop {
        if let Some(work) = system.next_work() {
            execute(&system, id, work);
            backoff.reset();
            continue;
        }
        if system.should_exit() {
            // The flag can rise between a queue check and here; one recheck
            // after observing it keeps work that was submitted before
            // shutdown from being abandoned.
            match system.next_work() {
                Some(work) => {
                    execute(&system, id, work);
                    backoff.reset();
                }
                None => break,
            }
        } else {
            backoff.snooze();
        }
    }

    debug!(worker = id, "worker exiting");
}

pub(crate) fn async_worker_loop(system: Arc<JobSystem>, id: usize, pin_index: usize) {
    bind_current(&system);
    maybe_pin(&system, pin_index);

    let scratch = OwnedArena::with_capacity(system.desc().scratch_size);
    let _base = Context::init(scratch.view());

    debug!(worker = id, "async worker started");
    #[cfg(feature = "profile")]
    let _collector = crate::profile::CollectorGuard;

    // Async workers host fire-and-forget work only; launch_job asserts that
    // nothing launched here ever suspends.
    let launch = |desc| {
        #[cfg(feature = "profile")]
        let _span = crate::profile::SpanGuard::new("async", id);
        system.launch_job(desc, false);
    };

    let backoff = Backoff::new();
    loop {
        if let Some(desc) = system.next_async_work() {
            launch(desc);
            backoff.reset();
            continue;
        }
        if system.should_exit() {
            match system.next_async_work() {
                Some(desc) => {
                    launch(desc);
                    backoff.reset();
                }
                None => break,
            }
        } else {
            backoff.snooze();
        }
    }

    debug!(worker = id, "async worker exiting");
}
