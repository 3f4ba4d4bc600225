//! The scheduler core.
//!
//! A [`JobSystem`] owns three priority queues, a pool of job stacks, a pool of
//! suspended-job records, the live dependency-counter table and the global
//! ready-to-resume list, each behind its own spinlock. Worker threads (see
//! [`crate::worker`]) pull from these in strict order; ready-to-resume work
//! first, then high, then medium; while a separate async pool drains only the
//! low queue.
//!
//! Capacities are fixed at initialization. Every capacity violation (full
//! queue, exhausted pool, missing counter) is a fatal assertion: in the
//! environments this scheduler targets, such conditions are sizing bugs, not
//! transient states to back off and retry.

use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use corosensei::stack::DefaultStack;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::allocator::{Arena, Pool};
use crate::context::{self, Context, CONTEXT_HEADER_SIZE};
use crate::fiber::{self, Fiber, FiberRun, YieldReason};
use crate::job::{JobDesc, JobHandle, JobOrigin, JobPriority};
use crate::ring::RingQueue;
use crate::sync::{SpinLock, ThreadSignal};
use crate::table::HashTable;
use crate::worker;

/// Default execution stack size per job. Generous because some job bodies
/// (notably graphics API calls) eat stack far faster than expected.
pub const DEFAULT_STACK_SIZE: usize = 128 * 1024;
/// Default scratch arena size per job stack.
pub const DEFAULT_SCRATCH_SIZE: usize = 16 * 1024;

/// Allocation-time parameters of a job system. All capacities are fixed once
/// the system is built.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemDesc {
    /// Threads serving the ready list plus the high and medium queues.
    pub worker_threads: usize,
    /// Threads serving only the low queue; jobs there must never suspend.
    pub async_threads: usize,
    /// Capacity of each priority queue, in jobs.
    pub queue_capacity: usize,
    /// Jobs that may concurrently hold an execution stack (running plus
    /// suspended); sizes both slab pools.
    pub max_in_flight: usize,
    /// Execution stack bytes per job.
    pub stack_size: usize,
    /// Scratch arena bytes per job stack.
    pub scratch_size: usize,
    /// Pin worker threads linearly to cores.
    pub pin_workers: bool,
}

impl Default for SystemDesc {
    fn default() -> Self {
        SystemDesc {
            worker_threads: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            async_threads: 1,
            queue_capacity: 1024,
            max_in_flight: 128,
            stack_size: DEFAULT_STACK_SIZE,
            scratch_size: DEFAULT_SCRATCH_SIZE,
            pin_workers: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to allocate a job stack: {0}")]
    StackAllocation(#[source] std::io::Error),
    #[error("failed to spawn {name}: {source}")]
    WorkerSpawn {
        name: String,
        source: std::io::Error,
    },
    #[error("{count} worker thread(s) panicked")]
    WorkerPanic { count: usize },
}

/// Execution stack plus dedicated scratch memory, bound to one job for its
/// entire lifetime and recycled through the stack pool on completion.
pub(crate) struct JobStack {
    stack: DefaultStack,
    scratch: Box<[u8]>,
}

// SAFETY: the stack is a private page-backed allocation and the scratch
// buffer is owned; a JobStack only changes threads through the pool protocol,
// never while a fiber is running on it.
unsafe impl Send for JobStack {}

impl JobStack {
    fn new(stack_size: usize, scratch_size: usize) -> Result<JobStack, std::io::Error> {
        Ok(JobStack {
            stack: DefaultStack::new(stack_size)?,
            scratch: vec![0u8; scratch_size].into_boxed_slice(),
        })
    }
}

/// A suspended job: everything needed to resume it on any worker thread.
///
/// Slots are pool-owned and reused; the `Option` fields distinguish a vacant
/// slot from a parked job. A parked job lives in exactly one intrusive list
/// at a time: a counter's waiting list or the global ready list.
pub(crate) struct WorkingJob {
    completion: JobHandle,
    origin: JobOrigin,
    fiber: Option<Fiber>,
    stack: Option<NonNull<JobStack>>,
    ctx: Option<Context>,
    next: Option<NonNull<WorkingJob>>,
}

// SAFETY: the pointers target pool-owned slots whose lifetime strictly
// contains every node's; a slot has exactly one logical owner at a time
// (scheduler protocol), so nodes may migrate between threads.
unsafe impl Send for WorkingJob {}

impl WorkingJob {
    fn vacant() -> WorkingJob {
        WorkingJob {
            completion: JobHandle::INVALID,
            origin: JobOrigin::caller(),
            fiber: None,
            stack: None,
            ctx: None,
            next: None,
        }
    }
}

/// Intrusive FIFO list threaded through pooled [`WorkingJob`]s.
#[derive(Default)]
pub(crate) struct WorkingJobList {
    head: Option<NonNull<WorkingJob>>,
    tail: Option<NonNull<WorkingJob>>,
}

// SAFETY: see WorkingJob.
unsafe impl Send for WorkingJobList {}

impl WorkingJobList {
    fn push_back(&mut self, job: NonNull<WorkingJob>) {
        // SAFETY: the caller owns `job`; list membership is exclusive.
        unsafe {
            debug_assert!(job.as_ref().next.is_none(), "job is already linked");
        }
        match self.tail {
            None => {
                self.head = Some(job);
                self.tail = Some(job);
            }
            Some(mut tail) => {
                // SAFETY: the tail node is owned by this list.
                unsafe { tail.as_mut().next = Some(job) };
                self.tail = Some(job);
            }
        }
    }

    /// Splices `other` onto this list's tail in one step.
    fn append(&mut self, other: WorkingJobList) {
        let Some(other_head) = other.head else { return };
        match self.tail {
            None => *self = other,
            Some(mut tail) => {
                // SAFETY: as in push_back.
                unsafe { tail.as_mut().next = Some(other_head) };
                self.tail = other.tail;
            }
        }
    }

    fn pop_front(&mut self) -> Option<NonNull<WorkingJob>> {
        let mut head = self.head?;
        // SAFETY: the head node is owned by this list until unlinked here.
        unsafe {
            self.head = head.as_ref().next;
            if self.head.is_none() {
                self.tail = None;
            }
            head.as_mut().next = None;
        }
        Some(head)
    }

    fn take(&mut self) -> WorkingJobList {
        mem::take(self)
    }

    fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Tracks how many jobs of one submitted batch remain incomplete.
///
/// Invariant: a counter is present in the table iff its value is above zero;
/// `is_complete` is just a table lookup.
struct JobCounter {
    value: AtomicU64,
    waiting: WorkingJobList,
    signal: Option<Arc<ThreadSignal>>,
}

/// Work handed to a worker loop.
pub(crate) enum Work {
    Launch(JobDesc),
    Resume(NonNull<WorkingJob>),
}

/// The priority-based fiber job scheduler.
///
/// Built once with fixed capacities; submission is non-blocking; jobs may
/// suspend on other jobs' completion handles without occupying a worker
/// thread. See the crate docs for an example.
pub struct JobSystem {
    desc: SystemDesc,

    high: SpinLock<RingQueue<JobDesc>>,
    medium: SpinLock<RingQueue<JobDesc>>,
    low: SpinLock<RingQueue<JobDesc>>,

    ready: SpinLock<WorkingJobList>,
    counters: SpinLock<HashTable<JobHandle, JobCounter>>,

    // Field order is drop order: working jobs hold fibers that unwind over
    // stacks owned by the stack pool, so `working` must precede `stacks`.
    working: SpinLock<Pool<WorkingJob>>,
    stacks: SpinLock<Pool<JobStack>>,

    next_handle: AtomicU64,
    should_exit: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobSystem {
    /// Builds the scheduler and spawns its worker threads.
    pub fn new(desc: SystemDesc) -> Result<Arc<JobSystem>, Error> {
        Self::validate(&desc)?;

        let stacks = (0..desc.max_in_flight)
            .map(|_| JobStack::new(desc.stack_size, desc.scratch_size))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::StackAllocation)?;
        let working = (0..desc.max_in_flight).map(|_| WorkingJob::vacant()).collect();

        // Every live counter names at least one incomplete job, and every
        // incomplete job is either queued or holding a stack, which bounds
        // the number of live counters.
        let counter_capacity = 3 * desc.queue_capacity + desc.max_in_flight;

        let system = Arc::new(JobSystem {
            high: SpinLock::new(RingQueue::with_capacity(desc.queue_capacity)),
            medium: SpinLock::new(RingQueue::with_capacity(desc.queue_capacity)),
            low: SpinLock::new(RingQueue::with_capacity(desc.queue_capacity)),
            ready: SpinLock::new(WorkingJobList::default()),
            counters: SpinLock::new(HashTable::with_capacity(counter_capacity)),
            working: SpinLock::new(Pool::new(working)),
            stacks: SpinLock::new(Pool::new(stacks)),
            next_handle: AtomicU64::new(1),
            should_exit: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            desc,
        });

        let mut handles = Vec::new();
        for i in 0..system.desc.worker_threads {
            let sys = system.clone();
            let name = format!("weft-worker-{}", i);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker::worker_loop(sys, i))
                .map_err(|source| Error::WorkerSpawn { name, source })?;
            handles.push(handle);
        }
        for i in 0..system.desc.async_threads {
            let sys = system.clone();
            let name = format!("weft-async-{}", i);
            let pin_index = system.desc.worker_threads + i;
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker::async_worker_loop(sys, i, pin_index))
                .map_err(|source| Error::WorkerSpawn { name, source })?;
            handles.push(handle);
        }
        *system.workers.lock().unwrap() = handles;

        debug!(
            workers = system.desc.worker_threads,
            async_workers = system.desc.async_threads,
            "job system started"
        );
        Ok(system)
    }

    fn validate(desc: &SystemDesc) -> Result<(), Error> {
        let fail = |msg: &str| Err(Error::Config(msg.to_string()));
        if desc.worker_threads == 0 {
            return fail("worker_threads must be at least 1");
        }
        if desc.async_threads == 0 {
            return fail("async_threads must be at least 1, or low-priority jobs would never run");
        }
        if desc.queue_capacity == 0 {
            return fail("queue_capacity must be at least 1");
        }
        if desc.max_in_flight == 0 {
            return fail("max_in_flight must be at least 1");
        }
        if desc.stack_size < 4096 {
            return fail("stack_size below one page is not usable");
        }
        if desc.scratch_size <= CONTEXT_HEADER_SIZE {
            return fail("scratch_size does not fit the context header");
        }
        Ok(())
    }

    /// The scheduler bound to the calling worker thread.
    ///
    /// This is the one "current scheduler" convenience accessor for job
    /// bodies; everywhere else the system handle is threaded explicitly.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread the scheduler does not own.
    pub fn current() -> Arc<JobSystem> {
        worker::current_system()
            .expect("JobSystem::current() is only available inside a running job")
    }

    pub fn desc(&self) -> &SystemDesc {
        &self.desc
    }

    /// Submits a single closure. Non-blocking; returns the batch handle.
    #[track_caller]
    pub fn run<F>(&self, priority: JobPriority, f: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(priority, vec![JobDesc::new(f)], None)
    }

    /// Submits a batch of 1..N descriptors under one shared completion
    /// counter. Non-blocking; the returned handle completes when all N jobs
    /// have finished.
    pub fn run_batch(&self, priority: JobPriority, descs: Vec<JobDesc>) -> JobHandle {
        self.submit(priority, descs, None)
    }

    /// Submits a single closure and blocks the calling OS thread (not a job)
    /// until it completes.
    #[track_caller]
    pub fn run_blocking<F>(&self, priority: JobPriority, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_batch_blocking(priority, vec![JobDesc::new(f)]);
    }

    /// Submits a batch and blocks the calling OS thread until the batch's
    /// counter reaches zero, via the counter's cross-thread signal.
    pub fn run_batch_blocking(&self, priority: JobPriority, descs: Vec<JobDesc>) {
        let signal = Arc::new(ThreadSignal::new());
        self.submit(priority, descs, Some(signal.clone()));
        signal.wait();
    }

    fn submit(
        &self,
        priority: JobPriority,
        descs: Vec<JobDesc>,
        signal: Option<Arc<ThreadSignal>>,
    ) -> JobHandle {
        assert!(!descs.is_empty(), "submitted an empty job batch");

        let handle = JobHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        {
            let mut counters = self.counters.lock();
            counters.insert(
                handle,
                JobCounter {
                    value: AtomicU64::new(descs.len() as u64),
                    waiting: WorkingJobList::default(),
                    signal,
                },
            );
        }

        trace!(
            handle = handle.raw(),
            count = descs.len(),
            ?priority,
            "submitted batch"
        );

        let mut queue = self.queue(priority).lock();
        for mut desc in descs {
            desc.completion = handle;
            queue.push(desc);
        }
        handle
    }

    /// Whether the counter named by `handle` has reached zero. O(1); true
    /// for handles that were never issued.
    pub fn is_complete(&self, handle: JobHandle) -> bool {
        !self.counters.lock().contains(&handle)
    }

    /// Suspends the calling job until `handle` completes, without occupying
    /// the hosting worker thread.
    ///
    /// Fast path: a handle that is already complete returns immediately,
    /// without the job ever touching a waiting list.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a running job.
    pub fn yield_to(&self, handle: JobHandle) {
        assert!(
            fiber::is_in_job(),
            "yield_to must be called from inside a running job"
        );
        if self.is_complete(handle) {
            return;
        }
        fiber::yield_current(YieldReason::WaitForCounter(handle));
    }

    /// Submits `f` at low priority (the async pool) and suspends the calling
    /// job until it finishes.
    #[track_caller]
    pub fn yield_async<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.run(JobPriority::Low, f);
        self.yield_to(handle);
    }

    /// Blocks the calling OS thread until `handle` completes, with an
    /// exponential-backoff sleep poll. For callers that hold a handle but
    /// did not submit through the blocking path.
    pub fn wait_for(&self, handle: JobHandle) {
        let mut backoff_us = 1u64;
        const MAX_BACKOFF_US: u64 = 1000;

        while !self.is_complete(handle) {
            thread::sleep(Duration::from_micros(backoff_us));
            backoff_us = (backoff_us * 2).min(MAX_BACKOFF_US);
        }
    }

    /// Asks every worker loop to exit once it finds no more queued work.
    /// Call [`join`](JobSystem::join) afterwards.
    pub fn shutdown(&self) {
        debug!("shutdown requested");
        self.should_exit.store(true, Ordering::Relaxed);
    }

    /// Joins all worker threads, reporting how many panicked.
    pub fn join(&self) -> Result<(), Error> {
        let handles = mem::take(&mut *self.workers.lock().unwrap());
        let mut panicked = 0;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            Err(Error::WorkerPanic { count: panicked })
        } else {
            Ok(())
        }
    }

    pub(crate) fn should_exit(&self) -> bool {
        self.should_exit.load(Ordering::Relaxed)
    }

    fn queue(&self, priority: JobPriority) -> &SpinLock<RingQueue<JobDesc>> {
        match priority {
            JobPriority::High => &self.high,
            JobPriority::Medium => &self.medium,
            JobPriority::Low => &self.low,
        }
    }

    /// One dequeue attempt in strict order: ready-to-resume work always
    /// outranks fresh launches, high outranks medium.
    pub(crate) fn next_work(&self) -> Option<Work> {
        if let Some(job) = self.ready.lock().pop_front() {
            return Some(Work::Resume(job));
        }
        if let Some(desc) = self.high.lock().try_pop() {
            return Some(Work::Launch(desc));
        }
        if let Some(desc) = self.medium.lock().try_pop() {
            return Some(Work::Launch(desc));
        }
        None
    }

    /// One dequeue attempt for the async pool, which sees only the low
    /// queue.
    pub(crate) fn next_async_work(&self) -> Option<JobDesc> {
        self.low.lock().try_pop()
    }

    /// Runs a fresh descriptor on a pooled stack.
    pub(crate) fn launch_job(&self, desc: JobDesc, can_yield: bool) {
        let completion = desc.completion;
        let origin = desc.origin;

        let stack_ptr = self.stacks.lock().acquire();
        // SAFETY: the slot is exclusively ours from acquire to release.
        let job_stack = unsafe { &mut *stack_ptr.as_ptr() };

        // SAFETY: the scratch region lives inside the pooled JobStack, which
        // stays put for the whole job lifetime.
        let scratch =
            unsafe { Arena::from_raw(job_stack.scratch.as_mut_ptr(), job_stack.scratch.len()) };
        let ctx = Context::init(scratch);

        // SAFETY: 'static is a promise, not a fact; the fiber is always
        // dropped before the stack goes back to the pool.
        let stack_ref = unsafe {
            mem::transmute::<&mut DefaultStack, &'static mut DefaultStack>(&mut job_stack.stack)
        };
        let mut fiber = Fiber::new(stack_ref, desc.entry, origin);

        trace!(handle = completion.raw(), "launching job");
        context::push_context(ctx);
        let run = fiber.resume();
        let ctx = context::pop_context();

        match run {
            FiberRun::Completed => {
                drop(fiber);
                self.stacks.lock().release(stack_ptr);
                self.signal_counter(completion);
            }
            FiberRun::Suspended(reason) => {
                assert!(
                    can_yield,
                    "low-priority job submitted at {} suspended on an async worker",
                    origin
                );

                let job_ptr = self.working.lock().acquire();
                // SAFETY: the slot is exclusively ours until released.
                let job = unsafe { &mut *job_ptr.as_ptr() };
                debug_assert!(job.fiber.is_none(), "acquired an occupied working job slot");
                job.completion = completion;
                job.origin = origin;
                job.fiber = Some(fiber);
                job.stack = Some(stack_ptr);
                job.ctx = Some(ctx);
                job.next = None;
                self.park(job_ptr, reason);
            }
        }
    }

    /// Re-enters a previously suspended job.
    pub(crate) fn resume_working_job(&self, job_ptr: NonNull<WorkingJob>) {
        // SAFETY: a job popped from the ready list has exactly one owner.
        let job = unsafe { &mut *job_ptr.as_ptr() };

        let ctx = job.ctx.take().expect("resumed a vacant working job");
        trace!(handle = job.completion.raw(), "resuming job");
        context::push_context(ctx);
        let run = job
            .fiber
            .as_mut()
            .expect("resumed a working job with no fiber")
            .resume();
        let ctx = context::pop_context();

        match run {
            FiberRun::Completed => {
                let completion = job.completion;
                let stack_ptr = job.stack.take().expect("working job lost its stack");
                // The fiber must die before its stack can be recycled.
                job.fiber = None;
                self.working.lock().release(job_ptr);
                self.stacks.lock().release(stack_ptr);
                self.signal_counter(completion);
            }
            FiberRun::Suspended(reason) => {
                job.ctx = Some(ctx);
                job.next = None;
                self.park(job_ptr, reason);
            }
        }
    }

    /// Parks a suspended job according to its yield reason.
    fn park(&self, job_ptr: NonNull<WorkingJob>, reason: YieldReason) {
        match reason {
            YieldReason::WaitForCounter(handle) => {
                let parked = {
                    let mut counters = self.counters.lock();
                    match counters.find_mut(&handle) {
                        Some(counter) => {
                            counter.waiting.push_back(job_ptr);
                            true
                        }
                        // The dependency completed between the yield and
                        // here; the job is immediately ready again.
                        None => false,
                    }
                };
                if !parked {
                    self.ready.lock().push_back(job_ptr);
                }
                trace!(handle = handle.raw(), parked, "parked job");
            }
        }
    }

    /// Records one job completion against `handle`'s counter. At zero the
    /// counter dies: its waiting list moves to the ready list and any
    /// blocked OS thread is signaled.
    fn signal_counter(&self, handle: JobHandle) {
        let finished = {
            let mut counters = self.counters.lock();
            let counter = counters
                .find_mut(&handle)
                .expect("signaled a job counter that is not live");
            let prev = counter.value.fetch_sub(1, Ordering::AcqRel);
            assert!(prev > 0, "job counter underflow");
            if prev == 1 {
                let waiting = counter.waiting.take();
                let signal = counter.signal.take();
                counters.erase(&handle);
                Some((waiting, signal))
            } else {
                None
            }
        };

        if let Some((waiting, signal)) = finished {
            trace!(handle = handle.raw(), "counter reached zero");
            if let Some(signal) = signal {
                signal.notify_all();
            }
            if !waiting.is_empty() {
                self.ready.lock().append(waiting);
            }
        }
    }
}

/// Suspends the calling job until `handle` completes. Shorthand for
/// [`JobSystem::yield_to`] through the current scheduler.
pub fn yield_to(handle: JobHandle) {
    JobSystem::current().yield_to(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn small_system(workers: usize) -> Arc<JobSystem> {
        JobSystem::new(SystemDesc {
            worker_threads: workers,
            async_threads: 1,
            queue_capacity: 64,
            max_in_flight: 16,
            stack_size: 64 * 1024,
            scratch_size: 4096,
            pin_workers: false,
        })
        .expect("system init")
    }

    #[test]
    fn test_run_executes_job() {
        let system = small_system(2);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();

        let handle = system.run(JobPriority::High, move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        system.wait_for(handle);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(system.is_complete(handle));
        system.shutdown();
        system.join().expect("join");
    }

    #[test]
    fn test_batch_completes_once_all_jobs_finish() {
        let system = small_system(4);
        let hits = Arc::new(AtomicUsize::new(0));

        let descs: Vec<JobDesc> = (0..10)
            .map(|_| {
                let hits = hits.clone();
                JobDesc::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let handle = system.run_batch(JobPriority::Medium, descs);
        system.wait_for(handle);

        assert_eq!(hits.load(Ordering::SeqCst), 10);
        system.shutdown();
        system.join().expect("join");
    }

    #[test]
    fn test_is_complete_for_unknown_handle() {
        let system = small_system(1);
        assert!(system.is_complete(JobHandle(0xDEAD)));
        system.shutdown();
        system.join().expect("join");
    }

    #[test]
    fn test_handles_are_unique_and_increasing() {
        let system = small_system(2);
        let a = system.run(JobPriority::High, || {});
        let b = system.run(JobPriority::High, || {});
        assert!(b.raw() > a.raw());
        system.wait_for(a);
        system.wait_for(b);
        system.shutdown();
        system.join().expect("join");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = JobSystem::new(SystemDesc {
            worker_threads: 0,
            ..SystemDesc::default()
        })
        .err()
        .expect("zero workers must be rejected");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_low_priority_runs_on_async_pool() {
        let system = small_system(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();

        let handle = system.run(JobPriority::Low, move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        system.wait_for(handle);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        system.shutdown();
        system.join().expect("join");
    }
}
