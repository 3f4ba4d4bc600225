//! # Weft - Priority-Based Fiber Job Scheduler
//!
//! A user-space job scheduler that multiplexes many small, cooperatively
//! scheduled jobs across a fixed pool of OS worker threads. Producers submit
//! batches of jobs without blocking and receive a handle to a shared
//! completion counter; any job can suspend mid-execution waiting on another
//! handle, without consuming a worker thread while it waits.
//!
//! ## Architecture
//!
//! - **Fibers**: independently resumable execution contexts; a suspended job
//!   is a dormant call stack, resumable on any worker thread
//! - **Priority queues**: three bounded ring queues (high/medium/low), FIFO
//!   within a priority, strictly ordered across priorities
//! - **Counters**: per-batch completion counters in a fixed-capacity hash
//!   table; reaching zero is the scheduler's sole dependency signal
//! - **Pools**: fixed slabs for execution stacks and suspended-job records;
//!   nothing is heap-allocated on the scheduling hot path
//! - **Workers**: a main pool serving resumable and high/medium work, plus a
//!   small async pool that drains only the low queue and never hosts
//!   suspension
//!
//! ## Example
//!
//! ```no_run
//! use weft::{JobPriority, JobSystem, SystemDesc};
//!
//! let system = JobSystem::new(SystemDesc::default()).unwrap();
//!
//! let handle = system.run(JobPriority::High, || {
//!     println!("Hello from a fiber job!");
//! });
//! system.wait_for(handle);
//!
//! system.shutdown();
//! system.join().unwrap();
//! ```

pub mod allocator;
pub mod context;
pub mod fiber;
pub mod job;
pub mod job_system;
pub mod ring;
pub mod sync;
pub mod table;

mod worker;

#[cfg(feature = "profile")]
pub mod profile;

pub use job::{JobDesc, JobHandle, JobPriority, JOB_PAYLOAD_ALIGN, JOB_PAYLOAD_SIZE};
pub use job_system::{yield_to, Error, JobSystem, SystemDesc};
