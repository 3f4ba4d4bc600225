//! Integration tests for submission, completion tracking and scheduling
//! order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use weft::{JobDesc, JobPriority, JobSystem, SystemDesc};

fn test_system(workers: usize) -> Arc<JobSystem> {
    JobSystem::new(SystemDesc {
        worker_threads: workers,
        async_threads: 1,
        queue_capacity: 128,
        max_in_flight: 32,
        stack_size: 64 * 1024,
        scratch_size: 8 * 1024,
        pin_workers: false,
    })
    .expect("system init")
}

/// Spin-sleeps until `cond` holds, with a deadline so a broken scheduler
/// fails the test instead of hanging it.
fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..5000 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("condition not reached within deadline");
}

#[test]
fn test_completion_flips_only_at_last_job() {
    let system = test_system(4);

    let gates: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();
    let done: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();

    let descs: Vec<JobDesc> = (0..3)
        .map(|i| {
            let gate = gates[i].clone();
            let done = done[i].clone();
            JobDesc::new(move || {
                while !gate.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(1));
                }
                done.store(true, Ordering::Release);
            })
        })
        .collect();

    let handle = system.run_batch(JobPriority::High, descs);
    assert!(!system.is_complete(handle));

    // Release the first two jobs; the batch must stay incomplete while the
    // third is still gated.
    for i in 0..2 {
        gates[i].store(true, Ordering::Release);
        wait_until(|| done[i].load(Ordering::Acquire));
        assert!(
            !system.is_complete(handle),
            "batch reported complete after {} of 3 jobs",
            i + 1
        );
    }

    gates[2].store(true, Ordering::Release);
    system.wait_for(handle);
    assert!(system.is_complete(handle));
    assert!(done.iter().all(|d| d.load(Ordering::Acquire)));

    system.shutdown();
    system.join().expect("join");
}

#[test]
fn test_fifo_within_one_priority() {
    let system = test_system(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    // Occupy the single worker so the submissions below all queue up first.
    let gate = Arc::new(AtomicBool::new(false));
    let gate_clone = gate.clone();
    let blocker = system.run(JobPriority::High, move || {
        while !gate_clone.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    });

    let mut handles = Vec::new();
    for i in 0..5 {
        let order = order.clone();
        handles.push(system.run(JobPriority::Medium, move || {
            order.lock().unwrap().push(i);
        }));
    }

    gate.store(true, Ordering::Release);
    for handle in handles {
        system.wait_for(handle);
    }
    system.wait_for(blocker);

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    system.shutdown();
    system.join().expect("join");
}

#[test]
fn test_high_runs_before_medium() {
    let system = test_system(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let gate = Arc::new(AtomicBool::new(false));
    let gate_clone = gate.clone();
    let blocker = system.run(JobPriority::High, move || {
        while !gate_clone.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    });

    let order_medium = order.clone();
    let medium = system.run(JobPriority::Medium, move || {
        order_medium.lock().unwrap().push("medium");
    });
    let order_high = order.clone();
    let high = system.run(JobPriority::High, move || {
        order_high.lock().unwrap().push("high");
    });

    gate.store(true, Ordering::Release);
    system.wait_for(high);
    system.wait_for(medium);
    system.wait_for(blocker);

    assert_eq!(*order.lock().unwrap(), vec!["high", "medium"]);
    system.shutdown();
    system.join().expect("join");
}

#[test]
fn test_dependent_job_parks_and_resumes() {
    // The full dependency scenario on a single worker: jobs A, B, C share
    // handle H; A suspends on H2 (one gated medium job). H must stay
    // incomplete while A is parked and complete only after A resumes.
    let system = test_system(1);

    let gate = Arc::new(AtomicBool::new(false));
    let gate_clone = gate.clone();
    let h2 = system.run(JobPriority::Medium, move || {
        while !gate_clone.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    });

    let a_started = Arc::new(AtomicBool::new(false));
    let a_done = Arc::new(AtomicBool::new(false));
    let bc_done = Arc::new(AtomicUsize::new(0));

    let a_started_clone = a_started.clone();
    let a_done_clone = a_done.clone();
    let job_a = JobDesc::new(move || {
        a_started_clone.store(true, Ordering::Release);
        weft::yield_to(h2);
        a_done_clone.store(true, Ordering::Release);
    });
    let bc: Vec<JobDesc> = (0..2)
        .map(|_| {
            let bc_done = bc_done.clone();
            JobDesc::new(move || {
                bc_done.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let mut descs = vec![job_a];
    descs.extend(bc);
    let h = system.run_batch(JobPriority::High, descs);

    wait_until(|| a_started.load(Ordering::Acquire));
    wait_until(|| bc_done.load(Ordering::SeqCst) == 2);

    // B and C are done but A is parked on H2.
    assert!(!a_done.load(Ordering::Acquire));
    assert!(!system.is_complete(h));
    assert!(!system.is_complete(h2));

    gate.store(true, Ordering::Release);
    system.wait_for(h);

    assert!(a_done.load(Ordering::Acquire));
    assert!(system.is_complete(h));
    assert!(system.is_complete(h2));

    system.shutdown();
    system.join().expect("join");
}

#[test]
fn test_nested_fork_join_via_current() {
    // A job splits itself into children through the current-scheduler
    // accessor and joins them with yield_to, all on one worker.
    let system = test_system(1);

    let child_hits = Arc::new(AtomicUsize::new(0));
    let parent_done = Arc::new(AtomicBool::new(false));

    let child_hits_clone = child_hits.clone();
    let parent_done_clone = parent_done.clone();
    let parent = system.run(JobPriority::High, move || {
        let system = JobSystem::current();

        let descs: Vec<JobDesc> = (0..3)
            .map(|_| {
                let hits = child_hits_clone.clone();
                JobDesc::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        let children = system.run_batch(JobPriority::High, descs);

        system.yield_to(children);
        assert_eq!(child_hits_clone.load(Ordering::SeqCst), 3);
        parent_done_clone.store(true, Ordering::Release);
    });

    system.wait_for(parent);
    assert!(parent_done.load(Ordering::Acquire));
    assert_eq!(child_hits.load(Ordering::SeqCst), 3);

    system.shutdown();
    system.join().expect("join");
}

#[test]
fn test_many_jobs_through_small_pools() {
    // Far more jobs than stacks; completion recycling must keep up.
    let system = JobSystem::new(SystemDesc {
        worker_threads: 4,
        async_threads: 1,
        queue_capacity: 1024,
        max_in_flight: 32,
        stack_size: 64 * 1024,
        scratch_size: 8 * 1024,
        pin_workers: false,
    })
    .expect("system init");
    let hits = Arc::new(AtomicUsize::new(0));

    let descs: Vec<JobDesc> = (0..500)
        .map(|_| {
            let hits = hits.clone();
            JobDesc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let handle = system.run_batch(JobPriority::Medium, descs);
    system.wait_for(handle);
    assert_eq!(hits.load(Ordering::SeqCst), 500);

    system.shutdown();
    system.join().expect("join");
}
