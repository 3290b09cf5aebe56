//! Concurrency Tests for the Access Guard
//!
//! **Mutual exclusion**: at most one write session is active at any instant,
//! and no read session is active while a write session is active.
//!
//! **Upgrade safety**: an elevated action always runs under genuine
//! exclusive access, whether the read permit was converted in place or
//! released and re-acquired. Verified with an occupancy counter that is only
//! touched inside exclusive sections and must never exceed one.

use geodepot_storage::{AccessGuard, Session, SessionMode};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

// ============================================================================
// OCCUPANCY TRACKING
// ============================================================================

/// Counts who is inside a protected section and records every violation.
#[derive(Default)]
struct Occupancy {
    readers: AtomicUsize,
    writers: AtomicUsize,
    violations: AtomicUsize,
    exclusive_runs: AtomicUsize,
}

impl Occupancy {
    fn enter_shared(&self) {
        self.readers.fetch_add(1, Ordering::SeqCst);
        if self.writers.load(Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn leave_shared(&self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }

    fn exclusive(&self, hold: Duration) {
        let writers_before = self.writers.fetch_add(1, Ordering::SeqCst);
        if writers_before != 0 || self.readers.load(Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        if !hold.is_zero() {
            thread::sleep(hold);
        } else {
            thread::yield_now();
        }
        if self.readers.load(Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.exclusive_runs.fetch_add(1, Ordering::SeqCst);
        self.writers.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// MUTUAL EXCLUSION
// ============================================================================

#[test]
fn prop_readers_and_writers_never_overlap() {
    let guard = AccessGuard::default();
    let occupancy = Occupancy::default();
    let threads = 8;
    let rounds = 200;
    let start = Barrier::new(threads);

    thread::scope(|s| {
        for t in 0..threads {
            let (guard, occupancy, start) = (&guard, &occupancy, &start);
            s.spawn(move || {
                start.wait();
                for round in 0..rounds {
                    if (t + round) % 4 == 0 {
                        let _write = guard.open_write().unwrap();
                        occupancy.exclusive(Duration::ZERO);
                    } else {
                        let _read = guard.open_read().unwrap();
                        occupancy.enter_shared();
                        thread::yield_now();
                        occupancy.leave_shared();
                    }
                }
            });
        }
    });

    assert_eq!(occupancy.violations.load(Ordering::SeqCst), 0);
    assert_eq!(occupancy.exclusive_runs.load(Ordering::SeqCst), threads * rounds / 4);
    let idle = guard.snapshot();
    assert_eq!((idle.readers, idle.writer, idle.writers_waiting), (0, false, 0));
}

// ============================================================================
// UPGRADE SAFETY
// ============================================================================

#[test]
fn prop_elevated_actions_never_overlap_across_1000_trials() {
    let guard = AccessGuard::default();
    let occupancy = Occupancy::default();
    let threads = 8;
    let trials_per_thread = 150;
    let start = Barrier::new(threads);

    thread::scope(|s| {
        for t in 0..threads {
            let (guard, occupancy, start) = (&guard, &occupancy, &start);
            s.spawn(move || {
                start.wait();
                for trial in 0..trials_per_thread {
                    if t == 0 && trial % 10 == 0 {
                        // Plain writers compete with the upgraders.
                        let _write = guard.open_write().unwrap();
                        occupancy.exclusive(Duration::ZERO);
                        continue;
                    }

                    let mut read = guard.open_read().unwrap();
                    occupancy.enter_shared();
                    occupancy.leave_shared();

                    read.elevate(|| {
                        let snapshot = guard.snapshot();
                        assert!(snapshot.writer);
                        assert_eq!(snapshot.readers, 0);
                        occupancy.exclusive(Duration::ZERO);
                    })
                    .unwrap();

                    // Back to a shared permit, still valid.
                    assert_eq!(read.mode(), SessionMode::Read);
                    occupancy.enter_shared();
                    occupancy.leave_shared();
                }
            });
        }
    });

    let runs = occupancy.exclusive_runs.load(Ordering::SeqCst);
    assert!(runs >= 1000, "only {runs} exclusive runs");
    assert_eq!(runs, threads * trials_per_thread);
    assert_eq!(occupancy.violations.load(Ordering::SeqCst), 0);
    let idle = guard.snapshot();
    assert_eq!((idle.readers, idle.writer, idle.upgrading), (0, false, false));
}

#[test]
fn test_elevation_with_slow_actions_stays_exclusive() {
    let guard = AccessGuard::default();
    let occupancy = Occupancy::default();
    let threads = 4;
    let start = Barrier::new(threads);

    thread::scope(|s| {
        for _ in 0..threads {
            let (guard, occupancy, start) = (&guard, &occupancy, &start);
            s.spawn(move || {
                let mut read = guard.open_read().unwrap();
                // Every thread holds a read permit before anyone elevates,
                // forcing all but one onto the release-and-reacquire path.
                start.wait();
                read.elevate(|| occupancy.exclusive(Duration::from_millis(5)))
                    .unwrap();
            });
        }
    });

    assert_eq!(occupancy.exclusive_runs.load(Ordering::SeqCst), threads);
    assert_eq!(occupancy.violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_waiting_writer_blocks_new_readers() {
    let guard = AccessGuard::new(Duration::from_secs(5));
    let first = guard.open_read().unwrap();
    let late_reader_in = AtomicBool::new(false);

    thread::scope(|s| {
        let writer = s.spawn(|| {
            let _write = guard.open_write().unwrap();
        });
        while guard.snapshot().writers_waiting == 0 {
            thread::yield_now();
        }

        let reader = s.spawn(|| {
            let _read = guard.open_read().unwrap();
            late_reader_in.store(true, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!late_reader_in.load(Ordering::SeqCst));

        drop(first);
        writer.join().unwrap();
        reader.join().unwrap();
    });

    assert!(late_reader_in.load(Ordering::SeqCst));
    assert_eq!(guard.snapshot().readers, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any mix of readers and writers leaves the guard idle afterwards.
    #[test]
    fn prop_guard_returns_to_idle(plan in prop::collection::vec(any::<bool>(), 1..24)) {
        let guard = AccessGuard::default();
        thread::scope(|s| {
            for write in &plan {
                let guard = &guard;
                let write = *write;
                s.spawn(move || {
                    if write {
                        let mut session = guard.open_write().unwrap();
                        session.elevate(|| ()).unwrap();
                    } else {
                        let mut session = guard.open_read().unwrap();
                        session.elevate(|| ()).unwrap();
                        session.close();
                        session.close();
                    }
                });
            }
        });
        let idle = guard.snapshot();
        prop_assert_eq!(idle.readers, 0);
        prop_assert!(!idle.writer);
        prop_assert!(!idle.upgrading);
        prop_assert_eq!(idle.writers_waiting, 0);
    }
}
