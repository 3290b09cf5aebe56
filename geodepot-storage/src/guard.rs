//! Reader/writer access protocol for a provider's resource set.
//!
//! [`AccessGuard`] hands out scoped permits: any number of [`ReadSession`]s
//! or exactly one [`WriteSession`]. Acquisition is bounded by a timeout and
//! fails with [`AccessError::Contention`] instead of blocking forever.
//!
//! # Upgrades
//!
//! A read session may need exclusive access for a moment (typically to
//! materialize the resource set on first use). [`ReadSession::elevate`]
//! runs a closure under a write permit and hands the session back as a read
//! session afterwards:
//!
//! ```text
//!  Read ──claim upgrade slot──▶ wait for other readers ──▶ Write ──▶ run ──▶ downgrade ──▶ Read
//!    │
//!    └─slot taken──▶ Releasing ──▶ AcquiringWrite ──▶ Write ──▶ run ──▶ downgrade ──▶ Read
//! ```
//!
//! Only one reader at a time may convert in place. A second concurrent
//! upgrader releases its read permit and queues for a fresh write permit; in
//! that window it holds nothing, so the closure must re-check whatever it
//! observed under the read permit.
//!
//! Sessions are not reentrant: a thread holding a session must not open
//! another one on the same guard.

use geodepot_core::{AccessError, ContentionKind, GeoResult, DEFAULT_LOCK_TIMEOUT_MS};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Permit bookkeeping, protected by the guard's mutex.
#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    /// A reader has claimed the in-place upgrade slot.
    upgrading: bool,
    writers_waiting: usize,
}

impl LockState {
    fn can_read(&self) -> bool {
        !self.writer && !self.upgrading && self.writers_waiting == 0
    }

    fn can_write(&self) -> bool {
        !self.writer && !self.upgrading && self.readers == 0
    }
}

/// Point-in-time view of the guard's state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub readers: usize,
    pub writer: bool,
    pub upgrading: bool,
    pub writers_waiting: usize,
}

/// Kind of permit a session currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Read,
    Write,
    Released,
}

/// Bounded-wait reader/writer lock with read-to-write upgrade.
#[derive(Debug)]
pub struct AccessGuard {
    state: Mutex<LockState>,
    changed: Condvar,
    timeout: Duration,
}

impl Default for AccessGuard {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS))
    }
}

impl AccessGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a shared session, waiting at most the configured timeout.
    pub fn open_read(&self) -> GeoResult<ReadSession<'_>> {
        self.acquire_read()?;
        Ok(ReadSession {
            guard: self,
            mode: SessionMode::Read,
        })
    }

    /// Open an exclusive session, waiting at most the configured timeout.
    pub fn open_write(&self) -> GeoResult<WriteSession<'_>> {
        self.acquire_write()?;
        Ok(WriteSession {
            guard: self,
            mode: SessionMode::Write,
        })
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let state = self.lock_state();
        GuardSnapshot {
            readers: state.readers,
            writer: state.writer,
            upgrading: state.upgrading,
            writers_waiting: state.writers_waiting,
        }
    }

    // The mutex only protects counters and no user code ever runs while it
    // is held, so a poisoned state is still consistent.
    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block on the condvar until `ready` holds or the deadline passes.
    /// Returns the state guard and whether `ready` was satisfied.
    fn wait_until<'a>(
        &'a self,
        mut state: MutexGuard<'a, LockState>,
        deadline: Instant,
        ready: impl Fn(&LockState) -> bool,
    ) -> (MutexGuard<'a, LockState>, bool) {
        loop {
            if ready(&state) {
                return (state, true);
            }
            let now = Instant::now();
            if now >= deadline {
                return (state, false);
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn contention(&self, kind: ContentionKind, started: Instant) -> AccessError {
        let waited = started.elapsed();
        tracing::warn!(kind = %kind, waited_ms = waited.as_millis() as u64, "Session acquisition timed out");
        AccessError::Contention { kind, waited }
    }

    fn acquire_read(&self) -> Result<(), AccessError> {
        let started = Instant::now();
        let state = self.lock_state();
        let (mut state, ready) = self.wait_until(state, started + self.timeout, LockState::can_read);
        if !ready {
            return Err(self.contention(ContentionKind::ConcurrentWrite, started));
        }
        state.readers += 1;
        Ok(())
    }

    fn acquire_write(&self) -> Result<(), AccessError> {
        let started = Instant::now();
        let mut state = self.lock_state();
        state.writers_waiting += 1;
        let (mut state, ready) = self.wait_until(state, started + self.timeout, LockState::can_write);
        state.writers_waiting -= 1;
        if !ready {
            drop(state);
            // Readers held back by this writer may proceed now.
            self.changed.notify_all();
            return Err(self.contention(ContentionKind::ConcurrentRead, started));
        }
        state.writer = true;
        Ok(())
    }

    fn release_read(&self) {
        let mut state = self.lock_state();
        debug_assert!(state.readers > 0, "read permit released twice");
        state.readers = state.readers.saturating_sub(1);
        drop(state);
        self.changed.notify_all();
    }

    fn release_write(&self) {
        let mut state = self.lock_state();
        debug_assert!(state.writer, "write permit released twice");
        state.writer = false;
        drop(state);
        self.changed.notify_all();
    }

    /// Convert the caller's write permit back into a read permit atomically.
    fn downgrade(&self) {
        let mut state = self.lock_state();
        state.writer = false;
        state.readers += 1;
        drop(state);
        self.changed.notify_all();
    }

    /// Try to convert the caller's read permit into a write permit in place.
    ///
    /// `Ok(true)`: converted. `Ok(false)`: another reader owns the upgrade
    /// slot, the caller still holds its read permit. `Err`: the other
    /// readers did not leave in time, the caller still holds its read permit.
    fn try_upgrade_in_place(&self) -> Result<bool, AccessError> {
        let started = Instant::now();
        let mut state = self.lock_state();
        if state.upgrading {
            return Ok(false);
        }
        state.upgrading = true;
        let (mut state, ready) =
            self.wait_until(state, started + self.timeout, |s| s.readers == 1 && !s.writer);
        state.upgrading = false;
        if !ready {
            drop(state);
            self.changed.notify_all();
            return Err(self.contention(ContentionKind::Upgrade, started));
        }
        state.readers -= 1;
        state.writer = true;
        Ok(true)
    }
}

/// Operations shared by both session kinds.
pub trait Session {
    fn mode(&self) -> SessionMode;

    /// Run `action` with exclusive access and return its result.
    fn elevate<R>(&mut self, action: impl FnOnce() -> R) -> GeoResult<R>;

    /// Release the permit. Closing twice is a no-op.
    fn close(&mut self);
}

// ============================================================================
// READ SESSION
// ============================================================================

/// Shared permit. Released on drop.
#[derive(Debug)]
pub struct ReadSession<'a> {
    guard: &'a AccessGuard,
    mode: SessionMode,
}

impl ReadSession<'_> {
    fn release(&mut self) {
        match self.mode {
            SessionMode::Read => self.guard.release_read(),
            SessionMode::Write => self.guard.release_write(),
            SessionMode::Released => {}
        }
        self.mode = SessionMode::Released;
    }

    /// Fallback path: give up the read permit and queue for a write permit.
    fn reacquire_as_writer(&mut self) -> GeoResult<()> {
        tracing::debug!("Upgrade slot taken, re-acquiring as writer");
        self.guard.release_read();
        self.mode = SessionMode::Released;

        match self.guard.acquire_write() {
            Ok(()) => {
                self.mode = SessionMode::Write;
                Ok(())
            }
            Err(err) => {
                // Hand the caller back the read permit it came in with.
                if self.guard.acquire_read().is_ok() {
                    self.mode = SessionMode::Read;
                }
                Err(err.into())
            }
        }
    }
}

impl Session for ReadSession<'_> {
    fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Run `action` under a write permit, then return to a read permit.
    ///
    /// If the upgrade is refused the session keeps its read permit where
    /// possible and the contention error is returned; `action` is not run.
    fn elevate<R>(&mut self, action: impl FnOnce() -> R) -> GeoResult<R> {
        if self.mode != SessionMode::Read {
            return Err(AccessError::Contention {
                kind: ContentionKind::Upgrade,
                waited: Duration::ZERO,
            }
            .into());
        }

        if self.guard.try_upgrade_in_place()? {
            self.mode = SessionMode::Write;
        } else {
            self.reacquire_as_writer()?;
        }

        // A panic inside `action` leaves mode == Write, so drop releases the
        // write permit.
        let result = action();

        self.guard.downgrade();
        self.mode = SessionMode::Read;
        Ok(result)
    }

    fn close(&mut self) {
        self.release();
    }
}

impl Drop for ReadSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// WRITE SESSION
// ============================================================================

/// Exclusive permit. Released on drop.
#[derive(Debug)]
pub struct WriteSession<'a> {
    guard: &'a AccessGuard,
    mode: SessionMode,
}

impl Session for WriteSession<'_> {
    fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Already exclusive: runs `action` directly.
    fn elevate<R>(&mut self, action: impl FnOnce() -> R) -> GeoResult<R> {
        if self.mode != SessionMode::Write {
            return Err(AccessError::Contention {
                kind: ContentionKind::Upgrade,
                waited: Duration::ZERO,
            }
            .into());
        }
        Ok(action())
    }

    fn close(&mut self) {
        if self.mode == SessionMode::Write {
            self.guard.release_write();
        }
        self.mode = SessionMode::Released;
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
