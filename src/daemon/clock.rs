//! Time sources for the daemon.
//!
//! This module provides:
//! - [`Clock`]: wall-clock reads, swappable for tests
//! - [`WakeScheduler`]: a one-shot alarm at an absolute deadline
//! - [`Ticker`]: the sub-second refresh loop used while a session runs

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

/// Upper bound of a single sleep while waiting for a deadline.
///
/// Monotonic sleeps do not advance while the machine is suspended, so the
/// wake task re-reads the wall clock at least this often.
pub const MAX_WAKE_SLICE: Duration = Duration::from_secs(30);

// ============================================================================
// Clock
// ============================================================================

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Moves the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance(chrono::Duration::seconds(secs));
    }

    /// Jumps to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// WakeScheduler
// ============================================================================

/// One-shot alarm that fires when the session deadline is reached.
///
/// At most one alarm is armed; arming again replaces the previous one.
pub trait WakeScheduler: Send {
    /// Arms the alarm for `deadline`.
    fn arm_wake(&mut self, deadline: DateTime<Utc>);

    /// Cancels the pending alarm, if any.
    fn disarm_wake(&mut self);

    /// Returns the currently armed deadline.
    fn armed_deadline(&self) -> Option<DateTime<Utc>>;
}

/// Callback invoked when an alarm fires.
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Wake scheduler backed by a tokio task that polls the wall clock.
pub struct TokioWakeScheduler {
    clock: Arc<dyn Clock>,
    on_wake: WakeCallback,
    armed: Option<(DateTime<Utc>, JoinHandle<()>)>,
}

impl TokioWakeScheduler {
    /// Creates a scheduler. Must be armed from within a tokio runtime.
    pub fn new(clock: Arc<dyn Clock>, on_wake: WakeCallback) -> Self {
        Self {
            clock,
            on_wake,
            armed: None,
        }
    }
}

impl WakeScheduler for TokioWakeScheduler {
    fn arm_wake(&mut self, deadline: DateTime<Utc>) {
        self.disarm_wake();

        let clock = Arc::clone(&self.clock);
        let on_wake = Arc::clone(&self.on_wake);
        let handle = tokio::spawn(async move {
            loop {
                let now = clock.now();
                if now >= deadline {
                    on_wake();
                    break;
                }
                let wait = (deadline - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_WAKE_SLICE);
                tokio::time::sleep(wait).await;
            }
        });

        debug!("Wake armed for {}", deadline);
        self.armed = Some((deadline, handle));
    }

    fn disarm_wake(&mut self) {
        if let Some((deadline, handle)) = self.armed.take() {
            handle.abort();
            debug!("Wake for {} disarmed", deadline);
        }
    }

    fn armed_deadline(&self) -> Option<DateTime<Utc>> {
        // A finished task has already fired.
        self.armed
            .as_ref()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(deadline, _)| *deadline)
    }
}

impl Drop for TokioWakeScheduler {
    fn drop(&mut self) {
        self.disarm_wake();
    }
}

/// Recording wake scheduler for tests.
#[derive(Debug, Clone, Default)]
pub struct MockWakeScheduler {
    state: Arc<Mutex<MockWakeState>>,
}

#[derive(Debug, Default)]
struct MockWakeState {
    armed: Option<DateTime<Utc>>,
    arm_count: usize,
    disarm_count: usize,
}

impl MockWakeScheduler {
    /// Creates a new scheduler with nothing armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times an alarm was armed.
    pub fn arm_count(&self) -> usize {
        self.lock().arm_count
    }

    /// Number of times the alarm was cancelled.
    pub fn disarm_count(&self) -> usize {
        self.lock().disarm_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockWakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WakeScheduler for MockWakeScheduler {
    fn arm_wake(&mut self, deadline: DateTime<Utc>) {
        let mut state = self.lock();
        state.armed = Some(deadline);
        state.arm_count += 1;
    }

    fn disarm_wake(&mut self) {
        let mut state = self.lock();
        if state.armed.take().is_some() {
            state.disarm_count += 1;
        }
    }

    fn armed_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().armed
    }
}

// ============================================================================
// Ticker
// ============================================================================

/// Periodic refresh task that only exists while a session is running.
#[derive(Debug, Default)]
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Creates a stopped ticker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts ticking every `period`, replacing any running ticker.
    pub fn start<F>(&mut self, period: Duration, on_tick: F)
    where
        F: Fn() + Send + 'static,
    {
        self.stop();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                on_tick();
            }
        });

        self.handle = Some(handle);
    }

    /// Stops the ticker if it is running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Returns true while the ticker task exists.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
