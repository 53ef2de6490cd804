//! Time providers.
//!
//! Expirations are stored as absolute integer timestamps in a clock's unit.
//! The default clock counts whole seconds since the Unix epoch; tests inject a
//! [`ManualClock`] to drive expiration deterministically.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of the current time, expressed as an integer count of `unit()`.
pub trait Clock: fmt::Debug + Send + Sync + 'static {
    /// The current time in ticks.
    fn now(&self) -> i64;

    /// The real duration of one tick.
    fn unit(&self) -> Duration;

    /// Upper bound on how long a waiter may sleep before re-reading the clock.
    ///
    /// Clocks that advance independently of real time return `Some`.
    fn poll_interval(&self) -> Option<Duration> {
        None
    }
}

/// Wall-clock time since the Unix epoch at a fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemClock {
    unit: Duration,
}

impl SystemClock {
    /// Whole seconds. This is the default cache clock.
    pub fn seconds() -> Self {
        Self::with_unit(Duration::from_secs(1))
    }

    /// Milliseconds.
    pub fn millis() -> Self {
        Self::with_unit(Duration::from_millis(1))
    }

    /// Nanoseconds.
    pub fn nanos() -> Self {
        Self::with_unit(Duration::from_nanos(1))
    }

    /// An arbitrary resolution. A zero unit is raised to one nanosecond.
    pub fn with_unit(unit: Duration) -> Self {
        Self {
            unit: unit.max(Duration::from_nanos(1)),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::seconds()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        i64::try_from(elapsed.as_nanos() / self.unit.as_nanos()).unwrap_or(i64::MAX)
    }

    fn unit(&self) -> Duration {
        self.unit
    }
}

/// A clock that only moves when told to.
///
/// # Example
/// ```
/// use shard_cache::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// assert_eq!(clock.now(), 0);
/// clock.advance(5);
/// assert_eq!(clock.now(), 5);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    ticks: AtomicI64,
    unit: Duration,
}

impl ManualClock {
    /// Poll period handed to waiters, since they cannot predict when the
    /// clock will next move.
    const POLL: Duration = Duration::from_millis(1);

    /// A clock at tick 0 whose ticks represent seconds.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// A seconds clock starting at `ticks`.
    pub fn starting_at(ticks: i64) -> Self {
        Self {
            ticks: AtomicI64::new(ticks),
            unit: Duration::from_secs(1),
        }
    }

    /// Change the duration a tick represents.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit.max(Duration::from_nanos(1));
        self
    }

    /// Move the clock forward by `ticks` and return the new time.
    pub fn advance(&self, ticks: i64) -> i64 {
        self.ticks.fetch_add(ticks, Ordering::SeqCst) + ticks
    }

    /// Jump to an absolute time.
    pub fn set(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn unit(&self) -> Duration {
        self.unit
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(Self::POLL)
    }
}

/// Real time covered by `ticks` of `unit`, saturating. Negative counts are zero.
pub(crate) fn span(unit: Duration, ticks: i64) -> Duration {
    let ticks = u128::try_from(ticks).unwrap_or(0);
    let nanos = unit.as_nanos().saturating_mul(ticks);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
