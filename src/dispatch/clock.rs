use chrono::{DateTime, FixedOffset, Local};

/// Source of wall-clock time for a dispatch cycle.
///
/// The cycle reads the clock once per setup to resolve battery windows and
/// telemetry freshness.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Timelike};
/// use der_dispatch::dispatch::clock::{Clock, FixedClock};
///
/// let at = DateTime::parse_from_rfc3339("2024-05-01T19:30:00-03:00").unwrap();
/// let clock = FixedClock::new(at);
/// assert_eq!(clock.now().hour(), 19);
/// ```
pub trait Clock {
    /// Current local time, carrying its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Clock backed by the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    at: DateTime<FixedOffset>,
}

impl FixedClock {
    /// Creates a clock that always reports `at`.
    ///
    /// # Arguments
    ///
    /// * `at` - The instant returned by every call to [`Clock::now`]
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.at
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> DateTime<FixedOffset> {
        (**self).now()
    }
}
