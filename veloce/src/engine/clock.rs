use serde::{Deserialize, Serialize};
use thiserror::Error;
use veloce_data::time::TimestampNs;

/// All possible clock errors.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ClockError {
    #[error("cannot advance clock backwards: now {now}, requested {requested}")]
    TimeReversal {
        now: TimestampNs,
        requested: TimestampNs,
    },

    #[error("wall clocks cannot be advanced manually")]
    NotVirtual,
}

/// Defines how an [`Engine`](super::Engine) determines the current time.
///
/// * [`LiveClock`] for live-trading and paper-trading.
/// * [`VirtualClock`] for back-testing, advancing only with dispatched events.
pub trait EngineClock {
    /// Current time in nanoseconds since epoch (or virtual origin).
    fn now_ns(&self) -> TimestampNs;

    /// Current time in whole milliseconds.
    fn now_ms(&self) -> i64 {
        self.now_ns().as_millis()
    }

    /// Nanoseconds elapsed since the clock started.
    fn elapsed_ns(&self) -> i64;

    /// Completion fraction in `[0, 1]`. Meaningful for virtual clocks with a
    /// known end; wall clocks always report `0.0`.
    fn progress(&self) -> f64 {
        0.0
    }

    /// Advance the clock to `ts`. Fails on wall clocks and on any attempt to
    /// move time backwards.
    fn advance_to(&mut self, ts: TimestampNs) -> Result<(), ClockError>;
}

/// Wall clock anchored at construction time, read through a monotonic
/// [`std::time::Instant`] so it can never step backwards mid-run.
#[derive(Debug, Clone)]
pub struct LiveClock {
    origin_ns: TimestampNs,
    started: std::time::Instant,
}

impl Default for LiveClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveClock {
    pub fn new() -> Self {
        Self {
            origin_ns: TimestampNs::from(chrono::Utc::now()),
            started: std::time::Instant::now(),
        }
    }
}

impl EngineClock for LiveClock {
    fn now_ns(&self) -> TimestampNs {
        self.origin_ns.plus_nanos(self.elapsed_ns())
    }

    fn elapsed_ns(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }

    fn advance_to(&mut self, _: TimestampNs) -> Result<(), ClockError> {
        Err(ClockError::NotVirtual)
    }
}

/// Virtual clock that advances only when the event queue dispatches.
///
/// `now` equals the timestamp of the most recently dispatched event, or
/// `origin` before the first dispatch.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct VirtualClock {
    origin: TimestampNs,
    end: TimestampNs,
    now: TimestampNs,
}

impl VirtualClock {
    /// Construct a `VirtualClock` spanning `[origin, end]`.
    pub fn new(origin: TimestampNs, end: TimestampNs) -> Self {
        Self {
            origin,
            end,
            now: origin,
        }
    }

    pub fn origin(&self) -> TimestampNs {
        self.origin
    }

    pub fn end(&self) -> TimestampNs {
        self.end
    }
}

impl EngineClock for VirtualClock {
    fn now_ns(&self) -> TimestampNs {
        self.now
    }

    fn elapsed_ns(&self) -> i64 {
        self.now.as_nanos() - self.origin.as_nanos()
    }

    fn progress(&self) -> f64 {
        let span = self.end.as_nanos() - self.origin.as_nanos();
        if span <= 0 {
            return 1.0;
        }
        let elapsed = self.elapsed_ns() as f64 / span as f64;
        elapsed.clamp(0.0, 1.0)
    }

    fn advance_to(&mut self, ts: TimestampNs) -> Result<(), ClockError> {
        if ts < self.now {
            return Err(ClockError::TimeReversal {
                now: self.now,
                requested: ts,
            });
        }
        self.now = ts;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_virtual_clock_advance_and_progress() {
        struct TestCase {
            name: &'static str,
            advance_to: TimestampNs,
            expected: Result<(), ClockError>,
            expected_now: TimestampNs,
            expected_progress: f64,
        }

        let origin = TimestampNs::from_secs(0);
        let end = TimestampNs::from_secs(100);
        let mut clock = VirtualClock::new(origin, end);
        assert_eq!(clock.now_ns(), origin);

        let cases = vec![
            TestCase {
                name: "advance forward",
                advance_to: TimestampNs::from_secs(25),
                expected: Ok(()),
                expected_now: TimestampNs::from_secs(25),
                expected_progress: 0.25,
            },
            TestCase {
                name: "advance to same instant is allowed",
                advance_to: TimestampNs::from_secs(25),
                expected: Ok(()),
                expected_now: TimestampNs::from_secs(25),
                expected_progress: 0.25,
            },
            TestCase {
                name: "advance backwards fails",
                advance_to: TimestampNs::from_secs(10),
                expected: Err(ClockError::TimeReversal {
                    now: TimestampNs::from_secs(25),
                    requested: TimestampNs::from_secs(10),
                }),
                expected_now: TimestampNs::from_secs(25),
                expected_progress: 0.25,
            },
            TestCase {
                name: "advance beyond end clamps progress",
                advance_to: TimestampNs::from_secs(150),
                expected: Ok(()),
                expected_now: TimestampNs::from_secs(150),
                expected_progress: 1.0,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let actual = clock.advance_to(test.advance_to);
            assert_eq!(actual, test.expected, "TC{index} ({}) failed", test.name);
            assert_eq!(
                clock.now_ns(),
                test.expected_now,
                "TC{index} ({}) failed",
                test.name
            );
            assert_relative_eq!(clock.progress(), test.expected_progress, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_virtual_clock_zero_span_progress() {
        let origin = TimestampNs::from_secs(5);
        let clock = VirtualClock::new(origin, origin);
        assert_relative_eq!(clock.progress(), 1.0);
    }

    #[test]
    fn test_live_clock_is_monotonic_and_not_advanceable() {
        let mut clock = LiveClock::new();
        let first = clock.now_ns();
        let second = clock.now_ns();
        assert!(second >= first);
        assert_eq!(
            clock.advance_to(TimestampNs::ZERO),
            Err(ClockError::NotVirtual)
        );
    }
}
