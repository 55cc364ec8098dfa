use serde::{Deserialize, Serialize};
use veloce_data::time::TimestampNs;

/// A peak-to-trough equity decline over a specific period. Drawdown is a
/// measure of downside volatility.
///
/// See documentation: <https://www.investopedia.com/terms/d/drawdown.asp>
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct Drawdown {
    /// Fractional decline from the period peak, in `[0, 1]`.
    pub value: f64,
    pub time_start: TimestampNs,
    pub time_end: TimestampNs,
}

/// [`Drawdown`] generator tracking the running peak, the max drawdown of the
/// current underwater period, and the overall maximum.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct DrawdownGenerator {
    pub peak: f64,
    drawdown_current_max: f64,
    drawdown_overall_max: f64,
    time_peak: TimestampNs,
    time_now: TimestampNs,
}

impl DrawdownGenerator {
    /// Initialise a [`DrawdownGenerator`] from an initial equity point.
    pub fn init(time: TimestampNs, equity: f64) -> Self {
        Self {
            peak: equity,
            drawdown_current_max: 0.0,
            drawdown_overall_max: 0.0,
            time_peak: time,
            time_now: time,
        }
    }

    /// Update with the next equity point.
    ///
    /// If an underwater period just ended (equity recovered above the prior
    /// peak), returns that period's [`Drawdown`].
    pub fn update(&mut self, time: TimestampNs, equity: f64) -> Option<Drawdown> {
        self.time_now = time;

        if equity > self.peak {
            let ended = self.generate();
            self.peak = equity;
            self.drawdown_current_max = 0.0;
            self.time_peak = time;
            ended
        } else {
            if self.peak > 0.0 {
                let drawdown = (self.peak - equity) / self.peak;
                if drawdown > self.drawdown_current_max {
                    self.drawdown_current_max = drawdown;
                }
                if drawdown > self.drawdown_overall_max {
                    self.drawdown_overall_max = drawdown;
                }
            }
            None
        }
    }

    /// The [`Drawdown`] of the current underwater period, if any.
    pub fn generate(&self) -> Option<Drawdown> {
        (self.drawdown_current_max != 0.0).then_some(Drawdown {
            value: self.drawdown_current_max,
            time_start: self.time_peak,
            time_end: self.time_now,
        })
    }

    /// Maximum drawdown observed across the whole series.
    pub fn max_drawdown(&self) -> f64 {
        self.drawdown_overall_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ts(day: i64) -> TimestampNs {
        TimestampNs::from_secs(day * 86_400)
    }

    #[test]
    fn test_drawdown_generator_lifecycle() {
        struct TestCase {
            input: (TimestampNs, f64),
            expected_output: Option<Drawdown>,
            expected_max: f64,
        }

        let mut generator = DrawdownGenerator::init(ts(0), 100.0);

        let cases = vec![
            // TC0: peak increases with no drawdown
            TestCase {
                input: (ts(1), 110.0),
                expected_output: None,
                expected_max: 0.0,
            },
            // TC1: first drawdown of the period
            TestCase {
                input: (ts(2), 99.0),
                expected_output: None,
                expected_max: 0.1,
            },
            // TC2: drawdown deepens
            TestCase {
                input: (ts(3), 88.0),
                expected_output: None,
                expected_max: 0.2,
            },
            // TC3: partial recovery, still underwater
            TestCase {
                input: (ts(4), 95.0),
                expected_output: None,
                expected_max: 0.2,
            },
            // TC4: full recovery above peak emits the period drawdown
            TestCase {
                input: (ts(5), 115.0),
                expected_output: Some(Drawdown {
                    value: 0.2,
                    time_start: ts(1),
                    time_end: ts(5),
                }),
                expected_max: 0.2,
            },
            // TC5: shallower second period does not move the overall max
            TestCase {
                input: (ts(6), 110.0),
                expected_output: None,
                expected_max: 0.2,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let actual = generator.update(test.input.0, test.input.1);
            assert_eq!(actual, test.expected_output, "TC{index} failed");
            assert_relative_eq!(
                generator.max_drawdown(),
                test.expected_max,
                epsilon = 1e-12
            );
        }
    }
}
