//! Numeric ranges and ordered lists of ranges.

use std::fmt;

/// A `[start, stop]` interval with an optional step; `step == 0` is continuous.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Range {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Range {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Self { start, stop, step }
    }

    /// A single value.
    pub fn point(value: f64) -> Self {
        Self::new(value, value, 0.0)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.start && value <= self.stop
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.stop {
            write!(f, "{}", self.start)
        } else if self.step == 0.0 {
            write!(f, "[{}, {}]", self.start, self.stop)
        } else {
            write!(f, "[{}, {}, step {}]", self.start, self.stop, self.step)
        }
    }
}

/// Returned when a [`MetaRange`] is built from no ranges at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("meta-range must contain at least one range")]
pub struct EmptyRange;

/// An ordered, non-empty list of ranges with derived overall bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRange {
    ranges: Vec<Range>,
    start: f64,
    stop: f64,
    step: f64,
}

impl MetaRange {
    /// Build from ranges sorted by start.
    pub fn new(ranges: Vec<Range>) -> Result<Self, EmptyRange> {
        let first = ranges.first().ok_or(EmptyRange)?;
        let mut start = first.start;
        let mut stop = first.stop;
        let mut step: Option<f64> = None;
        let mut smallest = |candidate: f64| {
            if candidate > 0.0 && step.is_none_or(|s| candidate < s) {
                step = Some(candidate);
            }
        };

        for (i, range) in ranges.iter().enumerate() {
            start = start.min(range.start);
            stop = stop.max(range.stop);
            smallest(range.step);
            if i > 0 {
                smallest(range.start - ranges[i - 1].stop);
            }
        }

        Ok(Self {
            ranges,
            start,
            stop,
            step: step.unwrap_or(0.0),
        })
    }

    pub fn single(range: Range) -> Self {
        Self {
            start: range.start,
            stop: range.stop,
            step: range.step.max(0.0),
            ranges: vec![range],
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Smallest positive step or gap, `0` when the whole list is continuous.
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.ranges.iter().any(|r| r.contains(value))
    }

    /// Bring `value` into the list.
    ///
    /// Values in a gap go to the nearer edge, ties to the lower range's stop.
    /// With `clip_step`, values inside a stepped range snap to the step grid.
    pub fn clip(&self, value: f64, clip_step: bool) -> f64 {
        let mut last_stop = self.ranges[0].stop;
        for range in &self.ranges {
            if value < range.start {
                return if (value - range.start).abs() < (value - last_stop).abs() {
                    range.start
                } else {
                    last_stop
                };
            }
            if value <= range.stop {
                if !clip_step || range.step <= 0.0 {
                    return value;
                }
                let snapped =
                    ((value - range.start) / range.step).round() * range.step + range.start;
                return if snapped > range.stop {
                    snapped - range.step
                } else {
                    snapped
                };
            }
            last_stop = range.stop;
        }
        last_stop
    }
}

impl fmt::Display for MetaRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fixture() -> MetaRange {
        MetaRange::new(vec![Range::new(0.0, 10.0, 1.0), Range::new(20.0, 30.0, 2.0)]).unwrap()
    }

    #[test]
    fn test_derived_bounds() {
        let mr = fixture();
        assert_relative_eq!(mr.start(), 0.0);
        assert_relative_eq!(mr.stop(), 30.0);
        assert_relative_eq!(mr.step(), 1.0);
    }

    #[test]
    fn test_step_from_gap() {
        let mr =
            MetaRange::new(vec![Range::new(0.0, 10.0, 0.0), Range::new(10.5, 20.0, 0.0)]).unwrap();
        assert_relative_eq!(mr.step(), 0.5);
    }

    #[test]
    fn test_continuous_step_is_zero() {
        let mr = MetaRange::new(vec![Range::new(1e6, 6e9, 0.0)]).unwrap();
        assert_eq!(mr.step(), 0.0);
        assert_eq!(mr.len(), 1);
    }

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(MetaRange::new(vec![]), Err(EmptyRange));
    }

    #[test]
    fn test_clip_gaps_and_ends() {
        let mr = fixture();
        assert_relative_eq!(mr.clip(-5.0, false), 0.0);
        assert_relative_eq!(mr.clip(12.0, false), 10.0);
        assert_relative_eq!(mr.clip(18.0, false), 20.0);
        // Tie goes to the lower range.
        assert_relative_eq!(mr.clip(15.0, false), 10.0);
        assert_relative_eq!(mr.clip(99.0, false), 30.0);
    }

    #[test]
    fn test_clip_in_range_is_identity() {
        let mr = fixture();
        for v in [0.0, 3.3, 10.0, 20.0, 25.1, 30.0] {
            assert_eq!(mr.clip(v, false), v);
        }
    }

    #[test]
    fn test_clip_is_idempotent() {
        let mr = fixture();
        let mut v = -3.0;
        while v < 35.0 {
            let once = mr.clip(v, false);
            assert_eq!(mr.clip(once, false), once);
            v += 0.7;
        }
    }

    #[test]
    fn test_clip_step_snaps() {
        let mr = fixture();
        assert_relative_eq!(mr.clip(3.4, true), 3.0);
        assert_relative_eq!(mr.clip(22.9, true), 22.0);
        assert_relative_eq!(mr.clip(23.1, true), 24.0);

        let odd = MetaRange::single(Range::new(0.0, 10.0, 3.0));
        assert_relative_eq!(odd.clip(9.9, true), 9.0);
        assert_relative_eq!(odd.clip(10.0, true), 9.0);
    }
}
