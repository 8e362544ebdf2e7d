use std::ops::{Add, AddAssign, Sub};

use crate::utilization::MutatorUtil;

/// Total utilization, measured in nanoseconds.
///
/// This is the integral of the utilization function over some span, kept
/// as a separate type from mean utilization, which is also an `f64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct TotalUtil(pub f64);

impl TotalUtil {
    /// Total utilization of `dur` nanoseconds at a constant `mean_util`
    pub fn of(mean_util: f64, dur: i64) -> Self {
        Self(mean_util * dur as f64)
    }

    /// Mean utilization over `dur` nanoseconds
    pub fn mean(self, dur: i64) -> f64 {
        self.0 / dur as f64
    }
}

impl Add for TotalUtil {
    type Output = TotalUtil;

    fn add(self, rhs: TotalUtil) -> TotalUtil {
        TotalUtil(self.0 + rhs.0)
    }
}

impl AddAssign for TotalUtil {
    fn add_assign(&mut self, rhs: TotalUtil) {
        self.0 += rhs.0;
    }
}

impl Sub for TotalUtil {
    type Output = TotalUtil;

    fn sub(self, rhs: TotalUtil) -> TotalUtil {
        TotalUtil(self.0 - rhs.0)
    }
}

/// Computes `sums[j]`, the integral of `util` from its first point to `util[j]`.
pub(crate) fn prefix_sums(util: &[MutatorUtil]) -> Vec<TotalUtil> {
    let mut sums = Vec::with_capacity(util.len());
    let mut sum = TotalUtil::default();
    for (j, u) in util.iter().enumerate() {
        if j > 0 {
            let prev = &util[j - 1];
            sum += TotalUtil::of(prev.util, u.time - prev.time);
        }
        sums.push(sum);
    }
    sums
}

/// Successive advances are usually nearby, so targets at most this many
/// points ahead are found with a linear scan.
const MAX_SEQUENTIAL_SCAN: usize = 8;

/// Tracks a position in a utilization function and integrates it.
///
/// An integrator only moves forward: [`Integrator::advance`] must be called
/// with non-decreasing times. Cloning an integrator snapshots its position.
#[derive(Debug, Clone)]
pub struct Integrator<'a> {
    util: &'a [MutatorUtil],
    sums: &'a [TotalUtil],
    /// Index in `util` of the current time's non-strict predecessor
    pos: usize,
    #[cfg(debug_assertions)]
    last_time: Option<i64>,
}

impl<'a> Integrator<'a> {
    pub(crate) fn new(util: &'a [MutatorUtil], sums: &'a [TotalUtil], pos: usize) -> Self {
        Self {
            util,
            sums,
            pos,
            #[cfg(debug_assertions)]
            last_time: None,
        }
    }

    /// Index of the current time's non-strict predecessor
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Returns the integral of the utilization function from its first point
    /// to `time`.
    ///
    /// `time` must be at least every time previously passed to `advance` on
    /// this integrator.
    pub fn advance(&mut self, time: i64) -> TotalUtil {
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.last_time.map_or(true, |last| last <= time),
                "integrator advanced backwards: previous={:?}, time={}",
                self.last_time,
                time
            );
            self.last_time = Some(time);
        }

        let util = self.util;
        let mut pos = self.pos;
        if pos + MAX_SEQUENTIAL_SCAN < util.len() && util[pos + MAX_SEQUENTIAL_SCAN].time > time {
            while pos + 1 < util.len() && util[pos + 1].time <= time {
                pos += 1;
            }
        } else {
            // Far away: binary search for time's strict successor.
            let ahead = util[pos..].partition_point(|u| u.time <= time);
            if ahead > 0 {
                pos += ahead - 1;
            }
        }
        self.pos = pos;

        let point = &util[pos];
        let mut total = self.sums[pos];
        if time != point.time {
            total += TotalUtil::of(point.util, time - point.time);
        }
        total
    }

    /// Returns the time of the first change in the utilization function
    /// strictly after `time`, or `None` if the function does not change again.
    pub fn next(&self, time: i64) -> Option<i64> {
        self.util[self.pos..]
            .iter()
            .map(|u| u.time)
            .find(|&t| t > time)
    }
}
