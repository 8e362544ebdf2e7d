//! Coarse summaries of a utilization function over fixed-width bands of time.
//!
//! Each band records the lowest instantaneous utilization in effect anywhere
//! inside it, so a window's worst case can be bounded from below without
//! looking at individual utilization points. Exact values are recovered later
//! by re-scanning a single band starting from its saved integrator position.

use crate::integrator::{Integrator, TotalUtil};
use crate::utilization::MutatorUtil;

/// Summary of the utilization function over `[start, start + band_dur)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Band {
    /// Minimum instantaneous mutator utilization in this band
    pub min_util: f64,
    /// Integrated utilization between the start of the function and the left
    /// edge of this band
    pub cum_util: TotalUtil,
    /// Integrator position at the left edge of this band
    pub pos: usize,
}

/// Non-overlapping bands of equal duration covering a utilization function
#[derive(Debug, Clone)]
pub(crate) struct BandIndex {
    bands: Vec<Band>,
    band_dur: i64,
    start: i64,
}

impl BandIndex {
    /// Summarizes `util` into at most `max_bands` bands, plus one trailing
    /// band that records the final cumulative sum.
    ///
    /// `util` must be non-empty, time-sorted and `sums` must be its prefix
    /// sums. `max_bands` must be at least 1.
    pub(crate) fn build(util: &[MutatorUtil], sums: &[TotalUtil], max_bands: usize) -> Self {
        // There's no point in having lots of bands if there aren't many points.
        let num_bands = max_bands.min(util.len()).max(1);
        let start = util[0].time;
        let dur = util[util.len() - 1].time - start;
        let band_dur = ((dur + num_bands as i64 - 1) / num_bands as i64).max(1);

        let mut index = Self {
            bands: Vec::with_capacity(num_bands + 1),
            band_dur,
            start,
        };

        let mut left = Integrator::new(util, sums, 0);
        for i in 0..=num_bands {
            let (band_start, band_end) = index.band_time(i);
            let cum_util = left.advance(band_start);
            let pos = left.pos();
            // Includes the point in effect at the left edge.
            let min_util = util[pos..]
                .iter()
                .take_while(|u| u.time < band_end)
                .map(|u| u.util)
                .fold(1.0, f64::min);
            index.bands.push(Band {
                min_util,
                cum_util,
                pos,
            });
        }

        index
    }

    /// Returns the `[start, end)` time range covered by band `i`
    pub(crate) fn band_time(&self, i: usize) -> (i64, i64) {
        let start = i as i64 * self.band_dur + self.start;
        (start, start + self.band_dur)
    }

    /// Duration of each band in nanoseconds
    pub(crate) fn band_dur(&self) -> i64 {
        self.band_dur
    }

    /// Number of bands, including the trailing total band
    pub(crate) fn len(&self) -> usize {
        self.bands.len()
    }
}

impl std::ops::Index<usize> for BandIndex {
    type Output = Band;

    fn index(&self, i: usize) -> &Band {
        &self.bands[i]
    }
}
