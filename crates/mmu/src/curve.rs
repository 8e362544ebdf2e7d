use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::band::BandIndex;
use crate::integrator::{prefix_sums, Integrator, TotalUtil};
use crate::utilization::MutatorUtil;
use crate::Error;

/// Default upper limit on the number of bands in a curve's index
pub const DEFAULT_MAX_BANDS: usize = 1000;

/// The minimum mutator utilization curve of a utilization function, across
/// all window sizes.
///
/// `MmuCurve` is immutable once built. Queries only allocate local state, so
/// a single curve can be shared by reference between threads and queried
/// concurrently.
///
/// # Examples
///
/// ```
/// use mmu::{MmuCurve, MutatorUtil};
///
/// // A 50ns pause in a 1ms trace.
/// let util = vec![
///     MutatorUtil::new(0, 1.0),
///     MutatorUtil::new(100_000, 0.0),
///     MutatorUtil::new(100_050, 1.0),
///     MutatorUtil::new(1_000_000, 0.0),
/// ];
/// let curve = MmuCurve::new(util).unwrap();
///
/// assert_eq!(curve.mmu(10), 0.0);
/// assert!((curve.mmu(100) - 0.5).abs() < 1e-9);
/// assert!((curve.mmu(1000) - 0.95).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct MmuCurve {
    util: Vec<MutatorUtil>,
    /// `sums[j]` is the integral of `util` up to `util[j].time`
    sums: Vec<TotalUtil>,
    bands: BandIndex,
}

/// A lower bound on the mutator utilization of all windows with a left edge
/// in a band. Ordered so that a `BinaryHeap` pops the lowest bound first.
#[derive(Debug, Clone, Copy)]
struct BandUtil {
    index: usize,
    util_bound: f64,
}

impl PartialEq for BandUtil {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BandUtil {}

impl PartialOrd for BandUtil {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BandUtil {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .util_bound
            .total_cmp(&self.util_bound)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl MmuCurve {
    /// Builds the MMU curve of a utilization function with the default band
    /// count.
    ///
    /// # Errors
    ///
    /// Returns an error if `util` is empty, not sorted by time, or holds a
    /// utilization outside `[0, 1]`.
    pub fn new(util: Vec<MutatorUtil>) -> Result<Self, Error> {
        Self::with_max_bands(util, DEFAULT_MAX_BANDS)
    }

    /// Builds the MMU curve of a utilization function, summarizing it into at
    /// most `max_bands` bands.
    ///
    /// More bands make the per-band bounds tighter at the cost of a larger
    /// index. Results are exact for any band count.
    pub fn with_max_bands(util: Vec<MutatorUtil>, max_bands: usize) -> Result<Self, Error> {
        if util.is_empty() {
            return Err(Error::EmptyUtilization);
        }
        if max_bands == 0 {
            return Err(Error::ZeroBands);
        }
        for (index, u) in util.iter().enumerate() {
            if !(0.0..=1.0).contains(&u.util) {
                return Err(Error::UtilizationOutOfRange {
                    index,
                    util: u.util,
                });
            }
            if index > 0 && util[index - 1].time > u.time {
                return Err(Error::NonMonotonicTime {
                    index,
                    prev: util[index - 1].time,
                    time: u.time,
                });
            }
        }

        let sums = prefix_sums(&util);
        let bands = BandIndex::build(&util, &sums, max_bands);
        log::debug!(
            "Indexed {} utilization points into {} bands of {}ns",
            util.len(),
            bands.len() - 1,
            bands.band_dur()
        );

        Ok(Self { util, sums, bands })
    }

    /// The utilization function this curve was built from
    pub fn utilization(&self) -> &[MutatorUtil] {
        &self.util
    }

    /// Duration covered by the utilization function, in nanoseconds
    pub fn span(&self) -> i64 {
        self.util[self.util.len() - 1].time - self.util[0].time
    }

    /// Time-weighted mean utilization over the whole function.
    ///
    /// A zero-span function has no mean; its only value is returned instead.
    pub fn mean_utilization(&self) -> f64 {
        let span = self.span();
        if span == 0 {
            return self.util[0].util;
        }
        self.sums[self.sums.len() - 1].mean(span)
    }

    /// Number of bands in the index, not counting the trailing total band
    pub fn band_count(&self) -> usize {
        self.bands.len() - 1
    }

    /// Duration of each band in nanoseconds
    pub fn band_duration(&self) -> i64 {
        self.bands.band_dur()
    }

    /// Returns an integrator positioned at the start of the function
    pub fn integrator(&self) -> Integrator<'_> {
        Integrator::new(&self.util, &self.sums, 0)
    }

    /// Returns the minimum mutator utilization for windows of `window`
    /// nanoseconds.
    ///
    /// This is the lowest mean utilization of any window of this duration
    /// that lies within the function. Windows longer than the function are
    /// clamped to its span. The result is in `[0, 1]`; a non-positive window
    /// yields 0.
    pub fn mmu(&self, window: i64) -> f64 {
        if window <= 0 {
            return 0.0;
        }
        let window = window.min(self.span());
        if window <= 0 {
            return 0.0;
        }

        let mut heap: BinaryHeap<BandUtil> = self.band_bounds(window).into();

        // Refine bands from the lowest bound up until no remaining bound can
        // beat the best exact value.
        let mut mmu = 1.0;
        let mut refined = 0usize;
        while let Some(band) = heap.pop() {
            if band.util_bound >= mmu {
                break;
            }
            mmu = self.band_mmu(band.index, window, mmu);
            refined += 1;
        }

        log::trace!(
            "mmu({}) = {} after refining {} of {} bands",
            window,
            mmu,
            refined,
            self.band_count()
        );
        mmu
    }

    /// Evaluates [`MmuCurve::mmu`] for each window, in order.
    pub fn mmu_curve(&self, windows: &[i64]) -> Vec<(i64, f64)> {
        windows.iter().map(|&w| (w, self.mmu(w))).collect()
    }

    /// For each band, computes a lower bound on the mean utilization of every
    /// window of `window` nanoseconds with a left edge in that band.
    fn band_bounds(&self, window: i64) -> Vec<BandUtil> {
        let bands = &self.bands;
        let band_dur = bands.band_dur();

        // The fewest and most bands a window can span in any alignment.
        let min_bands = ((window + band_dur - 1) / band_dur) as usize;
        let max_bands = ((window + 2 * (band_dur - 1)) / band_dur) as usize;
        debug_assert!(window <= 1 || max_bands >= 2, "max_bands < 2");
        let tail_dur = window % band_dur;

        let n = (bands.len() + 1).saturating_sub(max_bands);
        (0..n)
            .map(|i| {
                // Assume the minimum for bands only partially overlapped by
                // some window and the exact total for bands completely
                // covered by every window.
                let l = bands[i].min_util;
                let r1 = bands[i + min_bands - 1].min_util;
                let r2 = bands[i + max_bands - 1].min_util;
                let lowest = l.min(r1).min(r2);

                // The worst window maximally overlaps the lowest partial band
                // and spends the rest in the second lowest.
                let mut total = if min_bands == 1 {
                    TotalUtil::of(lowest, window)
                } else {
                    let second = if lowest == l {
                        r1.min(r2)
                    } else if lowest == r1 {
                        l.min(r2)
                    } else {
                        l.min(r1)
                    };
                    TotalUtil::of(lowest, band_dur) + TotalUtil::of(second, tail_dur)
                };

                if min_bands > 2 {
                    total += bands[i + min_bands - 1].cum_util - bands[i + 1].cum_util;
                }

                BandUtil {
                    index: i,
                    util_bound: total.mean(window),
                }
            })
            .collect()
    }

    /// Computes the exact minimum mutator utilization of windows with a left
    /// edge in band `index`, or `cur_mmu` if none of them is lower.
    ///
    /// The windowed utilization function is continuous and piecewise linear,
    /// with corners where either edge of the window meets a change in the
    /// instantaneous utilization. Its minimum over a range of left edges is
    /// therefore at one of those corners or at the end of the range.
    fn band_mmu(&self, index: usize, window: i64, cur_mmu: f64) -> f64 {
        let mut mmu = cur_mmu;

        let (mut time, band_end) = self.bands.band_time(index);
        let last_start = self.util[self.util.len() - 1].time - window;
        if time > last_start {
            // Every window starting here runs past the end of the function.
            return mmu;
        }
        let end_time = band_end.min(last_start);

        // Track the integral up to each edge of the window.
        let mut left = Integrator::new(&self.util, &self.sums, self.bands[index].pos);
        let mut right = left.clone();
        loop {
            let mu = (right.advance(time + window) - left.advance(time)).mean(window);
            if mu < mmu {
                mmu = mu;
                if mmu <= 0.0 {
                    // Utilization can't go any lower.
                    return 0.0;
                }
            }
            if time >= end_time {
                break;
            }

            // The windowed function's slope is at most 1/window, so it can't
            // drop below mmu for another (mu - mmu) * window nanoseconds.
            let min_time = time + ((mu - mmu) * window as f64) as i64;

            // Move to the next corner: the left edge or the right edge meets
            // a change in utilization.
            let left_next = left.next(time).unwrap_or(i64::MAX);
            let right_next = right.next(time + window).map_or(i64::MAX, |t| t - window);
            time = left_next.min(right_next).max(min_time).min(end_time);
        }
        mmu
    }
}
