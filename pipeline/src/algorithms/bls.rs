//! Box least squares (BLS) periodic transit search.
//!
//! The series is folded at every trial period into phase bins holding the
//! summed weights and weighted fluxes. A box of every trial duration then
//! slides cyclically over the bins, and the box with the largest
//! least-squares improvement over a constant model is the candidate.
//!
//! For a box with in-transit weight `W_in`, out-of-transit weight `W_out` and
//! weighted means `ȳ_in`, `ȳ_out`:
//!
//! ```text
//! depth = ȳ_out − ȳ_in
//! power = ½ · depth² · W_in · W_out / (W_in + W_out)     (depth > 0, else 0)
//! ```
//!
//! Weights are `1/σ²`. The search is deterministic: on equal power the first
//! maximum in scan order (period, then duration, then window start) is kept.

use tracing::debug;

use crate::api::{DetectionParameters, ProcessedSeries, TransitCandidate};

/// Upper bound on phase bins per fold, reached only for tiny duration fractions.
const MAX_PHASE_BINS: usize = 100_000;

/// Trial periods and duration fractions derived from [`DetectionParameters`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchGrid {
    pub periods: Vec<f64>,
    pub duration_fractions: Vec<f64>,
    pub phase_bins: usize,
}

impl SearchGrid {
    /// Build the grid, or `None` when the parameters cannot produce one.
    ///
    /// Rejected: non-finite bounds, non-positive periods, `min >= max` for
    /// either range, duration fractions outside `(0, 1]`, zero steps.
    pub fn from_parameters(params: &DetectionParameters) -> Option<Self> {
        let [p_min, p_max] = params.period_range;
        let [q_min, q_max] = params.duration_range;

        let finite = [p_min, p_max, q_min, q_max].iter().all(|v| v.is_finite());
        if !finite || p_min <= 0.0 || p_min >= p_max {
            return None;
        }
        if q_min <= 0.0 || q_max > 1.0 || q_min >= q_max {
            return None;
        }
        if params.period_steps == 0 || params.duration_steps == 0 || params.phase_oversample == 0 {
            return None;
        }

        let periods = linear_grid(p_min, p_max, params.period_steps);
        let duration_fractions = linear_grid(q_min, q_max, params.duration_steps);
        let phase_bins = ((params.phase_oversample as f64 / q_min).ceil() as usize)
            .clamp(2, MAX_PHASE_BINS);

        Some(Self {
            periods,
            duration_fractions,
            phase_bins,
        })
    }
}

/// `steps` points from `start` (inclusive) towards `end` (exclusive).
fn linear_grid(start: f64, end: f64, steps: usize) -> Vec<f64> {
    let step = (end - start) / steps as f64;
    (0..steps).map(|i| start + i as f64 * step).collect()
}

/// Best box found so far.
///
/// Replacement requires strictly greater power, so the first maximum in scan
/// order survives ties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BestBox {
    pub period: f64,
    pub duration_fraction: f64,
    pub depth: f64,
    pub power: f64,
}

pub(crate) fn offer(best: &mut Option<BestBox>, candidate: BestBox) {
    match best {
        Some(current) if candidate.power > current.power => *current = candidate,
        Some(_) => {}
        None => *best = Some(candidate),
    }
}

/// Depth and power of one box, or `None` when either side has no weight.
///
/// `sum_wy_in` is the in-transit weighted sum of mean-subtracted flux, so the
/// out-of-transit sum is its negation.
fn evaluate_box(w_in: f64, sum_wy_in: f64, total_w: f64) -> Option<(f64, f64)> {
    let w_out = total_w - w_in;
    // Sliding sums drift; treat near-zero weight as empty.
    let tolerance = total_w * 1e-12;
    if w_in <= tolerance || w_out <= tolerance {
        return None;
    }
    let mean_in = sum_wy_in / w_in;
    let mean_out = -sum_wy_in / w_out;
    let depth = mean_out - mean_in;
    let power = if depth > 0.0 {
        0.5 * depth * depth * w_in * w_out / total_w
    } else {
        0.0
    };
    Some((depth, power))
}

/// Run the periodic box search and return the single best candidate.
///
/// Degenerate input returns [`TransitCandidate::absent`] rather than an
/// error: empty or mismatched sequences, an unusable parameter grid, or no
/// sample with a positive finite uncertainty.
///
/// # Arguments
/// * `series` - Processed series; samples with non-finite or non-positive
///   uncertainty stay in the fold with zero weight
/// * `params` - Search ranges and grid resolution
///
/// # Returns
/// The candidate with `duration = fraction × period` in the series' time unit.
pub fn detect(series: &ProcessedSeries, params: &DetectionParameters) -> TransitCandidate {
    if series.is_empty() || !series.is_consistent() {
        debug!(
            identifier = %series.identifier,
            time = series.time.len(),
            flux = series.flux.len(),
            flux_err = series.flux_err.len(),
            "Empty or mismatched series, skipping search"
        );
        return TransitCandidate::absent();
    }

    let Some(grid) = SearchGrid::from_parameters(params) else {
        debug!(identifier = %series.identifier, ?params, "Unusable search grid");
        return TransitCandidate::absent();
    };

    // Samples with unusable time or flux also get zero weight.
    let weights: Vec<f64> = series
        .flux_err
        .iter()
        .zip(series.time.iter().zip(&series.flux))
        .map(|(&sigma, (&t, &y))| {
            if sigma.is_finite() && sigma > 0.0 && t.is_finite() && y.is_finite() {
                1.0 / (sigma * sigma)
            } else {
                0.0
            }
        })
        .collect();

    let total_w: f64 = weights.iter().sum();
    if !(total_w > 0.0 && total_w.is_finite()) {
        debug!(identifier = %series.identifier, "No sample carries usable weight");
        return TransitCandidate::absent();
    }

    let mean = weights
        .iter()
        .zip(&series.flux)
        .filter(|(w, _)| **w > 0.0)
        .map(|(&w, &y)| w * y)
        .sum::<f64>()
        / total_w;

    let t0 = series
        .time
        .iter()
        .zip(&weights)
        .filter(|(_, w)| **w > 0.0)
        .map(|(&t, _)| t)
        .fold(f64::INFINITY, f64::min);

    let nb = grid.phase_bins;
    let mut bin_w = vec![0.0_f64; nb];
    let mut bin_wy = vec![0.0_f64; nb];
    let mut best: Option<BestBox> = None;

    for &period in &grid.periods {
        bin_w.iter_mut().for_each(|v| *v = 0.0);
        bin_wy.iter_mut().for_each(|v| *v = 0.0);

        for ((&t, &y), &w) in series.time.iter().zip(&series.flux).zip(&weights) {
            if w == 0.0 {
                continue;
            }
            let phase = ((t - t0) / period).rem_euclid(1.0);
            let bin = ((phase * nb as f64) as usize).min(nb - 1);
            bin_w[bin] += w;
            bin_wy[bin] += w * (y - mean);
        }

        for &fraction in &grid.duration_fractions {
            let width = ((fraction * nb as f64).round() as usize).max(1);
            if width >= nb {
                continue;
            }

            let mut w_in: f64 = bin_w[..width].iter().sum();
            let mut wy_in: f64 = bin_wy[..width].iter().sum();

            for start in 0..nb {
                if start > 0 {
                    let leaving = start - 1;
                    let entering = (start + width - 1) % nb;
                    w_in += bin_w[entering] - bin_w[leaving];
                    wy_in += bin_wy[entering] - bin_wy[leaving];
                }

                if let Some((depth, power)) = evaluate_box(w_in, wy_in, total_w) {
                    offer(
                        &mut best,
                        BestBox {
                            period,
                            duration_fraction: fraction,
                            depth,
                            power,
                        },
                    );
                }
            }
        }
    }

    match best {
        Some(b) => TransitCandidate {
            period: Some(b.period),
            duration: Some(b.duration_fraction * b.period),
            depth: Some(b.depth),
            power: Some(b.power),
        },
        None => TransitCandidate::absent(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ObjectIdentifier;

    fn series(time: Vec<f64>, flux: Vec<f64>, flux_err: Vec<f64>) -> ProcessedSeries {
        ProcessedSeries {
            identifier: ObjectIdentifier::new("TIC 1").unwrap(),
            time,
            flux,
            flux_err,
        }
    }

    /// 27 days at 0.02 d cadence with a box dip every `period` days.
    fn synthetic(period: Option<f64>) -> ProcessedSeries {
        let n = 1350;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.02).collect();
        let flux = time
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let noise = 1e-4 * ((i as f64) * 1.7).sin();
                let dip = match period {
                    Some(p) if ((t - 0.5).rem_euclid(p)) < 0.05 * p => 0.01,
                    _ => 0.0,
                };
                1.0 + noise - dip
            })
            .collect();
        series(time, flux, vec![1e-3; n])
    }

    fn search_params() -> DetectionParameters {
        DetectionParameters::new([1.0, 5.0], [0.02, 0.1]).with_steps(400, 8)
    }

    #[test]
    fn test_grid_is_half_open() {
        let grid = SearchGrid::from_parameters(
            &DetectionParameters::new([1.0, 2.0], [0.125, 0.25]).with_steps(4, 2),
        )
        .unwrap();
        assert_eq!(grid.periods, vec![1.0, 1.25, 1.5, 1.75]);
        assert_eq!(grid.duration_fractions, vec![0.125, 0.1875]);
        assert_eq!(grid.phase_bins, 80);
    }

    #[test]
    fn test_grid_rejects_bad_ranges() {
        let inverted = DetectionParameters::new([5.0, 1.0], [0.01, 0.1]);
        assert!(SearchGrid::from_parameters(&inverted).is_none());
        let equal = DetectionParameters::new([2.0, 2.0], [0.01, 0.1]);
        assert!(SearchGrid::from_parameters(&equal).is_none());
        let negative = DetectionParameters::new([-1.0, 2.0], [0.01, 0.1]);
        assert!(SearchGrid::from_parameters(&negative).is_none());
        let wide = DetectionParameters::new([1.0, 2.0], [0.5, 1.5]);
        assert!(SearchGrid::from_parameters(&wide).is_none());
        let nan = DetectionParameters::new([1.0, f64::NAN], [0.01, 0.1]);
        assert!(SearchGrid::from_parameters(&nan).is_none());
    }

    #[test]
    fn test_degenerate_inputs_are_absent() {
        let params = search_params();
        assert!(detect(&series(vec![], vec![], vec![]), &params).is_absent());
        assert!(detect(&series(vec![0.0, 1.0], vec![1.0], vec![0.1, 0.1]), &params).is_absent());

        let inverted = DetectionParameters::new([5.0, 1.0], [0.02, 0.1]);
        assert!(detect(&synthetic(Some(3.0)), &inverted).is_absent());
    }

    #[test]
    fn test_zero_weight_everywhere_is_absent() {
        let mut s = synthetic(Some(3.0));
        s.flux_err.iter_mut().for_each(|e| *e = 0.0);
        assert!(detect(&s, &search_params()).is_absent());

        s.flux_err.iter_mut().for_each(|e| *e = f64::NAN);
        assert!(detect(&s, &search_params()).is_absent());
    }

    #[test]
    fn test_recovers_injected_period() {
        let params = search_params();
        let candidate = detect(&synthetic(Some(3.0)), &params);

        let period = candidate.period.unwrap();
        assert!(
            (period - 3.0).abs() <= params.period_step() + 1e-9,
            "recovered period {} not within one grid step of 3.0",
            period
        );
        let depth = candidate.depth.unwrap();
        assert!((depth - 0.01).abs() < 0.003, "depth {}", depth);
        let duration = candidate.duration.unwrap();
        assert!(duration > 0.0 && duration < 0.1 * period);

        let flat = detect(&synthetic(None), &params);
        assert!(candidate.power.unwrap() > flat.power.unwrap_or(0.0));
    }

    #[test]
    fn test_detect_is_deterministic() {
        let s = synthetic(Some(2.2));
        let params = search_params();
        assert_eq!(detect(&s, &params), detect(&s, &params));
    }

    #[test]
    fn test_zero_weight_samples_do_not_shift_result() {
        let params = search_params();
        let clean = synthetic(Some(3.0));
        let mut noisy = clean.clone();
        // Wild flux values with unusable uncertainty must be ignored.
        for i in (0..noisy.len()).step_by(97) {
            noisy.flux[i] = 50.0;
            noisy.flux_err[i] = -1.0;
        }
        let a = detect(&clean, &params);
        let b = detect(&noisy, &params);
        assert!((a.period.unwrap() - b.period.unwrap()).abs() <= params.period_step() + 1e-9);
    }

    #[test]
    fn test_ties_keep_first_maximum() {
        let mut best = None;
        let first = BestBox {
            period: 1.0,
            duration_fraction: 0.1,
            depth: 0.5,
            power: 2.0,
        };
        offer(&mut best, first);
        offer(
            &mut best,
            BestBox {
                period: 2.0,
                ..first
            },
        );
        assert_eq!(best.unwrap().period, 1.0);

        offer(
            &mut best,
            BestBox {
                period: 3.0,
                power: 2.5,
                ..first
            },
        );
        assert_eq!(best.unwrap().period, 3.0);
    }

    #[test]
    fn test_brightening_has_zero_power() {
        let (depth, power) = evaluate_box(1.0, 0.5, 4.0).unwrap();
        assert!(depth < 0.0);
        assert_eq!(power, 0.0);

        let (depth, power) = evaluate_box(1.0, -0.5, 4.0).unwrap();
        assert!(depth > 0.0);
        // depth = 0.5/3 + 0.5 = 2/3; power = ½·(4/9)·1·3/4
        assert!((depth - 2.0 / 3.0).abs() < 1e-12);
        assert!((power - 1.0 / 6.0).abs() < 1e-12);
        assert!(evaluate_box(4.0, 0.0, 4.0).is_none());
    }
}
