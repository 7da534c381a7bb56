//! Feature synthesis
//!
//! This module derives the classifier's features for the newest reading in a
//! history buffer:
//! - Jerk: sample-to-sample change of each acceleration axis
//! - Rolling mean over whatever the window currently holds (minimum period 1)
//! - Rolling sample standard deviation (N-1 denominator, minimum period 2)
//!
//! A value that overflows to infinity or NaN is reported as missing.

use crate::history::HistoryBuffer;
use crate::types::{AccelAxis, FeatureRow};

/// Feature synthesizer over a history buffer
pub struct FeatureSynthesizer;

impl FeatureSynthesizer {
    /// Synthesize the feature row for the newest reading in `history`
    pub fn synthesize(history: &HistoryBuffer) -> FeatureRow {
        let [x, y, z] = AccelAxis::ALL.map(|axis| AxisFeatures::compute(history, axis));

        FeatureRow {
            acc_x_jerk: x.jerk,
            acc_y_jerk: y.jerk,
            acc_z_jerk: z.jerk,
            acc_x_rolling_mean: x.mean,
            acc_x_rolling_std: x.std,
            acc_y_rolling_mean: y.mean,
            acc_y_rolling_std: y.std,
            acc_z_rolling_mean: z.mean,
            acc_z_rolling_std: z.std,
        }
    }
}

struct AxisFeatures {
    jerk: Option<f64>,
    mean: Option<f64>,
    std: Option<f64>,
}

impl AxisFeatures {
    fn compute(history: &HistoryBuffer, axis: AccelAxis) -> Self {
        let jerk = compute_jerk(history, axis).filter(|v| v.is_finite());
        let mean = rolling_mean(history, axis).filter(|v| v.is_finite());
        let std = mean
            .and_then(|m| rolling_std(history.acc_column(axis), m))
            .filter(|v| v.is_finite());

        Self { jerk, mean, std }
    }
}

/// Difference between the newest and the previous reading
fn compute_jerk(history: &HistoryBuffer, axis: AccelAxis) -> Option<f64> {
    match (history.latest(), history.previous()) {
        (Some(current), Some(previous)) => Some(current.acc(axis) - previous.acc(axis)),
        _ => None,
    }
}

/// Arithmetic mean; undefined only for an empty window.
///
/// Falls back to an incremental update when the plain sum overflows, so a
/// window of finite values always has a finite mean.
fn rolling_mean(history: &HistoryBuffer, axis: AccelAxis) -> Option<f64> {
    if history.is_empty() {
        return None;
    }

    let count = history.len() as f64;
    let sum: f64 = history.acc_column(axis).sum();
    if sum.is_finite() {
        return Some(sum / count);
    }

    let (_, mean) = history.acc_column(axis).fold((0.0, 0.0), |(n, m), v| {
        let n = n + 1.0;
        (n, (m - m / n) + v / n)
    });
    Some(mean)
}

/// Sample standard deviation around `mean`; a single point has no spread
fn rolling_std(values: impl Iterator<Item = f64>, mean: f64) -> Option<f64> {
    let (count, sum_sq) = values.fold((0usize, 0.0), |(n, s), v| {
        let d = v - mean;
        (n + 1, s + d * d)
    });
    if count < 2 {
        return None;
    }
    Some((sum_sq / (count - 1) as f64).sqrt())
}
