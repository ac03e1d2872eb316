//! Stability trend analysis over the level history.
//!
//! Read-only: a least-squares slope over the most recent samples, classified
//! against a noise threshold, with a linear extrapolation to the next stage
//! breakpoint.

use contracts::{
    DecayStage, LevelSample, TrendDirection, TrendReport, LEVEL_MAX, STAGE_BREAKPOINTS,
};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Analyze the most recent `window` samples of `history`.
///
/// Histories with fewer than two distinct timestamps classify as stable with
/// no projection.
pub fn analyze(history: &[LevelSample], window: usize, noise_per_hour: f64) -> TrendReport {
    let window = window.max(2);
    let start = history.len().saturating_sub(window);
    let samples = &history[start..];

    let Some(slope_per_second) = least_squares_slope(samples) else {
        return TrendReport {
            direction: TrendDirection::Stable,
            slope_per_hour: 0.0,
            projected_stage_change_in: None,
        };
    };

    let slope_per_hour = slope_per_second * SECONDS_PER_HOUR;
    let direction = if slope_per_hour.abs() < noise_per_hour.max(0.0) {
        TrendDirection::Stable
    } else if slope_per_hour > 0.0 {
        TrendDirection::Worsening
    } else {
        TrendDirection::Improving
    };

    let projected_stage_change_in = match direction {
        TrendDirection::Stable => None,
        _ => samples
            .last()
            .and_then(|latest| project_breakpoint(latest.level, slope_per_second)),
    };

    TrendReport {
        direction,
        slope_per_hour,
        projected_stage_change_in,
    }
}

/// Slope of the least-squares fit through `(at, level)`, in level units per
/// second. `None` when the samples cannot support a fit.
fn least_squares_slope(samples: &[LevelSample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let t0 = samples[0].at;
    let mean_t = samples
        .iter()
        .map(|sample| (sample.at - t0) as f64)
        .sum::<f64>()
        / n;
    let mean_level = samples.iter().map(|sample| sample.level).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance = 0.0;
    for sample in samples {
        let dt = (sample.at - t0) as f64 - mean_t;
        covariance += dt * (sample.level - mean_level);
        variance += dt * dt;
    }
    if variance == 0.0 {
        return None;
    }
    Some(covariance / variance)
}

/// Seconds until the extrapolated level crosses the next stage breakpoint.
fn project_breakpoint(level: f64, slope_per_second: f64) -> Option<i64> {
    if slope_per_second == 0.0 || !slope_per_second.is_finite() {
        return None;
    }

    let target = if slope_per_second > 0.0 {
        if DecayStage::from_level(level) == DecayStage::Terminal {
            return None;
        }
        STAGE_BREAKPOINTS
            .iter()
            .copied()
            .find(|breakpoint| *breakpoint > level)?
    } else {
        if level <= 0.0 {
            return None;
        }
        STAGE_BREAKPOINTS
            .iter()
            .rev()
            .copied()
            .find(|breakpoint| *breakpoint < level)
            .unwrap_or(0.0)
    };

    let seconds = (target.min(LEVEL_MAX) - level) / slope_per_second;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(seconds.round() as i64)
}
