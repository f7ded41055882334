//! Piecewise linear throughput decay between maintenance events.

use chrono::{DateTime, Utc};
use log::{debug, error};

use super::stats;
use crate::models::{
    days_since_epoch, SegmentStatus, TrendPoint, TrendSegment, DAYS_PER_MONTH,
};

/// Fits one line per interval between consecutive boundaries.
///
/// `boundaries` are the maintenance event timestamps; `now` closes the last
/// interval. Points on a boundary belong to neither side. Intervals with
/// fewer than two points, or without date spread, yield a zero-slope
/// [`SegmentStatus::Degraded`] segment.
pub fn segment_trend(
    trend: &[TrendPoint],
    boundaries: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> Vec<TrendSegment> {
    if trend.is_empty() {
        return Vec::new();
    }

    let mut edges: Vec<DateTime<Utc>> = boundaries.iter().copied().filter(|b| *b < now).collect();
    edges.sort();
    edges.dedup();
    edges.push(now);

    edges
        .windows(2)
        .map(|w| fit_segment(trend, w[0], w[1]))
        .collect()
}

fn fit_segment(trend: &[TrendPoint], start: DateTime<Utc>, end: DateTime<Utc>) -> TrendSegment {
    let (xs, ys): (Vec<f64>, Vec<f64>) = trend
        .iter()
        .filter(|p| p.night > start && p.night < end)
        .map(|p| (days_since_epoch(p.night), p.value))
        .unzip();

    match stats::fit_line(&xs, &ys) {
        Ok(line) => {
            debug!(
                "segment {} .. {}: {} points, {:.4} mag/month",
                start,
                end,
                xs.len(),
                line.slope * DAYS_PER_MONTH
            );
            TrendSegment {
                start,
                end,
                points: xs.len(),
                slope: line.slope,
                slope_per_month: line.slope * DAYS_PER_MONTH,
                intercept: line.intercept,
                status: SegmentStatus::Fitted,
            }
        }
        Err(e) => {
            error!("no throughput model for {} .. {}: {}", start, end, e);
            TrendSegment {
                start,
                end,
                points: xs.len(),
                slope: 0.0,
                slope_per_month: 0.0,
                intercept: stats::mean(&ys).unwrap_or(0.0),
                status: SegmentStatus::Degraded,
            }
        }
    }
}
