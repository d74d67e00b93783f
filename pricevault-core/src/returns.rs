//! Trailing percentage returns over adjusted close.
//!
//! return_k[i] = (adj_close[i] - adj_close[i-k]) / adj_close[i-k]
//!
//! Offsets count observations, not calendar days: a gap in the fetched
//! series stretches the window instead of being filled. Only the batch that
//! was fetched is looked at, so the first `k` rows of every batch are null.

use crate::domain::{Observation, ReturnRow};

/// Horizons, in trading observations, of the stored return columns.
pub const RETURN_HORIZONS: [usize; 3] = [1, 5, 21];

/// Percentage change over `k` positions.
///
/// Null where `i < k`, where either value is null or non-finite, and where
/// the base value is zero.
pub fn pct_change(series: &[Option<f64>], k: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| {
            if k == 0 || i < k {
                return None;
            }
            let prev = series[i - k]?;
            let curr = series[i]?;
            if !prev.is_finite() || !curr.is_finite() || prev == 0.0 {
                return None;
            }
            Some((curr - prev) / prev)
        })
        .collect()
}

/// One return row per observation, in the same order.
///
/// Callers pass a date-ordered series; raw close is never consulted.
pub fn compute_returns(observations: &[Observation]) -> Vec<ReturnRow> {
    let adj: Vec<Option<f64>> = observations.iter().map(|o| o.adj_close).collect();
    let [h1, h5, h21] = RETURN_HORIZONS;
    let r1 = pct_change(&adj, h1);
    let r5 = pct_change(&adj, h5);
    let r21 = pct_change(&adj, h21);

    observations
        .iter()
        .enumerate()
        .map(|(i, obs)| ReturnRow {
            date: obs.date,
            return_1d: r1[i],
            return_5d: r5[i],
            return_21d: r21[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(day: u32, close: f64, adj_close: Option<f64>) -> Observation {
        Observation {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            open: Some(close),
            high: Some(close),
            low: Some(close),
            close: Some(close),
            volume: Some(1),
            adj_close,
        }
    }

    fn approx(a: Option<f64>, b: f64) {
        let a = a.expect("expected a value");
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn pct_change_basic() {
        let series = [Some(100.0), Some(110.0), Some(121.0)];
        let r = pct_change(&series, 1);
        assert_eq!(r[0], None);
        approx(r[1], 0.10);
        approx(r[2], 0.10);

        let r2 = pct_change(&series, 2);
        assert_eq!(r2[..2], [None, None]);
        approx(r2[2], 0.21);
    }

    #[test]
    fn pct_change_negative() {
        let r = pct_change(&[Some(100.0), Some(90.0)], 1);
        approx(r[1], -0.10);
    }

    #[test]
    fn nulls_and_zero_base_propagate() {
        let series = [Some(0.0), Some(5.0), None, Some(7.0), Some(f64::NAN)];
        let r = pct_change(&series, 1);
        assert_eq!(r, vec![None, None, None, None, None]);
    }

    #[test]
    fn horizon_longer_than_series_is_all_null() {
        let r = pct_change(&[Some(1.0), Some(2.0)], 21);
        assert_eq!(r, vec![None, None]);
    }

    #[test]
    fn uses_adjusted_close_not_close() {
        let rows = compute_returns(&[obs(1, 50.0, Some(100.0)), obs(4, 999.0, Some(102.0))]);
        approx(rows[1].return_1d, 0.02);
    }

    #[test]
    fn one_row_per_observation_with_dates() {
        let input: Vec<Observation> = (1..=25)
            .map(|d| obs(d, 1.0, Some(100.0 + d as f64)))
            .collect();
        let rows = compute_returns(&input);
        assert_eq!(rows.len(), 25);
        for (row, o) in rows.iter().zip(&input) {
            assert_eq!(row.date, o.date);
        }
        assert!(rows[4].return_5d.is_none());
        assert!(rows[5].return_5d.is_some());
        assert!(rows[20].return_21d.is_none());
        approx(rows[21].return_21d, (122.0 - 101.0) / 101.0);
    }

    #[test]
    fn empty_input() {
        assert!(compute_returns(&[]).is_empty());
    }
}
