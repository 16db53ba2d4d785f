use crate::core::price::PricePoint;

/// Thins a series down to the requested interval.
///
/// The first point is always kept; every later point is kept only if it lies
/// at least `interval_ms` after the last kept point. This is a single greedy
/// pass, not binning or averaging, so applying it twice with the same
/// interval returns the same series.
pub fn resample(points: &[PricePoint], interval_ms: i64) -> Vec<PricePoint> {
    let mut kept: Vec<PricePoint> = Vec::with_capacity(points.len());
    for point in points {
        match kept.last() {
            Some(last) if point.timestamp.saturating_sub(last.timestamp) < interval_ms => {}
            _ => kept.push(*point),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn minute_series(start: i64, count: i64) -> Vec<PricePoint> {
        (0..count)
            .map(|i| PricePoint::new(start + i * 60_000, 1.0 + i as f64))
            .collect()
    }

    #[test]
    fn test_resample_keeps_first_point_and_spacing() {
        let start = 1_700_000_000_000;
        let series = minute_series(start, 181);

        let hourly = resample(&series, 3_600_000);
        let timestamps: Vec<i64> = hourly.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![
                start,
                start + 3_600_000,
                start + 7_200_000,
                start + 10_800_000
            ]
        );
        assert_eq!(hourly[0].price, 1.0);
        assert_eq!(hourly[1].price, 61.0);
    }

    #[test]
    fn test_resample_measures_from_last_kept_point() {
        let points = vec![
            PricePoint::new(0, 1.0),
            PricePoint::new(40, 2.0),
            PricePoint::new(90, 3.0),
            PricePoint::new(120, 4.0),
            PricePoint::new(200, 5.0),
        ];

        let kept: Vec<i64> = resample(&points, 100)
            .iter()
            .map(|p| p.timestamp)
            .collect();
        // 120 is kept because it is 120ms after 0; 200 is only 80ms after 120.
        assert_eq!(kept, vec![0, 120]);
    }

    #[test]
    fn test_resample_extreme_timestamps() {
        let points = vec![
            PricePoint::new(i64::MIN, 1.0),
            PricePoint::new(i64::MAX, 2.0),
            PricePoint::new(0, 3.0),
        ];

        let kept: Vec<i64> = resample(&points, 3_600_000)
            .iter()
            .map(|p| p.timestamp)
            .collect();
        assert_eq!(kept, vec![i64::MIN, i64::MAX]);
    }

    #[test]
    fn test_resample_empty_series() {
        assert!(resample(&[], 60_000).is_empty());
    }

    proptest! {
        #[test]
        fn resample_is_idempotent(
            mut timestamps in proptest::collection::vec(0i64..10_000_000, 0..200),
            interval in 1i64..1_000_000,
        ) {
            timestamps.sort_unstable();
            let series: Vec<PricePoint> = timestamps
                .iter()
                .map(|ts| PricePoint::new(*ts, *ts as f64))
                .collect();

            let once = resample(&series, interval);
            let twice = resample(&once, interval);
            prop_assert_eq!(once, twice);
        }
    }
}
