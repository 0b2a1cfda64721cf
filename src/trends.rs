//! Read-side reductions over the observation history: daily series,
//! per-track statistics and the most recent day-over-day changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::model::Observation;

/// Collapses the history to one observation per (date, track), keeping the
/// last one in stored order. Output is sorted by date, then track name.
pub fn collapse_daily(history: &[Observation]) -> Vec<Observation> {
    let mut latest: BTreeMap<(NaiveDate, &str), &Observation> = BTreeMap::new();
    for observation in history {
        latest.insert((observation.date, observation.track.as_str()), observation);
    }
    latest.into_values().cloned().collect()
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Smallest range covering every observation.
    pub fn spanning(points: &[Observation]) -> Option<Self> {
        let start = points.iter().map(|o| o.date).min()?;
        let end = points.iter().map(|o| o.date).max()?;
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Sorted, distinct track names.
pub fn track_names(points: &[Observation]) -> Vec<String> {
    points
        .iter()
        .map(|o| o.track.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Points inside `range` whose track is in `tracks`. An empty selection keeps
/// every track.
pub fn select<'a>(
    points: &'a [Observation],
    range: &DateRange,
    tracks: &[String],
) -> Vec<&'a Observation> {
    points
        .iter()
        .filter(|o| range.contains(o.date))
        .filter(|o| tracks.is_empty() || tracks.iter().any(|t| t == &o.track))
        .collect()
}

/// Chart series: track name to its (date, popularity) points in date order.
pub fn series<'a, I>(points: I) -> BTreeMap<String, Vec<(NaiveDate, i32)>>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut series: BTreeMap<String, Vec<(NaiveDate, i32)>> = BTreeMap::new();
    for observation in points {
        series
            .entry(observation.track.clone())
            .or_default()
            .push((observation.date, observation.spi));
    }
    for values in series.values_mut() {
        values.sort_by_key(|(date, _)| *date);
    }
    series
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackStatistics {
    pub track: String,
    pub samples: usize,
    pub mean: f64,
    pub min: i32,
    pub max: i32,
    /// Sample standard deviation; absent with fewer than two samples.
    pub std_dev: Option<f64>,
}

pub fn statistics<'a, I>(points: I) -> Vec<TrackStatistics>
where
    I: IntoIterator<Item = &'a Observation>,
{
    series(points)
        .into_iter()
        .filter_map(|(track, values)| {
            let spis: Vec<i32> = values.into_iter().map(|(_, spi)| spi).collect();
            let min = *spis.iter().min()?;
            let max = *spis.iter().max()?;
            let n = spis.len() as f64;
            let mean = spis.iter().map(|&v| v as f64).sum::<f64>() / n;
            let std_dev = (spis.len() > 1).then(|| {
                let variance = spis
                    .iter()
                    .map(|&v| (v as f64 - mean).powi(2))
                    .sum::<f64>()
                    / (n - 1.0);
                variance.sqrt()
            });

            Some(TrackStatistics {
                track,
                samples: spis.len(),
                mean,
                min,
                max,
                std_dev,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopularityDelta {
    pub track: String,
    pub previous: i32,
    pub current: i32,
}

impl PopularityDelta {
    pub fn change(&self) -> i32 {
        self.current - self.previous
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentChanges {
    pub previous_date: NaiveDate,
    pub latest_date: NaiveDate,
    /// Non-zero changes, largest increase first.
    pub deltas: Vec<PopularityDelta>,
}

/// Compares the two most recent distinct dates across the whole dataset.
/// With a single date, that date is compared to itself and nothing changes.
/// Expects collapsed points; returns `None` only for an empty dataset.
pub fn recent_changes(points: &[Observation]) -> Option<RecentChanges> {
    let dates: BTreeSet<NaiveDate> = points.iter().map(|o| o.date).collect();
    let mut newest = dates.iter().rev();
    let latest_date = *newest.next()?;
    let previous_date = newest.next().copied().unwrap_or(latest_date);

    let mut deltas = Vec::new();
    if previous_date != latest_date {
        let previous: HashMap<&str, i32> = points
            .iter()
            .filter(|o| o.date == previous_date)
            .map(|o| (o.track.as_str(), o.spi))
            .collect();

        for observation in points.iter().filter(|o| o.date == latest_date) {
            if let Some(&before) = previous.get(observation.track.as_str()) {
                if before != observation.spi {
                    deltas.push(PopularityDelta {
                        track: observation.track.clone(),
                        previous: before,
                        current: observation.spi,
                    });
                }
            }
        }
        deltas.sort_by(|a, b| {
            b.change()
                .cmp(&a.change())
                .then_with(|| a.track.cmp(&b.track))
        });
    }

    Some(RecentChanges {
        previous_date,
        latest_date,
        deltas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_same_day_duplicates_keep_last_stored() {
        let history = vec![
            record("2024-01-01", "Track A", 10, "u:a"),
            record("2024-01-02", "Track A", 15, "u:a"),
            record("2024-01-01", "Track A", 12, "u:a"),
        ];

        let collapsed = collapse_daily(&history);
        let series = series(&collapsed);

        assert_eq!(series["Track A"], vec![(day(1), 12), (day(2), 15)]);
    }

    #[test]
    fn test_statistics_mean_min_max() {
        let history = vec![
            record("2024-01-01", "Track A", 10, "u:a"),
            record("2024-01-02", "Track A", 20, "u:a"),
            record("2024-01-03", "Track A", 30, "u:a"),
        ];

        let stats = statistics(&history);

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].mean, 20.0);
        assert_eq!(stats[0].min, 10);
        assert_eq!(stats[0].max, 30);
        assert_eq!(stats[0].std_dev, Some(10.0));
    }

    #[test]
    fn test_single_sample_has_no_std_dev() {
        let stats = statistics(&[record("2024-01-01", "Track A", 7, "u:a")]);
        assert_eq!(stats[0].std_dev, None);
        assert_eq!(stats[0].mean, 7.0);
    }

    #[test]
    fn test_select_by_range_and_tracks() {
        let history = vec![
            record("2024-01-01", "Track A", 10, "u:a"),
            record("2024-01-02", "Track A", 11, "u:a"),
            record("2024-01-02", "Track B", 50, "u:b"),
            record("2024-01-05", "Track A", 12, "u:a"),
        ];
        let range = DateRange::new(day(2), day(4));

        let only_a = select(&history, &range, &["Track A".to_string()]);
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].spi, 11);

        let everything = select(&history, &range, &[]);
        assert_eq!(everything.len(), 2);
    }

    #[test]
    fn test_range_spans_data() {
        let history = vec![
            record("2024-01-03", "Track A", 10, "u:a"),
            record("2024-01-01", "Track B", 11, "u:b"),
        ];
        assert_eq!(
            DateRange::spanning(&history),
            Some(DateRange::new(day(1), day(3)))
        );
        assert_eq!(DateRange::spanning(&[]), None);
    }

    #[test]
    fn test_recent_changes_between_last_two_dates() {
        let history = collapse_daily(&[
            record("2024-01-01", "Track A", 1, "u:a"),
            record("2024-01-02", "Track A", 10, "u:a"),
            record("2024-01-02", "Track B", 30, "u:b"),
            record("2024-01-02", "Track C", 5, "u:c"),
            record("2024-01-04", "Track A", 14, "u:a"),
            record("2024-01-04", "Track B", 27, "u:b"),
            record("2024-01-04", "Track C", 5, "u:c"),
            record("2024-01-04", "Track D", 60, "u:d"),
        ]);

        let recent = recent_changes(&history).unwrap();

        assert_eq!(recent.previous_date, day(2));
        assert_eq!(recent.latest_date, day(4));
        let summary: Vec<_> = recent
            .deltas
            .iter()
            .map(|d| (d.track.as_str(), d.change()))
            .collect();
        assert_eq!(summary, vec![("Track A", 4), ("Track B", -3)]);
    }

    #[test]
    fn test_recent_changes_with_single_date() {
        let history = vec![
            record("2024-01-01", "Track A", 10, "u:a"),
            record("2024-01-01", "Track B", 20, "u:b"),
        ];

        let recent = recent_changes(&history).unwrap();

        assert_eq!(recent.previous_date, recent.latest_date);
        assert!(recent.deltas.is_empty());
        assert_eq!(recent_changes(&[]), None);
    }

    #[test]
    fn test_track_names_sorted_unique() {
        let history = vec![
            record("2024-01-01", "b", 1, "u:b"),
            record("2024-01-01", "a", 1, "u:a"),
            record("2024-01-02", "b", 2, "u:b"),
        ];
        assert_eq!(track_names(&history), vec!["a".to_string(), "b".to_string()]);
    }
}
