//! Compares freshly resolved popularity against the last stored observation
//! and records one observation per change.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use indicatif::ProgressBar;
use log::{debug, error, info};

use crate::model::TrackSnapshot;
use crate::store::ObservationStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedChange {
    pub track: TrackSnapshot,
    /// `None` on first sight.
    pub previous: Option<i32>,
}

impl LoggedChange {
    pub fn current(&self) -> i32 {
        self.track.popularity
    }

    pub fn delta(&self) -> Option<i32> {
        self.previous.map(|previous| self.current() - previous)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub date: NaiveDate,
    pub tracks_seen: usize,
    pub unchanged: usize,
    pub changes: Vec<LoggedChange>,
    pub lookup_failures: usize,
    pub write_failures: usize,
}

impl RunReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            tracks_seen: 0,
            unchanged: 0,
            changes: Vec::new(),
            lookup_failures: 0,
            write_failures: 0,
        }
    }

    pub fn changes_logged(&self) -> usize {
        self.changes.len()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary for {}:", self.date)?;
        writeln!(
            f,
            "Tracked {} songs, logged {} popularity changes.",
            self.tracks_seen,
            self.changes_logged()
        )?;

        if self.changes.is_empty() {
            writeln!(f, "No popularity changes detected today.")?;
        } else {
            writeln!(f)?;
            writeln!(f, "Tracks with popularity changes:")?;
            for change in &self.changes {
                let track = &change.track;
                let released = track
                    .release_date
                    .map(|date| date.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let movement = match (change.previous, change.delta()) {
                    (Some(previous), Some(delta)) => {
                        format!("{} -> {} ({:+})", previous, change.current(), delta)
                    }
                    _ => "first sight".to_string(),
                };
                writeln!(
                    f,
                    "- {} ({}) - {}/100 - {} - Released: {} [{}]",
                    track.name,
                    track.album,
                    track.popularity,
                    track.formatted_duration(),
                    released,
                    movement
                )?;
            }
        }

        if self.lookup_failures > 0 || self.write_failures > 0 {
            writeln!(f)?;
            writeln!(
                f,
                "Skipped {} tracks whose history could not be read and {} whose write failed.",
                self.lookup_failures, self.write_failures
            )?;
        }
        Ok(())
    }
}

pub struct ChangeRecorder<'a, S: ObservationStore + ?Sized> {
    store: &'a S,
    write_delay: Duration,
}

impl<'a, S: ObservationStore + ?Sized> ChangeRecorder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            write_delay: Duration::ZERO,
        }
    }

    /// Pause between successive creates, for the store's request-rate policy.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Records today's observation for every track that is new or whose
    /// popularity moved. Per-track failures are logged and counted.
    pub async fn record<'t, I>(
        &self,
        tracks: I,
        today: NaiveDate,
        progress: &ProgressBar,
    ) -> RunReport
    where
        I: IntoIterator<Item = &'t TrackSnapshot>,
    {
        let mut report = RunReport::new(today);
        let mut wrote_before = false;

        info!("Processing tracks for date: {}", today);
        for track in tracks {
            report.tracks_seen += 1;
            progress.set_message(track.name.clone());
            self.check(track, today, &mut report, &mut wrote_before).await;
            progress.inc(1);
        }

        info!(
            "Checked {} tracks: {} changed, {} unchanged, {} lookup failures, {} write failures",
            report.tracks_seen,
            report.changes_logged(),
            report.unchanged,
            report.lookup_failures,
            report.write_failures
        );
        report
    }

    async fn check(
        &self,
        track: &TrackSnapshot,
        today: NaiveDate,
        report: &mut RunReport,
        wrote_before: &mut bool,
    ) {
        debug!("Checking track: {}", track.name);

        let previous = match self.store.latest_for_uri(&track.uri).await {
            Ok(last) => last.map(|observation| observation.spi),
            Err(e) => {
                error!("Error reading history for {}: {}", track.name, e);
                report.lookup_failures += 1;
                return;
            }
        };

        match previous {
            None => info!("No previous record found for {}", track.name),
            Some(last) if last != track.popularity => info!(
                "Popularity of {} changed from {} to {}",
                track.name, last, track.popularity
            ),
            Some(_) => {
                debug!("No popularity change for {}", track.name);
                report.unchanged += 1;
                return;
            }
        }

        if *wrote_before && !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        *wrote_before = true;

        match self.store.create(&track.observe(today)).await {
            Ok(()) => {
                info!("Logged {} - SPI: {}", track.name, track.popularity);
                report.changes.push(LoggedChange {
                    track: track.clone(),
                    previous,
                });
            }
            Err(e) => {
                error!("Error logging {}: {}", track.name, e);
                report.write_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObservationQuery;
    use crate::testing::{record, snapshot, MemoryStore};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_first_sight_records_once() {
        let store = MemoryStore::default();
        let tracks = vec![snapshot("t1", "Track A", 37)];

        let report = ChangeRecorder::new(&store)
            .record(&tracks, today(), &ProgressBar::hidden())
            .await;

        let stored = store.observations();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].spi, 37);
        assert_eq!(stored[0].date, today());
        assert_eq!(report.changes_logged(), 1);
        assert_eq!(report.changes[0].previous, None);
        assert_eq!(report.changes[0].delta(), None);
    }

    #[tokio::test]
    async fn test_unchanged_popularity_is_not_written() {
        let store = MemoryStore::default()
            .with_observations(vec![record("2024-02-28", "Track A", 37, "spotify:track:t1")]);
        let tracks = vec![snapshot("t1", "Track A", 37)];

        let report = ChangeRecorder::new(&store)
            .record(&tracks, today(), &ProgressBar::hidden())
            .await;

        assert_eq!(store.observations().len(), 1);
        assert_eq!(report.changes_logged(), 0);
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_changed_popularity_is_written_with_delta() {
        let store = MemoryStore::default().with_observations(vec![
            record("2024-02-27", "Track A", 52, "spotify:track:t1"),
            record("2024-02-28", "Track A", 40, "spotify:track:t1"),
        ]);
        let tracks = vec![snapshot("t1", "Track A", 45)];

        let report = ChangeRecorder::new(&store)
            .record(&tracks, today(), &ProgressBar::hidden())
            .await;

        let latest = store
            .query(&ObservationQuery::latest_for_uri("spotify:track:t1"))
            .await
            .unwrap();
        assert_eq!(latest[0].spi, 45);
        assert_eq!(store.observations().len(), 3);
        assert_eq!(report.changes[0].previous, Some(40));
        assert_eq!(report.changes[0].delta(), Some(5));
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_the_run() {
        let store = MemoryStore::default().failing_write("spotify:track:t1");
        let tracks = vec![snapshot("t1", "Track A", 10), snapshot("t2", "Track B", 20)];

        let report = ChangeRecorder::new(&store)
            .record(&tracks, today(), &ProgressBar::hidden())
            .await;

        assert_eq!(report.tracks_seen, 2);
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.changes_logged(), 1);
        assert_eq!(report.changes[0].track.id, "t2");
        assert_eq!(store.observations().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_track() {
        let store = MemoryStore::default().failing_lookup("spotify:track:t1");
        let tracks = vec![snapshot("t1", "Track A", 10), snapshot("t2", "Track B", 20)];

        let report = ChangeRecorder::new(&store)
            .record(&tracks, today(), &ProgressBar::hidden())
            .await;

        assert_eq!(report.lookup_failures, 1);
        assert_eq!(report.changes_logged(), 1);
        assert_eq!(store.observations()[0].uri, "spotify:track:t2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_writes() {
        let store = MemoryStore::default();
        let tracks = vec![
            snapshot("t1", "Track A", 10),
            snapshot("t2", "Track B", 20),
            snapshot("t3", "Track C", 30),
        ];
        let started = tokio::time::Instant::now();

        ChangeRecorder::new(&store)
            .with_write_delay(Duration::from_millis(200))
            .record(&tracks, today(), &ProgressBar::hidden())
            .await;

        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[test]
    fn test_report_summary() {
        let mut report = RunReport::new(today());
        report.tracks_seen = 3;
        report.changes.push(LoggedChange {
            track: snapshot("t1", "Track A", 45),
            previous: Some(40),
        });
        report.changes.push(LoggedChange {
            track: snapshot("t2", "Track B", 12),
            previous: None,
        });

        let text = report.to_string();
        assert!(text.contains("Tracked 3 songs, logged 2 popularity changes."));
        assert!(text.contains(
            "- Track A (Album) - 45/100 - 3:20 - Released: 2022-05-20 [40 -> 45 (+5)]"
        ));
        assert!(text.contains("[first sight]"));
        assert!(!text.contains("Skipped"));
    }

    #[test]
    fn test_empty_report_summary() {
        let report = RunReport::new(today());
        assert!(report
            .to_string()
            .contains("No popularity changes detected today."));
    }
}
