//! Synthetic popularity history for trying out the viewer without waiting
//! for real observations to accumulate.

use chrono::{Days, NaiveDate};
use rand::Rng;

use crate::model::{parse_date, Observation};

pub const DEFAULT_DAYS: u32 = 30;

const MAX_POPULARITY: i32 = 100;

pub struct DemoTrack {
    pub name: &'static str,
    pub album: &'static str,
    pub release_date: &'static str,
    pub duration: &'static str,
    pub base_popularity: i32,
    pub uri: &'static str,
}

pub const DEMO_TRACKS: &[DemoTrack] = &[
    DemoTrack {
        name: "Glasshouse",
        album: "Glasshouse",
        release_date: "2022-05-20",
        duration: "4:43",
        base_popularity: 44,
        uri: "spotify:track:demo1",
    },
    DemoTrack {
        name: "Low Tide - Night Edit",
        album: "Low Tide (Night Edit)",
        release_date: "2024-04-05",
        duration: "3:51",
        base_popularity: 36,
        uri: "spotify:track:demo2",
    },
    DemoTrack {
        name: "Paper Boats",
        album: "Paper Boats",
        release_date: "2024-10-18",
        duration: "4:24",
        base_popularity: 35,
        uri: "spotify:track:demo3",
    },
];

/// A daily popularity walk around `base`. Each day moves by a random step in
/// [-2, 2], drifts one point back toward `base`, and is clamped to [0, 100].
/// On `spike_day` the value first jumps by 10 to 15.
pub fn popularity_trend<R: Rng + ?Sized>(
    rng: &mut R,
    base: i32,
    days: u32,
    spike_day: Option<u32>,
) -> Vec<i32> {
    let mut current = base;
    let mut trend = Vec::with_capacity(days as usize);

    for day in 0..days {
        if spike_day == Some(day) {
            current += rng.random_range(10..=15);
        }

        let mut change = rng.random_range(-2..=2);
        if current > base {
            change -= 1;
        } else if current < base {
            change += 1;
        }

        current = (current + change).clamp(0, MAX_POPULARITY);
        trend.push(current);
    }
    trend
}

/// Observations for `tracks` over `days` consecutive days ending on `end`.
/// Roughly half the tracks get a spike on a day between 5 and 25.
pub fn generate_history<R: Rng + ?Sized>(
    rng: &mut R,
    tracks: &[DemoTrack],
    end: NaiveDate,
    days: u32,
) -> Vec<Observation> {
    let Some(start) = days
        .checked_sub(1)
        .and_then(|back| end.checked_sub_days(Days::new(back as u64)))
    else {
        return Vec::new();
    };

    let mut history = Vec::with_capacity(tracks.len() * days as usize);
    for track in tracks {
        let spike_day = rng
            .random_bool(0.5)
            .then(|| rng.random_range(5..=25))
            .filter(|day| *day < days);
        let trend = popularity_trend(rng, track.base_popularity, days, spike_day);

        for (date, spi) in start.iter_days().zip(trend) {
            history.push(Observation {
                date,
                track: track.name.to_string(),
                album: track.album.to_string(),
                spi,
                uri: track.uri.to_string(),
                release_date: parse_date(track.release_date),
                duration: track.duration.to_string(),
            });
        }
    }
    history
}
