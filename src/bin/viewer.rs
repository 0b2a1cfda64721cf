use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use log::{error, info, warn};

use popularity_tracker::config::{self, StoreConfig};
use popularity_tracker::logger;
use popularity_tracker::model::Observation;
use popularity_tracker::store::{self, ObservationQuery};
use popularity_tracker::trends::{self, DateRange, RecentChanges, TrackStatistics};

/// How many tracks are shown when none are selected.
const DEFAULT_SELECTION: usize = 5;

/// Popularity trends, statistics and recent changes from the observation log.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// First day to include (YYYY-MM-DD). Defaults to the earliest observation.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD). Defaults to the latest observation.
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Track to display; repeat for several. Defaults to the first five by name.
    #[arg(long = "track")]
    tracks: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    if let Err(e) = logger::init(config::log_level()) {
        eprintln!("Failed to install logger: {}", e);
        return ExitCode::FAILURE;
    }

    let store_config = match StoreConfig::from_env() {
        Ok(store_config) => store_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let store = match store::connect(&store_config, false).await {
        Ok(store) => store,
        Err(e) => {
            error!("Could not open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let history = match store.query(&ObservationQuery::all()).await {
        Ok(history) => history,
        Err(e) => {
            error!("Could not load observations: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Loaded {} observations", history.len());

    let daily = trends::collapse_daily(&history);
    let Some(span) = DateRange::spanning(&daily) else {
        println!("No observations recorded yet.");
        return ExitCode::SUCCESS;
    };

    let range = DateRange::new(args.start.unwrap_or(span.start), args.end.unwrap_or(span.end));
    if range.start > range.end {
        warn!("Start date {} is after end date {}", range.start, range.end);
    }

    let tracks = if args.tracks.is_empty() {
        trends::track_names(&daily)
            .into_iter()
            .take(DEFAULT_SELECTION)
            .collect()
    } else {
        args.tracks
    };

    let selected = trends::select(&daily, &range, &tracks);

    println!("Popularity over time ({} to {})", range.start, range.end);
    print_series(&selected);

    println!();
    println!("Track statistics");
    print_statistics(&trends::statistics(selected.iter().copied()));

    println!();
    println!("Recent changes");
    match trends::recent_changes(&daily) {
        Some(recent) => print_changes(&recent),
        None => println!("No changes in the last update."),
    }

    ExitCode::SUCCESS
}

fn print_series(points: &[&Observation]) {
    let series = trends::series(points.iter().copied());
    if series.is_empty() {
        println!("(no data in range)");
        return;
    }

    let names: Vec<&String> = series.keys().collect();
    let mut dates: Vec<NaiveDate> = series
        .values()
        .flat_map(|values| values.iter().map(|(date, _)| *date))
        .collect();
    dates.sort();
    dates.dedup();

    print!("{:<12}", "Date");
    for name in &names {
        print!(" {:>20}", truncate(name, 20));
    }
    println!();

    for date in dates {
        print!("{:<12}", date.to_string());
        for name in &names {
            let value = series[*name]
                .iter()
                .find(|(day, _)| *day == date)
                .map(|(_, spi)| spi.to_string())
                .unwrap_or_else(|| "-".to_string());
            print!(" {:>20}", value);
        }
        println!();
    }
}

fn print_statistics(stats: &[TrackStatistics]) {
    if stats.is_empty() {
        println!("(no tracks selected)");
        return;
    }

    println!(
        "{:<30} {:>8} {:>8} {:>8} {:>8}",
        "Track", "Average", "Lowest", "Highest", "Std Dev"
    );
    for stat in stats {
        let std_dev = stat
            .std_dev
            .map(|value| format!("{:.2}", value))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<30} {:>8.2} {:>8} {:>8} {:>8}",
            truncate(&stat.track, 30),
            stat.mean,
            stat.min,
            stat.max,
            std_dev
        );
    }
}

fn print_changes(recent: &RecentChanges) {
    if recent.deltas.is_empty() {
        println!("No changes in the last update.");
        return;
    }

    println!("{} -> {}", recent.previous_date, recent.latest_date);
    for delta in &recent.deltas {
        let arrow = if delta.change() > 0 { "↑" } else { "↓" };
        println!(
            "{}: {} → {} ({} {})",
            delta.track,
            delta.previous,
            delta.current,
            arrow,
            delta.change().abs()
        );
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut short: String = value.chars().take(width.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}
