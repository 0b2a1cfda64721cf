use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use log::{error, info};

use popularity_tracker::config::{self, StoreConfig};
use popularity_tracker::logger;
use popularity_tracker::seed::{self, DEFAULT_DAYS, DEMO_TRACKS};
use popularity_tracker::store;

/// Fills the observation store with synthetic daily history for demo tracks.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of days of history, ending today.
    #[arg(long, default_value_t = DEFAULT_DAYS)]
    days: u32,

    /// Keep existing observations instead of clearing the table first.
    #[arg(long)]
    no_reset: bool,
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

    if !args.no_reset {
        match store.reset().await {
            Ok(removed) => info!("Cleared {} existing observations", removed),
            Err(e) => {
                error!("Could not clear existing observations: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let today = Local::now().date_naive();
    let history = seed::generate_history(&mut rand::rng(), DEMO_TRACKS, today, args.days);

    info!("Generating test data...");
    let mut written = 0;
    for observation in &history {
        match store.create(observation).await {
            Ok(()) => written += 1,
            Err(e) => error!(
                "Error writing {} on {}: {}",
                observation.track, observation.date, e
            ),
        }
    }

    println!(
        "Created {} of {} observations: {} days for {} tracks.",
        written,
        history.len(),
        args.days,
        DEMO_TRACKS.len()
    );
    ExitCode::SUCCESS
}
