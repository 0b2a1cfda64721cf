use std::process::ExitCode;

use chrono::Local;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info};
use thiserror::Error;

use popularity_tracker::catalog::{CatalogError, SpotifyClient};
use popularity_tracker::config::{self, Config, ConfigError};
use popularity_tracker::detector::{ChangeRecorder, RunReport};
use popularity_tracker::logger;
use popularity_tracker::policy::PolicyError;
use popularity_tracker::resolver::CatalogResolver;
use popularity_tracker::store::{self, StoreError};

/// Failures that prevent a run from starting at all.
#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("inclusion policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("catalog client: {0}")]
    Catalog(#[from] CatalogError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let multi = match logger::init(config::log_level()) {
        Ok(multi) => multi,
        Err(e) => {
            eprintln!("Failed to install logger: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&multi).await {
        Ok(report) => {
            println!();
            print!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run aborted before processing: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(multi: &MultiProgress) -> Result<RunReport, StartupError> {
    info!("Starting popularity tracking...");
    let config = Config::from_env()?;
    let policy = config.policy.build()?;

    info!("Initializing catalog client...");
    let catalog =
        SpotifyClient::connect(&config.spotify_client_id, &config.spotify_client_secret).await?;

    info!("Initializing store...");
    let store = store::connect(&config.store, config.dry_run).await?;

    let albums_bar = multi.add(progress_bar("albums"));
    let resolved = CatalogResolver::new(&catalog, &policy)
        .with_album_groups(&config.album_groups)
        .resolve(&config.artist_id, &albums_bar)
        .await;
    albums_bar.finish_and_clear();

    let today = Local::now().date_naive();
    let tracks_bar = multi.add(progress_bar("tracks"));
    tracks_bar.set_length(resolved.len() as u64);
    let report = ChangeRecorder::new(store.as_ref())
        .with_write_delay(config.write_delay)
        .record(resolved.tracks(), today, &tracks_bar)
        .await;
    tracks_bar.finish_and_clear();

    Ok(report)
}

fn progress_bar(unit: &str) -> ProgressBar {
    let template = format!("[{{pos}}/{{len}} {}] {{bar:40}} {{wide_msg}}", unit);
    let style =
        ProgressStyle::with_template(&template).unwrap_or_else(|_| ProgressStyle::default_bar());
    ProgressBar::new(0).with_style(style)
}
