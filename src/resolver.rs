//! Walks an artist's albums and their track listings and produces the
//! deduplicated set of tracks attributable to that artist.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use indicatif::ProgressBar;
use log::{debug, error, info, warn};

use crate::catalog::{AlbumGroup, AlbumSummary, CatalogError, CatalogService, TrackSummary};
use crate::model::{parse_release_date, TrackSnapshot};
use crate::policy::{ArtistIdentity, InclusionPolicy};

pub const DEFAULT_ALBUM_GROUPS: &[AlbumGroup] =
    &[AlbumGroup::Album, AlbumGroup::Single, AlbumGroup::AppearsOn];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveStats {
    pub albums_found: usize,
    /// False when the album listing itself failed partway.
    pub album_listing_complete: bool,
    pub albums_failed: usize,
    pub tracks_listed: usize,
    pub tracks_excluded: usize,
    pub duplicates_skipped: usize,
    pub fetch_failures: usize,
    /// Listings of a track whose fetch already failed this run.
    pub failed_repeats: usize,
}

impl fmt::Display for ResolveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} albums ({} failed{}), {} listed tracks, {} excluded, {} duplicates, \
             {} fetch failures ({} repeat listings skipped)",
            self.albums_found,
            self.albums_failed,
            if self.album_listing_complete { "" } else { ", listing incomplete" },
            self.tracks_listed,
            self.tracks_excluded,
            self.duplicates_skipped,
            self.fetch_failures,
            self.failed_repeats,
        )
    }
}

/// Resolver output: track identity to snapshot, each identity at most once,
/// iterated in discovery order.
#[derive(Debug, Clone)]
pub struct ResolvedCatalog {
    pub artist: ArtistIdentity,
    pub stats: ResolveStats,
    tracks: Vec<TrackSnapshot>,
    index: HashMap<String, usize>,
}

impl ResolvedCatalog {
    fn new(artist: ArtistIdentity) -> Self {
        Self {
            artist,
            stats: ResolveStats::default(),
            tracks: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&TrackSnapshot> {
        self.index.get(id).map(|&i| &self.tracks[i])
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[TrackSnapshot] {
        &self.tracks
    }

    // First-seen wins.
    fn insert(&mut self, snapshot: TrackSnapshot) -> bool {
        if self.index.contains_key(&snapshot.id) {
            return false;
        }
        self.index.insert(snapshot.id.clone(), self.tracks.len());
        self.tracks.push(snapshot);
        true
    }
}

pub struct CatalogResolver<'a, C: CatalogService + ?Sized> {
    catalog: &'a C,
    policy: &'a InclusionPolicy,
    album_groups: Vec<AlbumGroup>,
}

impl<'a, C: CatalogService + ?Sized> CatalogResolver<'a, C> {
    pub fn new(catalog: &'a C, policy: &'a InclusionPolicy) -> Self {
        Self {
            catalog,
            policy,
            album_groups: DEFAULT_ALBUM_GROUPS.to_vec(),
        }
    }

    pub fn with_album_groups(mut self, groups: &[AlbumGroup]) -> Self {
        self.album_groups = groups.to_vec();
        self
    }

    /// Resolves every track attributable to `artist_id`. Album and track
    /// failures are logged and skipped; this never fails as a whole.
    pub async fn resolve(&self, artist_id: &str, progress: &ProgressBar) -> ResolvedCatalog {
        let artist = self.identify(artist_id).await;
        let mut resolved = ResolvedCatalog::new(artist);

        info!("Fetching albums for artist ID: {}", artist_id);
        let (albums, complete) = self.list_albums(artist_id).await;
        resolved.stats.albums_found = albums.len();
        resolved.stats.album_listing_complete = complete;
        info!("Found {} albums/singles", albums.len());

        progress.set_length(albums.len() as u64);
        let mut failed_ids: HashSet<String> = HashSet::new();

        for album in &albums {
            progress.set_message(album.name.clone());
            debug!("Processing album: {}", album.name);

            match self.list_tracks(&album.id).await {
                Ok(listing) => {
                    self.collect(&mut resolved, &mut failed_ids, album, listing).await;
                }
                Err(e) => {
                    error!("Error processing album {}: {}", album.name, e);
                    resolved.stats.albums_failed += 1;
                }
            }
            progress.inc(1);
        }

        info!(
            "Resolved {} tracks for {}: {}",
            resolved.len(),
            resolved.artist.name.as_deref().unwrap_or(artist_id),
            resolved.stats
        );
        resolved
    }

    async fn identify(&self, artist_id: &str) -> ArtistIdentity {
        let name = match self.catalog.get_artist(artist_id).await {
            Ok(profile) => Some(profile.name),
            Err(e) => {
                warn!(
                    "Could not look up artist {}, name matching disabled for this run: {}",
                    artist_id, e
                );
                None
            }
        };
        ArtistIdentity {
            id: artist_id.to_string(),
            name,
        }
    }

    /// Drains the album listing. On a page failure the albums gathered so far
    /// are kept and the listing is reported incomplete.
    async fn list_albums(&self, artist_id: &str) -> (Vec<AlbumSummary>, bool) {
        let mut albums = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;

        loop {
            let page = match self
                .catalog
                .list_artist_albums(artist_id, &self.album_groups, cursor.as_ref())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!(
                        "Error listing albums for {} after {} albums: {}",
                        artist_id,
                        albums.len(),
                        e
                    );
                    return (albums, false);
                }
            };

            for album in page.items {
                if seen.insert(album.id.clone()) {
                    albums.push(album);
                }
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => return (albums, true),
            }
        }
    }

    /// Drains one album's track listing; any page failure fails the album.
    async fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackSummary>, CatalogError> {
        let mut tracks = Vec::new();
        let mut cursor = None;

        loop {
            let page = self
                .catalog
                .list_album_tracks(album_id, cursor.as_ref())
                .await?;
            tracks.extend(page.items);

            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(tracks),
            }
        }
    }

    async fn collect(
        &self,
        resolved: &mut ResolvedCatalog,
        failed_ids: &mut HashSet<String>,
        album: &AlbumSummary,
        listing: Vec<TrackSummary>,
    ) {
        let release_date = album
            .release_date
            .as_deref()
            .and_then(|date| parse_release_date(date, album.release_date_precision.as_deref()));

        for summary in listing {
            resolved.stats.tracks_listed += 1;

            let Some(id) = summary.id.as_deref() else {
                debug!("Skipping unidentified track {:?} on {}", summary.name, album.name);
                continue;
            };

            let Some(clause) = self.policy.attribute(&resolved.artist, album, &summary) else {
                resolved.stats.tracks_excluded += 1;
                continue;
            };

            if resolved.contains(id) {
                resolved.stats.duplicates_skipped += 1;
                continue;
            }
            // A failed fetch is not retried when the track shows up again.
            if failed_ids.contains(id) {
                resolved.stats.failed_repeats += 1;
                continue;
            }

            match self.catalog.get_track(id).await {
                Ok(track) => {
                    let snapshot = TrackSnapshot {
                        id: track.id,
                        name: track.name,
                        album: album.name.clone(),
                        release_date,
                        popularity: track.popularity,
                        duration: Duration::from_millis(track.duration_ms),
                        uri: track.uri,
                    };
                    debug!(
                        "Added track: {} (Popularity: {}, clause: {})",
                        snapshot.name, snapshot.popularity, clause
                    );
                    if !resolved.insert(snapshot) {
                        // The full record resolved to an id seen under another listing id.
                        resolved.stats.duplicates_skipped += 1;
                    }
                }
                Err(e) => {
                    error!("Error processing track {}: {}", id, e);
                    failed_ids.insert(id.to_string());
                    resolved.stats.fetch_failures += 1;
                }
            }
        }
    }
}
