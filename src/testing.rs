//! Scripted catalog and in-memory store for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::catalog::{
    AlbumGroup, AlbumSummary, ArtistProfile, ArtistRef, CatalogError, CatalogService,
    CatalogTrack, Page, PageCursor, TrackSummary,
};
use crate::model::{parse_date, Observation, TrackSnapshot};
use crate::store::{ObservationQuery, ObservationStore, SortOrder, StoreError};

pub fn album(id: &str, name: &str) -> AlbumSummary {
    AlbumSummary {
        id: id.to_string(),
        name: name.to_string(),
        album_type: Some("album".to_string()),
        album_group: Some("album".to_string()),
        release_date: Some("2022-05-20".to_string()),
        release_date_precision: Some("day".to_string()),
    }
}

pub fn listed(id: &str, name: &str, credits: &[&str]) -> TrackSummary {
    TrackSummary {
        id: Some(id.to_string()),
        name: name.to_string(),
        artists: credits
            .iter()
            .map(|credit| ArtistRef {
                id: Some(credit.to_string()),
                name: credit.to_uppercase(),
            })
            .collect(),
    }
}

pub fn snapshot(id: &str, name: &str, popularity: i32) -> TrackSnapshot {
    TrackSnapshot {
        id: id.to_string(),
        name: name.to_string(),
        album: "Album".to_string(),
        release_date: NaiveDate::from_ymd_opt(2022, 5, 20),
        popularity,
        duration: Duration::from_millis(200_000),
        uri: format!("spotify:track:{}", id),
    }
}

pub fn record(date: &str, track: &str, spi: i32, uri: &str) -> Observation {
    Observation {
        date: parse_date(date).expect("valid test date"),
        track: track.to_string(),
        album: "Album".to_string(),
        spi,
        uri: uri.to_string(),
        release_date: None,
        duration: "3:20".to_string(),
    }
}

fn cursor(page: usize) -> PageCursor {
    PageCursor(format!("page:{}", page))
}

fn page_index(cursor: Option<&PageCursor>) -> usize {
    cursor
        .and_then(|PageCursor(c)| c.strip_prefix("page:"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn paged<T: Clone>(pages: &[Vec<T>], index: usize) -> Page<T> {
    Page {
        items: pages.get(index).cloned().unwrap_or_default(),
        next: (index + 1 < pages.len()).then(|| cursor(index + 1)),
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    artist: Option<ArtistProfile>,
    album_pages: Vec<Vec<AlbumSummary>>,
    failing_album_page: Option<usize>,
    album_tracks: HashMap<String, Vec<Vec<TrackSummary>>>,
    failing_track_pages: HashSet<(String, usize)>,
    tracks: HashMap<String, CatalogTrack>,
    failing_tracks: HashSet<String>,
    fetches: Mutex<Vec<String>>,
    groups_requested: Mutex<Vec<Vec<AlbumGroup>>>,
}

impl FakeCatalog {
    pub fn new(artist_id: &str, name: &str) -> Self {
        Self {
            artist: Some(ArtistProfile {
                id: artist_id.to_string(),
                name: name.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn with_failing_artist(mut self) -> Self {
        self.artist = None;
        self
    }

    pub fn with_album_pages(mut self, pages: Vec<Vec<AlbumSummary>>) -> Self {
        self.album_pages = pages;
        self
    }

    pub fn with_failing_album_page(mut self, index: usize) -> Self {
        self.failing_album_page = Some(index);
        self
    }

    pub fn with_album_tracks(mut self, album_id: &str, pages: Vec<Vec<TrackSummary>>) -> Self {
        self.album_tracks.insert(album_id.to_string(), pages);
        self
    }

    pub fn with_failing_track_page(mut self, album_id: &str, index: usize) -> Self {
        // Make sure the listing reaches the failing page.
        let pages = self.album_tracks.entry(album_id.to_string()).or_default();
        while pages.len() <= index {
            pages.push(Vec::new());
        }
        self.failing_track_pages.insert((album_id.to_string(), index));
        self
    }

    pub fn with_track(mut self, id: &str, name: &str, popularity: i32) -> Self {
        let artist_id = self
            .artist
            .as_ref()
            .map(|artist| artist.id.clone())
            .unwrap_or_default();
        self.tracks.insert(
            id.to_string(),
            CatalogTrack {
                id: id.to_string(),
                name: name.to_string(),
                artists: vec![ArtistRef {
                    id: Some(artist_id),
                    name: "Artist".to_string(),
                }],
                popularity,
                duration_ms: 200_000,
                uri: format!("spotify:track:{}", id),
            },
        );
        self
    }

    pub fn with_failing_track(mut self, id: &str) -> Self {
        self.failing_tracks.insert(id.to_string());
        self
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|fetched| fetched.as_str() == id)
            .count()
    }

    pub fn requested_groups(&self) -> Vec<Vec<AlbumGroup>> {
        self.groups_requested.lock().unwrap().clone()
    }
}

fn unavailable(url: String) -> CatalogError {
    CatalogError::Status {
        status: 503,
        url,
        message: "Service unavailable".to_string(),
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn get_artist(&self, artist_id: &str) -> Result<ArtistProfile, CatalogError> {
        self.artist
            .clone()
            .filter(|artist| artist.id == artist_id)
            .ok_or_else(|| unavailable(format!("artists/{}", artist_id)))
    }

    async fn list_artist_albums(
        &self,
        _artist_id: &str,
        groups: &[AlbumGroup],
        cursor: Option<&PageCursor>,
    ) -> Result<Page<AlbumSummary>, CatalogError> {
        self.groups_requested.lock().unwrap().push(groups.to_vec());
        let index = page_index(cursor);
        if self.failing_album_page == Some(index) {
            return Err(unavailable(format!("albums?page={}", index)));
        }
        Ok(paged(&self.album_pages, index))
    }

    async fn list_album_tracks(
        &self,
        album_id: &str,
        cursor: Option<&PageCursor>,
    ) -> Result<Page<TrackSummary>, CatalogError> {
        let index = page_index(cursor);
        if self
            .failing_track_pages
            .contains(&(album_id.to_string(), index))
        {
            return Err(unavailable(format!("albums/{}/tracks?page={}", album_id, index)));
        }
        let pages = self.album_tracks.get(album_id).cloned().unwrap_or_default();
        Ok(paged(&pages, index))
    }

    async fn get_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError> {
        self.fetches.lock().unwrap().push(track_id.to_string());
        if self.failing_tracks.contains(track_id) {
            return Err(unavailable(format!("tracks/{}", track_id)));
        }
        self.tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| CatalogError::Status {
                status: 404,
                url: format!("tracks/{}", track_id),
                message: "non existing id".to_string(),
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    observations: Mutex<Vec<Observation>>,
    failing_writes: HashSet<String>,
    failing_lookups: HashSet<String>,
}

impl MemoryStore {
    pub fn with_observations(self, observations: Vec<Observation>) -> Self {
        *self.observations.lock().unwrap() = observations;
        self
    }

    pub fn failing_write(mut self, uri: &str) -> Self {
        self.failing_writes.insert(uri.to_string());
        self
    }

    pub fn failing_lookup(mut self, uri: &str) -> Self {
        self.failing_lookups.insert(uri.to_string());
        self
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn create(&self, observation: &Observation) -> Result<(), StoreError> {
        if self.failing_writes.contains(&observation.uri) {
            return Err(StoreError::Status {
                status: 503,
                message: format!("write {}", observation.uri),
            });
        }
        self.observations.lock().unwrap().push(observation.clone());
        Ok(())
    }

    async fn query(&self, query: &ObservationQuery) -> Result<Vec<Observation>, StoreError> {
        if let crate::store::ObservationFilter::UriEquals(uri) = &query.filter {
            if self.failing_lookups.contains(uri) {
                return Err(StoreError::Status {
                    status: 503,
                    message: format!("lookup {}", uri),
                });
            }
        }

        let mut matching: Vec<(usize, Observation)> = self
            .observations
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, observation)| query.filter.matches(observation))
            .collect();

        match query.sort {
            SortOrder::Stored => {}
            SortOrder::DateAscending => matching.sort_by_key(|(i, o)| (o.date, *i)),
            SortOrder::DateDescending => {
                matching.sort_by(|(ia, a), (ib, b)| b.date.cmp(&a.date).then(ib.cmp(ia)))
            }
        }

        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|(_, observation)| observation)
            .collect())
    }

    async fn reset(&self) -> Result<u64, StoreError> {
        let mut observations = self.observations.lock().unwrap();
        let removed = observations.len() as u64;
        observations.clear();
        Ok(removed)
    }
}
