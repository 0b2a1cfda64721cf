//! Read access to the external music catalog.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod spotify;

pub use spotify::SpotifyClient;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned status {status} for {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Opaque "next page" reference handed back by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(pub String);

/// One page of a paginated listing. A missing `next` ends the listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<PageCursor>,
}

/// Relationship between an album and the artist whose album list returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumGroup {
    Album,
    Single,
    AppearsOn,
    Compilation,
}

impl AlbumGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumGroup::Album => "album",
            AlbumGroup::Single => "single",
            AlbumGroup::AppearsOn => "appears_on",
            AlbumGroup::Compilation => "compilation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "album" => Some(AlbumGroup::Album),
            "single" => Some(AlbumGroup::Single),
            "appears_on" => Some(AlbumGroup::AppearsOn),
            "compilation" => Some(AlbumGroup::Compilation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlbumSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub album_group: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub release_date_precision: Option<String>,
}

impl AlbumSummary {
    pub fn is_compilation(&self) -> bool {
        self.album_type.as_deref() == Some("compilation")
    }

    pub fn is_appears_on(&self) -> bool {
        self.album_group.as_deref() == Some("appears_on")
    }
}

/// A track as listed on an album page: enough to apply the inclusion policy
/// but without popularity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackSummary {
    /// Local files and some regional entries carry no id.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

/// Full track metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub popularity: i32,
    pub duration_ms: u64,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtistProfile {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_artist(&self, artist_id: &str) -> Result<ArtistProfile, CatalogError>;

    async fn list_artist_albums(
        &self,
        artist_id: &str,
        groups: &[AlbumGroup],
        cursor: Option<&PageCursor>,
    ) -> Result<Page<AlbumSummary>, CatalogError>;

    async fn list_album_tracks(
        &self,
        album_id: &str,
        cursor: Option<&PageCursor>,
    ) -> Result<Page<TrackSummary>, CatalogError>;

    async fn get_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError>;
}
