use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{
    AlbumGroup, AlbumSummary, ArtistProfile, CatalogError, CatalogService, CatalogTrack, Page,
    PageCursor, TrackSummary,
};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

// Largest page size the listing endpoints accept.
const ALBUMS_PAGE_LIMIT: u32 = 50;
const TRACKS_PAGE_LIMIT: u32 = 50;

// Refresh a little before the advertised expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { message: String },
    Code(String),
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Catalog client using the client-credentials grant.
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<AccessToken>,
}

impl SpotifyClient {
    /// Builds a client and acquires the first access token, so credential
    /// problems surface before any catalog work starts.
    pub async fn connect(client_id: &str, client_secret: &str) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let token = request_token(&client, client_id, client_secret).await?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(token),
        })
    }

    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut token = self.token.lock().await;
        if Instant::now() >= token.expires_at {
            debug!("Spotify access token expired, requesting a new one");
            *token = request_token(&self.client, &self.client_id, &self.client_secret).await?;
        }
        Ok(token.value.clone())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let token = self.access_token().await?;

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn request_token(
    client: &Client,
    client_id: &str,
    client_secret: &str,
) -> Result<AccessToken, CatalogError> {
    let response = client
        .post(SPOTIFY_TOKEN_URL)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let response = check_status(response)
        .await
        .map_err(|e| CatalogError::Auth(e.to_string()))?;
    let token: TokenResponse = response.json().await?;

    let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
    Ok(AccessToken {
        value: token.access_token,
        expires_at: Instant::now() + lifetime,
    })
}

async fn check_status(response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(CatalogError::Status {
        status: status.as_u16(),
        url,
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorBody::Detailed { message },
        }) => message,
        Ok(ErrorEnvelope {
            error: ErrorBody::Code(code),
        }) => code,
        Err(_) => body.trim().to_string(),
    }
}

fn join_groups(groups: &[AlbumGroup]) -> String {
    groups
        .iter()
        .map(AlbumGroup::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl CatalogService for SpotifyClient {
    async fn get_artist(&self, artist_id: &str) -> Result<ArtistProfile, CatalogError> {
        let url = format!("{}/artists/{}", SPOTIFY_API_URL, artist_id);
        self.get_json(&url, &[]).await
    }

    async fn list_artist_albums(
        &self,
        artist_id: &str,
        groups: &[AlbumGroup],
        cursor: Option<&PageCursor>,
    ) -> Result<Page<AlbumSummary>, CatalogError> {
        // The cursor is the fully qualified next-page URL.
        match cursor {
            Some(PageCursor(next)) => self.get_json(next, &[]).await,
            None => {
                let url = format!("{}/artists/{}/albums", SPOTIFY_API_URL, artist_id);
                let query = [
                    ("include_groups", join_groups(groups)),
                    ("limit", ALBUMS_PAGE_LIMIT.to_string()),
                ];
                self.get_json(&url, &query).await
            }
        }
    }

    async fn list_album_tracks(
        &self,
        album_id: &str,
        cursor: Option<&PageCursor>,
    ) -> Result<Page<TrackSummary>, CatalogError> {
        match cursor {
            Some(PageCursor(next)) => self.get_json(next, &[]).await,
            None => {
                let url = format!("{}/albums/{}/tracks", SPOTIFY_API_URL, album_id);
                let query = [("limit", TRACKS_PAGE_LIMIT.to_string())];
                self.get_json(&url, &query).await
            }
        }
    }

    async fn get_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError> {
        let url = format!("{}/tracks/{}", SPOTIFY_API_URL, track_id);
        self.get_json(&url, &[]).await
    }
}
