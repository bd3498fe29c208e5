//! Spotify Web API client
//!
//! Implements [`CollectionProvider`] over the Spotify Web API with a bearer
//! token obtained elsewhere (token acquisition and refresh are not handled
//! here). Requests are rate limited client-side and never retried.
//!
//! Spotify lists playlist items oldest first. To honor the newest-first
//! contract the client reads the total first and then walks the playlist from
//! its end backwards, reversing each page. The continuation cursor is the
//! exclusive end offset of the next page to read.

use crate::provider::{
    ArtistRef, CollectionEntry, CollectionProvider, Page, PlayEvent, ProviderError,
    ProviderResult, TimeRange, TopTrack, TrackItem, Work, MAX_APPEND_BATCH,
};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("plsync/", env!("CARGO_PKG_VERSION"));
const REQUESTS_PER_SECOND: u32 = 10;
const PLAYLIST_ITEM_FIELDS: &str = "items(added_at,track(uri,name,artists(name))),next,total";

#[derive(Debug, Deserialize)]
struct SpPaging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct SpPlaylistItem {
    added_at: Option<String>,
    track: Option<SpTrack>,
}

#[derive(Debug, Deserialize)]
struct SpTrack {
    uri: Option<String>,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<SpArtistName>,
    popularity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SpArtistName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpFollowing {
    artists: SpCursorPaging<SpArtist>,
}

#[derive(Debug, Deserialize)]
struct SpCursorPaging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
    cursors: Option<SpCursors>,
}

#[derive(Debug, Deserialize)]
struct SpCursors {
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpArtist {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpAlbum {
    id: String,
    name: String,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpPlayHistory {
    track: Option<SpTrack>,
    played_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpPlaylistName {
    name: String,
}

impl SpTrack {
    /// `None` for rows without a usable identity
    fn into_track(self) -> Option<TrackItem> {
        let uri = self.uri.filter(|u| !u.is_empty())?;
        Some(TrackItem {
            uri,
            name: self.name.unwrap_or_else(|| "Unknown".to_string()),
            artists: self.artists.into_iter().map(|a| a.name).collect(),
        })
    }
}

/// Page bounds `[start, end)` for a backwards walk ending at `end`
fn backwards_page(end: u32, page_size: u32) -> (u32, u32) {
    let start = end.saturating_sub(page_size.max(1));
    (start, end - start)
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: Client,
    base_url: String,
    access_token: String,
    /// Client-side throttle; Spotify answers bursts with 429
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>) -> ProviderResult<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let quota = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            base_url: SPOTIFY_API_BASE_URL.to_string(),
            access_token: access_token.into(),
            rate_limiter: RateLimiter::direct(Quota::per_second(quota)),
        })
    }

    /// Point the client at another API root (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> ProviderResult<Response> {
        self.rate_limiter.until_ready().await;

        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        tracing::debug!(status = status.as_u16(), context = %context, "Spotify request failed");
        match status {
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound(context.to_string())),
            StatusCode::FORBIDDEN => Err(ProviderError::Forbidden(context.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited),
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                Err(ProviderError::Api(status.as_u16(), error_text))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> ProviderResult<T> {
        self.send(request, context)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn playlist_items(
        &self,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> ProviderResult<SpPaging<SpPlaylistItem>> {
        let request = self
            .http_client
            .get(self.url(&format!("/playlists/{}/tracks", playlist_id)))
            .query(&[
                ("fields", PLAYLIST_ITEM_FIELDS.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ]);
        self.get_json(request, &format!("playlist {}", playlist_id))
            .await
    }
}

#[async_trait]
impl CollectionProvider for SpotifyClient {
    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> ProviderResult<Page<CollectionEntry>> {
        let end = match cursor {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ProviderError::Parse(format!("Invalid playlist cursor: {}", raw)))?,
            None => self.playlist_items(collection_id, 0, 1).await?.total,
        };
        if end == 0 {
            return Ok(Page::last(Vec::new()));
        }

        let (start, limit) = backwards_page(end, page_size);
        let page = self.playlist_items(collection_id, start, limit).await?;

        let items = page
            .items
            .into_iter()
            .rev()
            .map(|item| CollectionEntry {
                track: item.track.and_then(SpTrack::into_track),
                added_at: item.added_at,
            })
            .collect();

        Ok(Page {
            items,
            next: (start > 0).then(|| start.to_string()),
        })
    }

    async fn followed_artists_page(
        &self,
        page_size: u32,
        cursor: Option<&str>,
    ) -> ProviderResult<Page<ArtistRef>> {
        let mut request = self
            .http_client
            .get(self.url("/me/following"))
            .query(&[("type", "artist".to_string()), ("limit", page_size.to_string())]);
        if let Some(after) = cursor {
            request = request.query(&[("after", after)]);
        }

        let following: SpFollowing = self.get_json(request, "followed artists").await?;
        let artists = following.artists;
        let next = artists
            .next
            .and(artists.cursors)
            .and_then(|c| c.after);

        Ok(Page {
            items: artists
                .items
                .into_iter()
                .map(|a| ArtistRef {
                    id: a.id,
                    name: a.name,
                })
                .collect(),
            next,
        })
    }

    async fn artist_works(&self, artist_id: &str) -> ProviderResult<Vec<Work>> {
        let request = self
            .http_client
            .get(self.url(&format!("/artists/{}/albums", artist_id)))
            .query(&[("include_groups", "album,single"), ("limit", "50")]);

        let albums: SpPaging<SpAlbum> = self
            .get_json(request, &format!("artist {}", artist_id))
            .await?;

        Ok(albums
            .items
            .into_iter()
            .map(|a| Work {
                id: a.id,
                name: a.name,
                release_date: a.release_date,
            })
            .collect())
    }

    async fn work_tracks(&self, work_id: &str) -> ProviderResult<Vec<TrackItem>> {
        let request = self
            .http_client
            .get(self.url(&format!("/albums/{}/tracks", work_id)))
            .query(&[("limit", "50")]);

        let tracks: SpPaging<SpTrack> = self
            .get_json(request, &format!("album {}", work_id))
            .await?;

        Ok(tracks
            .items
            .into_iter()
            .filter_map(SpTrack::into_track)
            .collect())
    }

    async fn append_items(&self, collection_id: &str, uris: &[String]) -> ProviderResult<()> {
        if uris.len() > MAX_APPEND_BATCH {
            return Err(ProviderError::BatchTooLarge(uris.len()));
        }
        if uris.is_empty() {
            return Ok(());
        }

        let request = self
            .http_client
            .post(self.url(&format!("/playlists/{}/tracks", collection_id)))
            .json(&serde_json::json!({ "uris": uris }));
        self.send(request, &format!("playlist {}", collection_id))
            .await?;

        tracing::debug!(playlist_id = %collection_id, count = uris.len(), "Appended tracks");
        Ok(())
    }

    async fn collection_name(&self, collection_id: &str) -> ProviderResult<Option<String>> {
        let request = self
            .http_client
            .get(self.url(&format!("/playlists/{}", collection_id)))
            .query(&[("fields", "name")]);

        match self
            .get_json::<SpPlaylistName>(request, &format!("playlist {}", collection_id))
            .await
        {
            Ok(playlist) => Ok(Some(playlist.name)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn recently_played(&self, limit: u32) -> ProviderResult<Vec<PlayEvent>> {
        let request = self
            .http_client
            .get(self.url("/me/player/recently-played"))
            .query(&[("limit", limit.min(50).to_string())]);

        let history: SpPaging<SpPlayHistory> =
            self.get_json(request, "recently played").await?;

        Ok(history
            .items
            .into_iter()
            .filter_map(|item| {
                let track = item.track.and_then(SpTrack::into_track)?;
                Some(PlayEvent {
                    track,
                    played_at: item.played_at,
                })
            })
            .collect())
    }

    async fn top_tracks(&self, time_range: TimeRange, limit: u32) -> ProviderResult<Vec<TopTrack>> {
        let request = self.http_client.get(self.url("/me/top/tracks")).query(&[
            ("time_range", time_range.as_str().to_string()),
            ("limit", limit.clamp(1, 50).to_string()),
        ]);

        let top: SpPaging<SpTrack> = self.get_json(request, "top tracks").await?;

        Ok(top
            .items
            .into_iter()
            .filter_map(|item| {
                let popularity = item.popularity.unwrap_or(0);
                Some(TopTrack {
                    track: item.into_track()?,
                    popularity,
                })
            })
            .collect())
    }
}
