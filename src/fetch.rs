//!
//! src/fetch.rs
//!
//! Defines the Spotify Web API client backing the Gateway. Builds one
//! request per operation, sends it through the retry loop and parses
//! the typed response
//!

use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{header, redirect, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{HttpConfig, RetryConfig, SpotifyConfig};
use crate::errors::SptoolsError;
use crate::gateway::Gateway;
use crate::types::{
    Page, Playlist, PlaylistItem, PlaylistRef, PlaylistSummary, SavedTrack, Track, User,
};

/// Most URIs accepted by one add-items request
pub const ADD_ITEMS_BATCH: usize = 100;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, SptoolsError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| SptoolsError::Http(format!("build client: {e}")))
}

/// Exponential wait with random jitter for http_with_retry
fn generate_backoff(base: Duration, attempt: u8, jitter: bool, rng: &mut SmallRng) -> Duration {
    let exp = base * (1_u32 << attempt.min(6));
    if jitter {
        exp + Duration::from_millis(rng.gen_range(50..=200))
    } else {
        exp
    }
}

/// Seconds form of Retry-After, the only form Spotify sends
fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Sends `request` until it succeeds, fails with a non-retryable status,
/// or runs out of attempts. Returns the successful response unread.
pub async fn http_with_retry(
    request: RequestBuilder,
    retry: &RetryConfig
) -> Result<Response, SptoolsError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_u8;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| SptoolsError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        attempt += 1;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }

                let retryable = retry.retryable_statuses.contains(&status.as_u16());
                if !retryable || attempt >= retry.max_attempts {
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        return Err(SptoolsError::RateLimited(
                            format!("gave up after {attempt} attempts")
                        ));
                    }
                    let body = resp.text().await.unwrap_or_default();
                    return Err(SptoolsError::Api { status: status.as_u16(), body });
                }

                let backoff = retry_after(&resp).unwrap_or_else(|| {
                    generate_backoff(retry.base_backoff, attempt - 1, retry.jitter, &mut rng)
                });
                warn!(status = %status, attempt, backoff = ?backoff.as_millis(), "http.retry");
                sleep(backoff).await;
            },
            Err(e) => {
                if !retry.retry_transport_errors || attempt >= retry.max_attempts {
                    return Err(e.into());
                }
                let backoff = generate_backoff(retry.base_backoff, attempt - 1, retry.jitter, &mut rng);
                warn!(error = %e, attempt, backoff = ?backoff.as_millis(), "http.retry.error");
                sleep(backoff).await;
            }
        }
    }
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T, SptoolsError> {
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    http: Client,
    cfg: SpotifyConfig,
    retry: RetryConfig,
    mutation_retry: RetryConfig,
    bearer: String
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) -> Result<Self, SptoolsError> {
        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone(),
            retry: http_config.retry.clone(),
            mutation_retry: http_config.retry.for_mutation(),
            bearer: String::new()
        })
    }

    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.cfg.refresh_token.as_str())
            ])
    }

    /// Exchanges the refresh token for an access token used by every
    /// later request of this client
    pub async fn authorize(&mut self) -> Result<(), SptoolsError> {
        let resp = http_with_retry(self.token_request(), &self.retry).await?;
        let token: TokenResponse = parse_json(resp).await?;
        self.bearer = token.access_token;
        info!("spotify.authorized");
        Ok(())
    }

    /// `{api_base}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SptoolsError> {
        let mut url = self.cfg.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SptoolsError::Config(format!("cannot-be-a-base url {}", self.cfg.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder, SptoolsError> {
        Ok(self.http.get(self.endpoint(segments)?).bearer_auth(&self.bearer))
    }

    fn post(&self, segments: &[&str]) -> Result<RequestBuilder, SptoolsError> {
        Ok(self.http.post(self.endpoint(segments)?).bearer_auth(&self.bearer))
    }

    fn paged(&self, segments: &[&str], limit: u32, offset: u32) ->
        Result<RequestBuilder, SptoolsError> {
        Ok(self.get(segments)?.query(&[
            ("limit", limit.to_string()),
            ("offset", offset.to_string())
        ]))
    }

    /// GET /v1/me/tracks?limit=&offset=
    pub fn saved_tracks_request(&self, limit: u32, offset: u32) ->
        Result<RequestBuilder, SptoolsError> {
        self.paged(&["me", "tracks"], limit, offset)
    }

    /// GET /v1/me/player/currently-playing
    pub fn currently_playing_request(&self) -> Result<RequestBuilder, SptoolsError> {
        self.get(&["me", "player", "currently-playing"])
    }

    /// GET /v1/me/playlists?limit=&offset=
    pub fn user_playlists_request(&self, limit: u32, offset: u32) ->
        Result<RequestBuilder, SptoolsError> {
        self.paged(&["me", "playlists"], limit, offset)
    }

    /// GET /v1/playlists/{id}
    pub fn playlist_request(&self, playlist_id: &str) -> Result<RequestBuilder, SptoolsError> {
        self.get(&["playlists", playlist_id])
    }

    /// GET /v1/playlists/{id}/tracks?limit=&offset=
    pub fn playlist_tracks_request(&self, playlist_id: &str, limit: u32, offset: u32) ->
        Result<RequestBuilder, SptoolsError> {
        self.paged(&["playlists", playlist_id, "tracks"], limit, offset)
    }

    /// GET /v1/tracks/{id}
    pub fn track_request(&self, track_id: &str) -> Result<RequestBuilder, SptoolsError> {
        self.get(&["tracks", track_id])
    }

    /// POST /v1/users/{id}/playlists
    pub fn create_playlist_request(&self, owner_id: &str, name: &str) ->
        Result<RequestBuilder, SptoolsError> {
        Ok(self.post(&["users", owner_id, "playlists"])?
            .json(&json!({ "name": name, "public": false })))
    }

    /// POST /v1/playlists/{id}/tracks
    pub fn add_items_request(&self, playlist_id: &str, uris: &[String]) ->
        Result<RequestBuilder, SptoolsError> {
        Ok(self.post(&["playlists", playlist_id, "tracks"])?
            .json(&json!({ "uris": uris })))
    }

    /// GET /v1/me
    pub fn current_user_request(&self) -> Result<RequestBuilder, SptoolsError> {
        self.get(&["me"])
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SptoolsError> {
        let resp = http_with_retry(request, &self.retry).await?;
        parse_json(resp).await
    }
}

#[async_trait]
impl Gateway for SpotifyClient {
    async fn saved_tracks(&self, limit: u32, offset: u32) -> Result<Page<SavedTrack>, SptoolsError> {
        self.send_json(self.saved_tracks_request(limit, offset)?).await
    }

    async fn current_playback(&self) -> Result<Option<Value>, SptoolsError> {
        let resp = http_with_retry(self.currently_playing_request()?, &self.retry).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            debug!("playback.idle");
            return Ok(None);
        }
        let bytes = resp.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn user_playlists(&self, limit: u32, offset: u32) ->
        Result<Page<PlaylistSummary>, SptoolsError> {
        self.send_json(self.user_playlists_request(limit, offset)?).await
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, SptoolsError> {
        self.send_json(self.playlist_request(playlist_id)?).await
    }

    async fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32) ->
        Result<Page<PlaylistItem>, SptoolsError> {
        self.send_json(self.playlist_tracks_request(playlist_id, limit, offset)?).await
    }

    async fn track(&self, track_id: &str) -> Result<Track, SptoolsError> {
        self.send_json(self.track_request(track_id)?).await
    }

    async fn create_playlist(&self, owner_id: &str, name: &str) -> Result<PlaylistRef, SptoolsError> {
        let request = self.create_playlist_request(owner_id, name)?;
        let resp = http_with_retry(request, &self.mutation_retry).await?;
        parse_json(resp).await
    }

    async fn add_items_to_playlist(&self, playlist_id: &str, uris: &[String]) -> Result<(), SptoolsError> {
        for batch in uris.chunks(ADD_ITEMS_BATCH) {
            http_with_retry(self.add_items_request(playlist_id, batch)?, &self.mutation_retry).await?;
            debug!(playlist = %playlist_id, added = batch.len(), "playlist.add_items");
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<User, SptoolsError> {
        self.send_json(self.current_user_request()?).await
    }
}
