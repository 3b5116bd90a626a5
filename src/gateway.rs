//!
//! src/gateway.rs
//!
//! Defines the operations consumed from the streaming service and the
//! helpers that walk its paged collections to exhaustion
//!

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::errors::SptoolsError;
use crate::types::{
    Page, Playlist, PlaylistItem, PlaylistRef, PlaylistSummary, SavedTrack, Track, User,
};

/// Service maxima per collection, not tunable
pub const SAVED_TRACKS_PAGE: u32 = 50;
pub const PLAYLISTS_PAGE: u32 = 50;
pub const PLAYLIST_TRACKS_PAGE: u32 = 100;

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn saved_tracks(&self, limit: u32, offset: u32) ->
        Result<Page<SavedTrack>, SptoolsError>;

    /// None when nothing is playing
    async fn current_playback(&self) -> Result<Option<Value>, SptoolsError>;

    /// Playlists owned or followed by the current user
    async fn user_playlists(&self, limit: u32, offset: u32) ->
        Result<Page<PlaylistSummary>, SptoolsError>;

    /// Metadata with the first page of items embedded
    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, SptoolsError>;

    async fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32) ->
        Result<Page<PlaylistItem>, SptoolsError>;

    async fn track(&self, track_id: &str) -> Result<Track, SptoolsError>;

    async fn create_playlist(&self, owner_id: &str, name: &str) ->
        Result<PlaylistRef, SptoolsError>;

    async fn add_items_to_playlist(&self, playlist_id: &str, uris: &[String]) ->
        Result<(), SptoolsError>;

    async fn current_user(&self) -> Result<User, SptoolsError>;
}

/// Calls `fetch_page(limit, offset)` with growing offsets until a page
/// reports no `next`. Holds no state between calls; any error aborts.
pub async fn drain<T, F, Fut>(page_size: u32, mut fetch_page: F) -> Result<Vec<T>, SptoolsError>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, SptoolsError>>,
{
    let mut items = Vec::new();
    let mut offset = 0_u32;
    loop {
        let page = fetch_page(page_size, offset).await?;
        let last = page.is_last();
        debug!(offset, fetched = page.items.len(), last, "drain.page");
        items.extend(page.items);
        if last {
            break;
        }
        offset += page_size;
    }
    Ok(items)
}

/// Playlist with every item. The embedded first page is reused when it is
/// already complete, otherwise the items are re-read from offset 0.
pub async fn fetch_playlist<G>(gateway: &G, playlist_id: &str) -> Result<Playlist, SptoolsError>
where
    G: Gateway + ?Sized,
{
    let mut playlist = gateway.playlist(playlist_id).await?;
    if playlist.tracks.is_last() {
        return Ok(playlist);
    }

    debug!(playlist = %playlist_id, embedded = playlist.tracks.items.len(), "playlist.drain");
    playlist.tracks.items = drain(PLAYLIST_TRACKS_PAGE, move |limit, offset| {
        gateway.playlist_tracks(playlist_id, limit, offset)
    })
    .await?;
    Ok(playlist)
}
