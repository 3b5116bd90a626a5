//!
//! src/testing.rs
//!
//! In-memory Gateway and record builders for unit tests
//!

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::SptoolsError;
use crate::gateway::Gateway;
use crate::types::{
    Page, Playlist, PlaylistItem, PlaylistRef, PlaylistSummary, SavedTrack, Track, User,
};

pub const CREATED_PLAYLIST_ID: &str = "created-playlist";

pub fn track(id: &str) -> Track {
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Song {id}"),
        "artists": [{"name": "Artist"}],
        "album": {"name": "Album"},
        "uri": format!("spotify:track:{id}")
    }))
    .expect("valid track json")
}

pub fn saved(id: &str) -> SavedTrack {
    SavedTrack { added_at: Some("2024-01-01T00:00:00Z".into()), track: track(id), extra: Default::default() }
}

pub fn playlist(id: &str, owner: &str, track_ids: &[&str]) -> Playlist {
    let items: Vec<Value> = track_ids
        .iter()
        .map(|t| json!({"track": serde_json::to_value(track(t)).unwrap()}))
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Playlist {id}"),
        "owner": {"id": owner},
        "tracks": {"items": items, "next": null, "total": track_ids.len()}
    }))
    .expect("valid playlist json")
}

fn page<T: Clone>(all: &[T], limit: u32, offset: u32) -> Page<T> {
    let start = (offset as usize).min(all.len());
    let end = (start + limit as usize).min(all.len());
    let next = (end < all.len()).then(|| format!("offset={end}&limit={limit}"));
    Page { items: all[start..end].to_vec(), next, extra: Default::default() }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calls {
    pub saved_tracks: Vec<(u32, u32)>,
    pub user_playlists: Vec<(u32, u32)>,
    pub current_user: usize,
    pub playlist_tracks: Vec<(String, u32, u32)>,
    pub tracks: Vec<String>,
    pub created: Vec<(String, String)>,
    pub added: Vec<(String, Vec<String>)>,
}

pub struct FakeGateway {
    pub user: User,
    pub saved: Vec<SavedTrack>,
    pub playlists: Vec<Playlist>,
    pub playback: Option<Value>,
    pub embedded_page: u32,
    pub failing_track: Option<String>,
    calls: Mutex<Calls>,
}

impl FakeGateway {
    pub fn new(user_id: &str) -> Self {
        Self {
            user: User { id: user_id.to_string(), display_name: None, extra: Default::default() },
            saved: Vec::new(),
            playlists: Vec::new(),
            playback: None,
            embedded_page: 100,
            failing_track: None,
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_saved(mut self, ids: &[&str]) -> Self {
        self.saved.extend(ids.iter().map(|id| saved(id)));
        self
    }

    pub fn with_playlist(mut self, playlist: Playlist) -> Self {
        self.playlists.push(playlist);
        self
    }

    pub fn with_playback(mut self, payload: Value) -> Self {
        self.playback = Some(payload);
        self
    }

    pub fn failing_on(mut self, track_id: &str) -> Self {
        self.failing_track = Some(track_id.to_string());
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, f: impl FnOnce(&mut Calls)) {
        f(&mut self.calls.lock().unwrap());
    }

    fn find_playlist(&self, playlist_id: &str) -> Result<&Playlist, SptoolsError> {
        self.playlists
            .iter()
            .find(|p| p.id == playlist_id)
            .ok_or_else(|| SptoolsError::NotFound(format!("playlist {playlist_id}")))
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn saved_tracks(&self, limit: u32, offset: u32) -> Result<Page<SavedTrack>, SptoolsError> {
        self.record(|c| c.saved_tracks.push((limit, offset)));
        Ok(page(&self.saved, limit, offset))
    }

    async fn current_playback(&self) -> Result<Option<Value>, SptoolsError> {
        Ok(self.playback.clone())
    }

    async fn user_playlists(&self, limit: u32, offset: u32) ->
        Result<Page<PlaylistSummary>, SptoolsError> {
        self.record(|c| c.user_playlists.push((limit, offset)));
        let summaries: Vec<PlaylistSummary> = self.playlists
            .iter()
            .map(|p| PlaylistSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                owner: p.owner.clone(),
                extra: Default::default(),
            })
            .collect();
        Ok(page(&summaries, limit, offset))
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Playlist, SptoolsError> {
        let mut playlist = self.find_playlist(playlist_id)?.clone();
        playlist.tracks = page(&playlist.tracks.items, self.embedded_page, 0);
        Ok(playlist)
    }

    async fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32) ->
        Result<Page<PlaylistItem>, SptoolsError> {
        self.record(|c| c.playlist_tracks.push((playlist_id.to_string(), limit, offset)));
        let playlist = self.find_playlist(playlist_id)?;
        Ok(page(&playlist.tracks.items, limit, offset))
    }

    async fn track(&self, track_id: &str) -> Result<Track, SptoolsError> {
        self.record(|c| c.tracks.push(track_id.to_string()));
        if self.failing_track.as_deref() == Some(track_id) {
            return Err(SptoolsError::Api { status: 502, body: "bad gateway".into() });
        }
        Ok(track(track_id))
    }

    async fn create_playlist(&self, owner_id: &str, name: &str) -> Result<PlaylistRef, SptoolsError> {
        self.record(|c| c.created.push((owner_id.to_string(), name.to_string())));
        Ok(PlaylistRef {
            id: CREATED_PLAYLIST_ID.to_string(),
            name: name.to_string(),
            extra: Default::default(),
        })
    }

    async fn add_items_to_playlist(&self, playlist_id: &str, uris: &[String]) -> Result<(), SptoolsError> {
        self.record(|c| c.added.push((playlist_id.to_string(), uris.to_vec())));
        Ok(())
    }

    async fn current_user(&self) -> Result<User, SptoolsError> {
        self.record(|c| c.current_user += 1);
        Ok(self.user.clone())
    }
}
