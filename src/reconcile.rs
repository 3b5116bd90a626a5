//!
//! src/reconcile.rs
//!
//! Finds liked tracks that sit in no playlist of the latest backup and
//! collects them into a new playlist named after that backup
//!

use std::collections::HashSet;

use tracing::{debug, info};

use crate::backup::most_recent_backup_time;
use crate::errors::SptoolsError;
use crate::gateway::Gateway;
use crate::persistent::Persistent;
use crate::types::{BackupTime, Playlist, SavedTrack, Track};

pub fn unplaylisted_name(backup_time: &BackupTime) -> String {
    format!("Liked but not playlisted {backup_time}")
}

/// Saved track ids absent from every playlist, deduplicated, in saved order
pub fn liked_not_playlisted<'a>(saved: &'a [SavedTrack], playlists: &[Playlist]) -> Vec<&'a str> {
    let playlisted: HashSet<&str> = playlists.iter().flat_map(Playlist::track_ids).collect();
    let mut seen = HashSet::new();

    saved.iter()
        .filter_map(|s| s.track.id.as_deref())
        .filter(|id| !playlisted.contains(id) && seen.insert(*id))
        .collect()
}

/// Builds the "Liked but not playlisted" playlist from the most recent
/// backup and returns the tracks added to it. Nothing is created when a
/// track lookup fails.
pub async fn compile_unplaylisted<G>(gateway: &G, db: &Persistent) -> Result<Vec<Track>, SptoolsError>
where
    G: Gateway + ?Sized,
{
    let backup_time = most_recent_backup_time(db).await?;
    let saved: Vec<SavedTrack> = db.saved_tracks_at(&backup_time).await?
        .into_iter()
        .map(|r| r.record)
        .collect();
    let playlists: Vec<Playlist> = db.playlists_at(&backup_time).await?
        .into_iter()
        .map(|r| r.record)
        .collect();

    let missing = liked_not_playlisted(&saved, &playlists);
    info!(
        backup_time = %backup_time, saved = saved.len(), playlists = playlists.len(),
        missing = missing.len(), "reconcile.diff"
    );

    let mut tracks = Vec::with_capacity(missing.len());
    for id in missing {
        debug!(track = %id, "reconcile.track");
        tracks.push(gateway.track(id).await?);
    }

    let user = gateway.current_user().await?;
    let created = gateway.create_playlist(&user.id, &unplaylisted_name(&backup_time)).await?;
    let uris: Vec<String> = tracks.iter().map(|t| t.uri.clone()).collect();
    gateway.add_items_to_playlist(&created.id, &uris).await?;

    info!(playlist = %created.id, added = uris.len(), "reconcile.done");
    Ok(tracks)
}
