//!
//! src/backup.rs
//!
//! Copies the saved-tracks collection and every playlist of the user
//! into the snapshot store under a single backup time
//!

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::SptoolsError;
use crate::gateway::{drain, fetch_playlist, Gateway, PLAYLISTS_PAGE, SAVED_TRACKS_PAGE};
use crate::persistent::Persistent;
use crate::types::BackupTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub backup_time: BackupTime,
    pub saved_tracks: usize,
    pub playlists: usize,
}

/// Runs one backup stamped with the current time
pub async fn backup<G>(gateway: &G, db: &Persistent, only_owned: bool) ->
    Result<BackupReport, SptoolsError>
where
    G: Gateway + ?Sized,
{
    backup_at(gateway, db, BackupTime::now(), only_owned).await
}

/// Saved tracks are written before any playlist is read. A failure
/// part way leaves the rows already written in place.
pub async fn backup_at<G>(
    gateway: &G,
    db: &Persistent,
    backup_time: BackupTime,
    only_owned: bool
) -> Result<BackupReport, SptoolsError>
where
    G: Gateway + ?Sized,
{
    info!(backup_time = %backup_time, only_owned, "backup.start");

    let saved_tracks = backup_saved_tracks(gateway, db, &backup_time).await?;
    let playlists = backup_playlists(gateway, db, &backup_time, only_owned).await?;

    let generations = db.backup_times().await?.len();
    let stored_tracks = db.count_saved_tracks().await?;
    let stored_playlists = db.count_playlists().await?;
    info!(
        backup_time = %backup_time, saved_tracks, playlists, generations,
        stored_tracks, stored_playlists, "backup.done"
    );

    Ok(BackupReport { backup_time, saved_tracks, playlists })
}

async fn backup_saved_tracks<G>(gateway: &G, db: &Persistent, backup_time: &BackupTime) ->
    Result<usize, SptoolsError>
where
    G: Gateway + ?Sized,
{
    let tracks = drain(SAVED_TRACKS_PAGE, move |limit, offset| gateway.saved_tracks(limit, offset))
        .await?;
    let written = db.insert_saved_tracks(backup_time, &tracks).await?;
    info!(count = written, "backup.saved_tracks");
    Ok(written)
}

async fn backup_playlists<G>(
    gateway: &G,
    db: &Persistent,
    backup_time: &BackupTime,
    only_owned: bool
) -> Result<usize, SptoolsError>
where
    G: Gateway + ?Sized,
{
    let summaries = drain(PLAYLISTS_PAGE, move |limit, offset| {
        gateway.user_playlists(limit, offset)
    })
    .await?;

    let owner = if only_owned {
        Some(gateway.current_user().await?.id)
    } else {
        None
    };

    let mut written = 0;
    for summary in summaries.iter().filter(|s| owner.as_ref().is_none_or(|id| &s.owner.id == id)) {
        let playlist = fetch_playlist(gateway, &summary.id).await?;
        debug!(playlist = %playlist.id, items = playlist.tracks.items.len(), "backup.playlist");
        db.insert_playlist(backup_time, &playlist).await?;
        written += 1;
    }
    info!(count = written, listed = summaries.len(), "backup.playlists");
    Ok(written)
}

/// Greatest backup time in the store
pub async fn most_recent_backup_time(db: &Persistent) -> Result<BackupTime, SptoolsError> {
    db.latest_backup_time().await?.ok_or(SptoolsError::NoBackup)
}
