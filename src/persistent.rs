//!
//! src/persistent.rs
//!
//! Defines the snapshot store. Every saved track and playlist is kept
//! as its json document next to the backup time of the run that wrote it.
//! Rows are only ever appended, history accumulates across runs
//!

use std::str::FromStr;

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions, Pool, Row, Sqlite};

use crate::errors::SptoolsError;
use crate::types::{BackupTime, Playlist, SavedTrack, SnapshotRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    SavedTracks,
    Playlists
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::SavedTracks => "saved_tracks",
            Table::Playlists   => "playlists"
        }
    }
}

pub struct Persistent {
    pool: Pool<Sqlite>
}

impl Persistent {

    async fn ensure_schema(pool: &Pool<Sqlite>) -> Result<(), SptoolsError> {
        for table in [Table::SavedTracks, Table::Playlists] {
            sqlx::query(&format!(
                r"
                CREATE TABLE IF NOT EXISTS {} (
                  id           INTEGER PRIMARY KEY AUTOINCREMENT,
                  spotify_id   TEXT,
                  backup_time  TEXT NOT NULL,
                  document     TEXT NOT NULL
                );
                ",
                table.as_str()
            )).execute(pool).await?;
        }
        Ok(())
    }

    pub async fn init(database_url: &str) -> Result<Self, SptoolsError> {
        let is_memory = database_url == "sqlite::memory:";

        let mut opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true);

        // WAL is file-only; don't set it for in-memory
        if !is_memory {
            opts = opts.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                       .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

            let filename = opts.clone().get_filename();
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| SptoolsError::Db(
                        format!("create dir {}: {e}", parent.display())
                    ))?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(if is_memory {1} else {4})
            .connect_with(opts)
            .await?;

        Self::ensure_schema(&pool).await?;
        tracing::debug!(db = %database_url, "store.ready");

        Ok(Self { pool })
    }

    /// Writes all documents of one call in a single transaction
    async fn insert_documents<'a, T, I>(
        &self,
        table: Table,
        backup_time: &BackupTime,
        records: I
    ) -> Result<usize, SptoolsError>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (Option<&'a str>, &'a T)>,
    {
        let sql = format!(
            "INSERT INTO {} (spotify_id, backup_time, document) VALUES (?1, ?2, ?3);",
            table.as_str()
        );

        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for (spotify_id, record) in records {
            let document = serde_json::to_string(
                &SnapshotRecord::new(record, backup_time.clone())
            )?;
            sqlx::query(&sql)
                .bind(spotify_id)
                .bind(backup_time.as_str())
                .bind(document)
                .execute(&mut *tx)
                .await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn documents_at<T: DeserializeOwned>(
        &self,
        table: Table,
        backup_time: &BackupTime
    ) -> Result<Vec<SnapshotRecord<T>>, SptoolsError> {
        let rows = sqlx::query(&format!(
            "SELECT document FROM {} WHERE backup_time = ?1 ORDER BY id ASC;",
            table.as_str()
        ))
        .bind(backup_time.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let document: String = r.get("document");
                serde_json::from_str(&document).map_err(SptoolsError::from)
            })
            .collect()
    }

    async fn count(&self, table: Table) -> Result<i64, SptoolsError> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {};", table.as_str()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert_saved_tracks(&self, backup_time: &BackupTime, tracks: &[SavedTrack]) ->
        Result<usize, SptoolsError> {
        self.insert_documents(
            Table::SavedTracks,
            backup_time,
            tracks.iter().map(|t| (t.track.id.as_deref(), t))
        ).await
    }

    pub async fn insert_playlist(&self, backup_time: &BackupTime, playlist: &Playlist) ->
        Result<(), SptoolsError> {
        self.insert_documents(
            Table::Playlists,
            backup_time,
            [(Some(playlist.id.as_str()), playlist)]
        ).await?;
        Ok(())
    }

    pub async fn saved_tracks_at(&self, backup_time: &BackupTime) ->
        Result<Vec<SnapshotRecord<SavedTrack>>, SptoolsError> {
        self.documents_at(Table::SavedTracks, backup_time).await
    }

    pub async fn playlists_at(&self, backup_time: &BackupTime) ->
        Result<Vec<SnapshotRecord<Playlist>>, SptoolsError> {
        self.documents_at(Table::Playlists, backup_time).await
    }

    /// Greatest backup time among saved tracks, None on an empty store
    pub async fn latest_backup_time(&self) -> Result<Option<BackupTime>, SptoolsError> {
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT MAX(backup_time) FROM saved_tracks WHERE backup_time IS NOT NULL;"
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(latest.map(BackupTime))
    }

    pub async fn backup_times(&self) -> Result<Vec<BackupTime>, SptoolsError> {
        let times: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT backup_time FROM saved_tracks ORDER BY backup_time ASC;"
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(times.into_iter().map(BackupTime).collect())
    }

    pub async fn count_saved_tracks(&self) -> Result<i64, SptoolsError> {
        self.count(Table::SavedTracks).await
    }

    pub async fn count_playlists(&self) -> Result<i64, SptoolsError> {
        self.count(Table::Playlists).await
    }
}
