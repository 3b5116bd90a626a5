//!
//! src/library.rs
//!
//! Read-only queries against the live library: current playback and
//! the saved-tracks listing. Nothing here touches the snapshot store
//!

use serde::Serialize;
use serde_json::Value;

use crate::errors::SptoolsError;
use crate::gateway::{drain, Gateway, SAVED_TRACKS_PAGE};
use crate::types::{CompactPlayback, SavedTrack, Track};

/// First page size of the short saved-tracks listing
pub const SHORT_LISTING: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NowPlaying {
    /// Raw payload, null when nothing is playing
    Full(Option<Value>),
    Compact(CompactPlayback),
}

/// Title, ordered artist names and album name of the playing item
pub fn compact_playback(payload: &Value) -> Result<CompactPlayback, SptoolsError> {
    let item = match payload.get("item") {
        Some(item) if !item.is_null() => item,
        _ => return Err(SptoolsError::NotFound("nothing is playing".to_string())),
    };
    let track: Track = serde_json::from_value(item.clone())?;

    Ok(CompactPlayback {
        title: track.name.clone(),
        artists: track.artist_names(),
        album_name: track.album_name().to_string(),
    })
}

pub async fn now_playing<G>(gateway: &G, full: bool) -> Result<NowPlaying, SptoolsError>
where
    G: Gateway + ?Sized,
{
    let payload = gateway.current_playback().await?;
    if full {
        return Ok(NowPlaying::Full(payload));
    }

    let payload = payload.ok_or_else(|| SptoolsError::NotFound("nothing is playing".to_string()))?;
    Ok(NowPlaying::Compact(compact_playback(&payload)?))
}

/// Whole collection when `full`, otherwise the most recent few
pub async fn saved_tracks<G>(gateway: &G, full: bool) -> Result<Vec<SavedTrack>, SptoolsError>
where
    G: Gateway + ?Sized,
{
    if full {
        drain(SAVED_TRACKS_PAGE, move |limit, offset| gateway.saved_tracks(limit, offset)).await
    } else {
        Ok(gateway.saved_tracks(SHORT_LISTING, 0).await?.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;
    use serde_json::json;

    fn playing() -> Value {
        json!({
            "is_playing": true,
            "progress_ms": 1234,
            "item": {
                "id": "t1",
                "name": "Song",
                "artists": [{"name": "A"}, {"name": "B"}],
                "album": {"name": "Album", "images": []},
                "uri": "spotify:track:t1"
            }
        })
    }

    #[test]
    fn compact_projection() {
        let compact = compact_playback(&playing()).unwrap();
        assert_eq!(compact, CompactPlayback {
            title: "Song".into(),
            artists: vec!["A".into(), "B".into()],
            album_name: "Album".into(),
        });
        assert_eq!(
            serde_json::to_value(NowPlaying::Compact(compact)).unwrap(),
            json!({"title": "Song", "artists": ["A", "B"], "album_name": "Album"})
        );
    }

    #[tokio::test]
    async fn full_returns_payload_unchanged() {
        let gateway = FakeGateway::new("me").with_playback(playing());
        let result = now_playing(&gateway, true).await.unwrap();
        assert_eq!(serde_json::to_value(result).unwrap(), playing());
    }

    #[tokio::test]
    async fn idle_player() {
        let gateway = FakeGateway::new("me");
        let full = now_playing(&gateway, true).await.unwrap();
        assert_eq!(serde_json::to_value(full).unwrap(), Value::Null);
        assert!(matches!(now_playing(&gateway, false).await, Err(SptoolsError::NotFound(_))));

        let gateway = FakeGateway::new("me").with_playback(json!({"is_playing": false, "item": null}));
        assert!(matches!(now_playing(&gateway, false).await, Err(SptoolsError::NotFound(_))));
    }

    #[tokio::test]
    async fn saved_tracks_short_reads_one_page() {
        let ids: Vec<String> = (0..60).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let gateway = FakeGateway::new("me").with_saved(&refs);

        let short = saved_tracks(&gateway, false).await.unwrap();
        assert_eq!(short.len(), 20);
        assert_eq!(gateway.calls().saved_tracks, vec![(20, 0)]);

        let full = saved_tracks(&gateway, true).await.unwrap();
        assert_eq!(full.len(), 60);
        assert_eq!(full[59].track.id.as_deref(), Some("59"));
    }
}
