use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, alias = "Title")]
    pub title: String,
    #[serde(default, alias = "Artist")]
    pub artist: String,
    /// Milliseconds.
    #[serde(default, alias = "Duration")]
    pub duration: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub track: Track,
    /// Milliseconds into the track.
    #[serde(default)]
    pub position: u64,
}

pub trait MediaSource: Send + Sync {
    /// `None` when no player is active.
    fn now_playing(&self) -> impl Future<Output = Result<Option<NowPlaying>>> + Send;
}

/// Reads the player state from a JSON file kept current by the media bridge.
#[derive(Debug, Clone)]
pub struct NowPlayingFile {
    path: PathBuf,
}

impl NowPlayingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MediaSource for NowPlayingFile {
    async fn now_playing(&self) -> Result<Option<NowPlaying>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    debug!("media: {} unreadable: {}", self.path.display(), e);
                }
                return Ok(None);
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let np = serde_json::from_slice(&raw).with_context(|| format!("parse {}", self.path.display()))?;
        Ok(Some(np))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dashlink-media-{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_is_nothing_playing() {
        let src = NowPlayingFile::new(temp("missing"));
        assert_eq!(src.now_playing().await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_player_properties() {
        let path = temp("props");
        tokio::fs::write(
            &path,
            r#"{"status":"playing","track":{"Title":"Intro","Artist":"The xx","Duration":127000},"position":5300}"#,
        )
        .await
        .unwrap();

        let np = NowPlayingFile::new(&path).now_playing().await.unwrap().unwrap();
        assert_eq!(np.status, "playing");
        assert_eq!(np.track.title, "Intro");
        assert_eq!(np.track.artist, "The xx");
        assert_eq!(np.track.duration, 127_000);
        assert_eq!(np.position, 5300);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn partial_track_defaults_and_garbage_errors() {
        let path = temp("partial");
        tokio::fs::write(&path, r#"{"track":{"title":"Only title"}}"#).await.unwrap();
        let np = NowPlayingFile::new(&path).now_playing().await.unwrap().unwrap();
        assert_eq!(np.track.artist, "");
        assert_eq!(np.position, 0);

        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(NowPlayingFile::new(&path).now_playing().await.is_err());
        let _ = tokio::fs::remove_file(&path).await;
    }
}
