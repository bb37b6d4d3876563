//! Where the starting playlist comes from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::*;
use crate::error::FetchError;
use crate::slide::PlaylistItem;

/// Returns the ordered slides to loop. Consumed once per (re)load.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn load_playlist(&self) -> Result<Vec<PlaylistItem>, FetchError>;
}

/// Fixed list of slides.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    items: Vec<PlaylistItem>,
}

impl StaticSource {
    pub fn new(items: Vec<PlaylistItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl PlaylistSource for StaticSource {
    async fn load_playlist(&self) -> Result<Vec<PlaylistItem>, FetchError> {
        Ok(self.items.clone())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Slides(Vec<PlaylistItem>),
    Wrapped { slides: Vec<PlaylistItem> },
}

/// JSON manifest, either a bare array of slides or `{ "slides": [...] }`.
///
/// Relative media paths are resolved against the manifest's directory.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PlaylistSource for ManifestSource {
    async fn load_playlist(&self) -> Result<Vec<PlaylistItem>, FetchError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })?;

        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|source| FetchError::Manifest {
            path: self.path.clone(),
            source,
        })?;
        let mut items = match manifest {
            Manifest::Slides(slides) | Manifest::Wrapped { slides } => slides,
        };

        let base = self.path.parent().unwrap_or_else(|| Path::new(""));
        for (index, item) in items.iter_mut().enumerate() {
            item.validate(index)?;
            if let Some(source) = item.source.as_mut() {
                if !source.contains("://") && Path::new(source.as_str()).is_relative() {
                    *source = base.join(source.as_str()).to_string_lossy().into_owned();
                }
            }
        }

        debug!("Loaded {} slides from {}", items.len(), self.path.display());
        Ok(items)
    }
}

/// Every image and video in a directory, sorted by file name.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    image_duration_ms: u64,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, image_duration_ms: u64) -> Self {
        Self {
            dir: dir.into(),
            image_duration_ms,
        }
    }
}

#[async_trait]
impl PlaylistSource for DirectorySource {
    async fn load_playlist(&self) -> Result<Vec<PlaylistItem>, FetchError> {
        let io_error = |source| FetchError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if media_kind(&path).is_none() {
                continue;
            }
            // Symlinks to files count as files.
            let is_file = match entry.file_type().await.map_err(io_error)? {
                kind if kind.is_symlink() => tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()),
                kind => kind.is_file(),
            };
            if is_file {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        // An empty directory is an empty playlist, not a failure.
        if paths.is_empty() {
            warn!("No media files found in directory: {}", self.dir.display());
        }

        let items = paths
            .into_iter()
            .filter_map(|path| {
                let source = path.to_string_lossy().into_owned();
                match media_kind(&path)? {
                    MediaKind::Image => Some(PlaylistItem::image(source, self.image_duration_ms)),
                    MediaKind::Video => Some(PlaylistItem::video(source)),
                }
            })
            .collect();
        Ok(items)
    }
}

/// Shuffles whatever the inner source returns, once per load.
pub struct Shuffled<S> {
    inner: S,
}

impl<S> Shuffled<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: PlaylistSource> PlaylistSource for Shuffled<S> {
    async fn load_playlist(&self) -> Result<Vec<PlaylistItem>, FetchError> {
        let mut items = self.inner.load_playlist().await?;
        items.shuffle(&mut rand::rng());
        Ok(items)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Video,
}

fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension().and_then(|s| s.to_str())?.to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::SlideKind;

    #[tokio::test]
    async fn directory_source_sorts_and_classifies() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.MP4", "a.jpg", "notes.txt", "c.png"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let items = DirectorySource::new(dir.path(), 3_000).load_playlist().await.unwrap();
        let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![SlideKind::Image, SlideKind::Video, SlideKind::Image]);
        assert!(items[0].source.as_deref().unwrap().ends_with("a.jpg"));
        assert_eq!(items[0].duration_ms, Some(3_000));
        assert_eq!(items[1].duration_ms, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn directory_source_follows_file_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        std::fs::write(media.path().join("real.png"), b"x").unwrap();
        std::fs::create_dir(media.path().join("folder.png")).unwrap();
        std::os::unix::fs::symlink(media.path().join("real.png"), dir.path().join("a.png")).unwrap();
        std::os::unix::fs::symlink(media.path().join("folder.png"), dir.path().join("b.png")).unwrap();
        std::os::unix::fs::symlink(media.path().join("gone.png"), dir.path().join("c.png")).unwrap();

        let items = DirectorySource::new(dir.path(), 1_000).load_playlist().await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].source.as_deref().unwrap().ends_with("a.png"));
    }

    #[tokio::test]
    async fn empty_directory_is_an_empty_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let items = DirectorySource::new(dir.path(), 1_000).load_playlist().await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_a_fetch_error() {
        let err = DirectorySource::new("/nonexistent/booth-media", 1_000)
            .load_playlist()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[tokio::test]
    async fn manifest_resolves_relative_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.json");
        std::fs::write(
            &path,
            r#"{"slides": [
                {"kind": "image", "source": "welcome.png", "durationMs": 1000, "showQr": true},
                {"kind": "video", "source": "https://cdn.example.com/promo.mp4", "overlay_text": "Visit us"}
            ]}"#,
        )
        .unwrap();

        let items = ManifestSource::new(&path).load_playlist().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].source.as_deref(),
            Some(dir.path().join("welcome.png").to_string_lossy().as_ref())
        );
        assert!(items[0].show_qr);
        assert_eq!(items[1].source.as_deref(), Some("https://cdn.example.com/promo.mp4"));
        assert_eq!(items[1].overlay_text.as_deref(), Some("Visit us"));
    }

    #[tokio::test]
    async fn manifest_rejects_invalid_slides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.json");
        std::fs::write(&path, r#"[{"kind": "image"}]"#).unwrap();
        let err = ManifestSource::new(&path).load_playlist().await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidItem { index: 0, .. }));

        std::fs::write(&path, "not json").unwrap();
        let err = ManifestSource::new(&path).load_playlist().await.unwrap_err();
        assert!(matches!(err, FetchError::Manifest { .. }));
    }

    #[tokio::test]
    async fn shuffled_keeps_every_slide() {
        let items: Vec<_> = (0..10).map(|i| PlaylistItem::image(format!("{i}.png"), 1)).collect();
        let mut shuffled = Shuffled::new(StaticSource::new(items.clone()))
            .load_playlist()
            .await
            .unwrap();
        shuffled.sort_by(|a, b| a.source.cmp(&b.source));

        let mut expected = items;
        expected.sort_by(|a, b| a.source.cmp(&b.source));
        assert_eq!(shuffled, expected);
    }
}
