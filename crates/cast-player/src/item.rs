use cast_proto::protocol::ItemSummary;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

/// Identity of an item.  Clones share it, so an item re-enqueued for
/// loop-last playback is still the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Finds subtitle files that belong to a local media file.
pub trait SubtitleFinder: Send + Sync {
    fn find(&self, media: &Path) -> Vec<PathBuf>;
}

/// Looks for `<stem>*.{srt,ass,ssa,vtt,sub}` next to the media file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiblingSubtitles;

impl SubtitleFinder for SiblingSubtitles {
    fn find(&self, media: &Path) -> Vec<PathBuf> {
        let (Some(dir), Some(stem)) = (media.parent(), media.file_stem()) else {
            return Vec::new();
        };
        let stem = stem.to_string_lossy();
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };

        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                let is_sub = p
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| SUBTITLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);
                let same_stem = p
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with(stem.as_ref()))
                    .unwrap_or(false);
                is_sub && same_stem
            })
            .collect();
        found.sort();
        found
    }
}

/// One playable entity.
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    source: String,
    resolved_path: Option<PathBuf>,
    title: Option<String>,
    playlist_id: Option<String>,
    subtitle_tracks: Vec<PathBuf>,
}

impl Item {
    /// An item that has not been resolved to a local file (yet).
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: ItemId::next(),
            source: source.into(),
            resolved_path: None,
            title: None,
            playlist_id: None,
            subtitle_tracks: Vec::new(),
        }
    }

    /// Resolves the path right away when `source` names an existing file.
    pub fn from_source(source: impl Into<String>, finder: &dyn SubtitleFinder) -> Self {
        let item = Self::new(source);
        if Path::new(&item.source).is_file() {
            let path = PathBuf::from(&item.source);
            item.with_resolved_path(path, finder)
        } else {
            item
        }
    }

    /// Set the local path; subtitle discovery runs once, here.
    pub fn with_resolved_path(mut self, path: impl Into<PathBuf>, finder: &dyn SubtitleFinder) -> Self {
        let path = path.into();
        self.subtitle_tracks = finder.find(&path);
        self.resolved_path = Some(path);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist_id = Some(playlist_id.into());
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn resolved_path(&self) -> Option<&Path> {
        self.resolved_path.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref()
    }

    pub fn subtitle_tracks(&self) -> &[PathBuf] {
        &self.subtitle_tracks
    }

    pub fn is_local(&self) -> bool {
        self.resolved_path.is_some()
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id.get(),
            source: self.source.clone(),
            title: self.title.clone(),
            playlist_id: self.playlist_id.clone(),
            local: self.is_local(),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "'{}' ({})", title, self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    struct NoSubtitles;

    impl SubtitleFinder for NoSubtitles {
        fn find(&self, _media: &Path) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    #[test]
    fn clones_share_identity() {
        let a = Item::new("https://example.org/a");
        let b = Item::new("https://example.org/a");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn remote_source_stays_unresolved() {
        let item = Item::from_source("https://example.org/watch?v=1", &NoSubtitles);
        assert!(!item.is_local());
        assert!(item.subtitle_tracks().is_empty());
    }

    #[test]
    fn local_source_discovers_sibling_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("movie.mkv");
        File::create(&video).unwrap();
        File::create(dir.path().join("movie.en.srt")).unwrap();
        File::create(dir.path().join("movie.ASS")).unwrap();
        File::create(dir.path().join("other.srt")).unwrap();
        File::create(dir.path().join("movie.nfo")).unwrap();

        let item = Item::from_source(video.to_string_lossy(), &SiblingSubtitles);
        assert_eq!(item.resolved_path(), Some(video.as_path()));
        let names: Vec<String> = item
            .subtitle_tracks()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["movie.ASS", "movie.en.srt"]);
    }

    #[test]
    fn summary_reflects_builders() {
        let item = Item::new("a.mp4").with_title("A").with_playlist("pl-1");
        let summary = item.summary();
        assert_eq!(summary.id, item.id().get());
        assert_eq!(summary.title.as_deref(), Some("A"));
        assert_eq!(summary.playlist_id.as_deref(), Some("pl-1"));
        assert!(!summary.local);
        assert_eq!(item.to_string(), "'A' (a.mp4)");
    }
}
