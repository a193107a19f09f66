//! Text tracks and the host capability that owns them

use parking_lot::Mutex;
use std::sync::Arc;

use crate::segment::MetadataFrame;

/// Kind of text track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTrackKind {
    Captions,
    Metadata,
}

impl TextTrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextTrackKind::Captions => "captions",
            TextTrackKind::Metadata => "metadata",
        }
    }
}

/// A timed text cue
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    /// Source ID3 frame for metadata cues
    pub frame: Option<MetadataFrame>,
}

impl Cue {
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            text: text.into(),
            frame: None,
        }
    }

    /// Whether the cue touches `[start, end]`
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start_time <= end && self.end_time >= start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextTrack {
    pub id: String,
    pub kind: TextTrackKind,
    pub label: String,
    /// `None` when the host has not made the cue list available
    pub cues: Option<Vec<Cue>>,
    pub in_band_metadata_track_dispatch_type: Option<String>,
}

impl TextTrack {
    pub fn new(id: impl Into<String>, kind: TextTrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            cues: Some(Vec::new()),
            in_band_metadata_track_dispatch_type: None,
        }
    }

    pub fn add_cue(&mut self, cue: Cue) {
        self.cues.get_or_insert_with(Vec::new).push(cue);
    }

    /// Delete every cue overlapping `[start, end]`; returns how many went
    pub fn remove_cues(&mut self, start: f64, end: f64) -> usize {
        let Some(cues) = self.cues.as_mut() else {
            return 0;
        };
        let before = cues.len();
        cues.retain(|cue| !cue.overlaps(start, end));
        before - cues.len()
    }

    pub fn cue_count(&self) -> usize {
        self.cues.as_ref().map_or(0, Vec::len)
    }
}

/// Shared reference to a text track; the host keeps one too
pub type TrackHandle = Arc<Mutex<TextTrack>>;

/// Host-side text track list
pub trait TextTrackHost: Send {
    /// An existing track with this id
    fn track_by_id(&self, id: &str) -> Option<TrackHandle>;

    /// Create and register a new track. Without an id the host picks one.
    fn add_text_track(&mut self, kind: TextTrackKind, label: &str, id: Option<&str>)
        -> TrackHandle;
}

/// Text track list kept in memory, for hosts without one of their own
#[derive(Debug, Default)]
pub struct InMemoryTextTracks {
    tracks: Vec<TrackHandle>,
}

impl InMemoryTextTracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a track created elsewhere
    pub fn insert(&mut self, track: TextTrack) -> TrackHandle {
        let handle = Arc::new(Mutex::new(track));
        self.tracks.push(handle.clone());
        handle
    }

    pub fn tracks(&self) -> &[TrackHandle] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl TextTrackHost for InMemoryTextTracks {
    fn track_by_id(&self, id: &str) -> Option<TrackHandle> {
        self.tracks.iter().find(|t| t.lock().id == id).cloned()
    }

    fn add_text_track(
        &mut self,
        kind: TextTrackKind,
        label: &str,
        id: Option<&str>,
    ) -> TrackHandle {
        let id = match id {
            Some(id) => id.to_string(),
            None => format!("track-{}", self.tracks.len() + 1),
        };
        tracing::debug!("Adding {} text track {:?} ({})", kind.as_str(), label, id);
        self.insert(TextTrack::new(id, kind, label))
    }
}
