//! In-band caption and metadata cues

pub mod synth;
pub mod track;

pub use synth::{duration_of_video, CueSynthesizer, METADATA_TRACK_LABEL, OPEN_CUE_END};
pub use track::{Cue, InMemoryTextTracks, TextTrack, TextTrackHost, TextTrackKind, TrackHandle};
