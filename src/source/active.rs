//! Active buffer selection
//!
//! Decides which virtual buffers receive playback data and which of them
//! deliver audio, given the host's audio track list. At most one active
//! buffer delivers audio at a time.

/// Kind of an audio track as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioTrackKind {
    Main,
    Alternative,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub kind: AudioTrackKind,
    pub label: String,
    pub enabled: bool,
}

impl AudioTrack {
    pub fn new(kind: AudioTrackKind, label: impl Into<String>, enabled: bool) -> Self {
        Self {
            kind,
            label: label.into(),
            enabled,
        }
    }
}

/// Which media types a buffer was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferProfile {
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSelection {
    /// Indices of active buffers, in creation order
    pub active: Vec<usize>,
    /// Per buffer: whether its audio must be dropped
    pub audio_disabled: Vec<bool>,
}

/// Whether an alternate audio rendition is selected.
///
/// Without a track list, a second buffer can only exist for alternate
/// audio.
fn alternate_enabled(buffer_count: usize, tracks: Option<&[AudioTrack]>) -> bool {
    match tracks {
        Some(tracks) => tracks
            .iter()
            .any(|t| t.enabled && t.kind != AudioTrackKind::Main),
        None => buffer_count >= 2,
    }
}

/// Compute the active set from scratch
pub fn select_active_buffers(
    profiles: &[BufferProfile],
    tracks: Option<&[AudioTrack]>,
) -> ActiveSelection {
    if let [only] = profiles {
        return ActiveSelection {
            active: vec![0],
            audio_disabled: vec![!only.has_audio],
        };
    }

    let alternate = alternate_enabled(profiles.len(), tracks);
    let disable_combined = alternate;
    let mut disable_audio_only = !alternate;

    let mut active = Vec::with_capacity(profiles.len());
    let mut audio_disabled = Vec::with_capacity(profiles.len());

    for (index, profile) in profiles.iter().enumerate() {
        let (disabled, is_active) = match (profile.has_video, profile.has_audio) {
            (true, true) => (disable_combined, true),
            (true, false) => {
                // demuxed video: the audio-only buffer must play
                disable_audio_only = false;
                (true, true)
            }
            (false, true) => {
                // the main buffer is always first
                let disabled = if index == 0 {
                    !disable_audio_only
                } else {
                    disable_audio_only
                };
                (disabled, !disabled)
            }
            (false, false) => (true, true),
        };

        audio_disabled.push(disabled);
        if is_active {
            active.push(index);
        }
    }

    ActiveSelection {
        active,
        audio_disabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMBINED: BufferProfile = BufferProfile {
        has_video: true,
        has_audio: true,
    };
    const AUDIO_ONLY: BufferProfile = BufferProfile {
        has_video: false,
        has_audio: true,
    };
    const VIDEO_ONLY: BufferProfile = BufferProfile {
        has_video: true,
        has_audio: false,
    };

    fn tracks(main_enabled: bool) -> Vec<AudioTrack> {
        vec![
            AudioTrack::new(AudioTrackKind::Main, "main", main_enabled),
            AudioTrack::new(AudioTrackKind::Alternative, "English (UK)", !main_enabled),
        ]
    }

    #[test]
    fn test_main_track_only_combined_active() {
        let selection = select_active_buffers(&[COMBINED, AUDIO_ONLY], Some(&tracks(true)));
        assert_eq!(selection.active, vec![0]);
        assert_eq!(selection.audio_disabled, vec![false, true]);
    }

    #[test]
    fn test_alternate_track_both_active() {
        let selection = select_active_buffers(&[COMBINED, AUDIO_ONLY], Some(&tracks(false)));
        assert_eq!(selection.active, vec![0, 1]);
        assert_eq!(selection.audio_disabled, vec![true, false]);
    }

    #[test]
    fn test_audio_only_main_buffer() {
        let main = select_active_buffers(&[AUDIO_ONLY, AUDIO_ONLY], Some(&tracks(true)));
        assert_eq!(main.active, vec![0]);

        let alternate = select_active_buffers(&[AUDIO_ONLY, AUDIO_ONLY], Some(&tracks(false)));
        assert_eq!(alternate.active, vec![1]);
    }

    #[test]
    fn test_demuxed_buffers_always_active() {
        for main_enabled in [true, false] {
            let selection =
                select_active_buffers(&[VIDEO_ONLY, AUDIO_ONLY], Some(&tracks(main_enabled)));
            assert_eq!(selection.active, vec![0, 1]);
            assert_eq!(selection.audio_disabled, vec![true, false]);
        }
    }

    #[test]
    fn test_single_buffer_always_active() {
        let video = select_active_buffers(&[VIDEO_ONLY], Some(&tracks(true)));
        assert_eq!(video.active, vec![0]);
        assert_eq!(video.audio_disabled, vec![true]);

        let audio = select_active_buffers(&[AUDIO_ONLY], None);
        assert_eq!(audio.active, vec![0]);
        assert_eq!(audio.audio_disabled, vec![false]);
    }

    #[test]
    fn test_unknown_tracks_assume_alternate() {
        let selection = select_active_buffers(&[COMBINED, AUDIO_ONLY], None);
        assert_eq!(selection.active, vec![0, 1]);
        assert_eq!(selection.audio_disabled, vec![true, false]);
    }

    #[test]
    fn test_empty() {
        let selection = select_active_buffers(&[], None);
        assert!(selection.active.is_empty());
    }
}
