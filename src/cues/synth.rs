//! Cue synthesis
//!
//! Turns caption and ID3 records from the transmuxer into cues on the
//! host's text tracks, shifted by the buffer's timestamp offset.

use std::collections::BTreeMap;

use super::track::{Cue, TextTrackHost, TextTrackKind, TrackHandle};
use crate::segment::{CaptionRecord, MetadataRecord};

/// Label of the in-band metadata track
pub const METADATA_TRACK_LABEL: &str = "Timed Metadata";

/// End time of a metadata cue that has no successor yet
pub const OPEN_CUE_END: f64 = f64::MAX;

/// Usable end time for cues given the presentation duration
pub fn duration_of_video(duration: f64) -> f64 {
    if duration.is_nan() || duration.is_infinite() {
        OPEN_CUE_END
    } else {
        duration
    }
}

/// Per-buffer cue state: caption tracks by stream id plus one metadata track
#[derive(Default)]
pub struct CueSynthesizer {
    caption_tracks: BTreeMap<String, TrackHandle>,
    metadata_track: Option<TrackHandle>,
}

impl CueSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve or create the caption track for a stream.
    ///
    /// Returns true when the stream was not known to this buffer before.
    fn ensure_caption_track(&mut self, stream: &str, host: &mut dyn TextTrackHost) -> bool {
        if self.caption_tracks.contains_key(stream) {
            return false;
        }

        let track = match host.track_by_id(stream) {
            Some(track) => track,
            None => host.add_text_track(TextTrackKind::Captions, stream, Some(stream)),
        };
        tracing::debug!("In-band captions detected on {}", stream);
        self.caption_tracks.insert(stream.to_string(), track);
        true
    }

    /// Register declared caption streams; returns how many were new
    pub fn register_caption_streams(
        &mut self,
        streams: &[String],
        host: &mut dyn TextTrackHost,
    ) -> usize {
        streams
            .iter()
            .filter(|stream| self.ensure_caption_track(stream, host))
            .count()
    }

    /// Add one cue per caption; returns how many streams were new
    pub fn add_captions(
        &mut self,
        captions: &[CaptionRecord],
        offset: f64,
        host: &mut dyn TextTrackHost,
    ) -> usize {
        let mut new_streams = 0;
        for caption in captions {
            if self.ensure_caption_track(&caption.stream, host) {
                new_streams += 1;
            }
            if let Some(track) = self.caption_tracks.get(&caption.stream) {
                track.lock().add_cue(Cue::new(
                    caption.start_time + offset,
                    caption.end_time + offset,
                    caption.text.clone(),
                ));
            }
        }
        new_streams
    }

    /// Add one cue per ID3 frame, then re-chain all metadata end times.
    ///
    /// Cues sharing a start time end where the next start time begins;
    /// the last group ends at `duration` if it is finite.
    pub fn add_metadata(
        &mut self,
        metadata: &[MetadataRecord],
        dispatch_type: Option<&str>,
        offset: f64,
        duration: f64,
        host: &mut dyn TextTrackHost,
    ) {
        if metadata.is_empty() {
            return;
        }

        let track = self
            .metadata_track
            .get_or_insert_with(|| {
                host.add_text_track(TextTrackKind::Metadata, METADATA_TRACK_LABEL, None)
            })
            .clone();
        let mut track = track.lock();

        if track.in_band_metadata_track_dispatch_type.is_none() {
            track.in_band_metadata_track_dispatch_type = dispatch_type.map(str::to_string);
        }

        for record in metadata {
            let start_time = record.cue_time + offset;
            for frame in &record.frames {
                track.add_cue(Cue {
                    start_time,
                    end_time: start_time,
                    text: frame.text(),
                    frame: Some(frame.clone()),
                });
            }
        }

        let Some(cues) = track.cues.as_mut() else {
            return;
        };
        let mut start_times: Vec<f64> = cues.iter().map(|cue| cue.start_time).collect();
        start_times.sort_by(f64::total_cmp);
        start_times.dedup();

        let last_end = duration_of_video(duration);
        for cue in cues.iter_mut() {
            let next = start_times.partition_point(|&t| t <= cue.start_time);
            cue.end_time = start_times.get(next).copied().unwrap_or(last_end);
        }
    }

    /// Delete cues overlapping `[start, end]` from every track
    pub fn remove(&mut self, start: f64, end: f64) -> usize {
        self.caption_tracks
            .values()
            .chain(self.metadata_track.as_ref())
            .map(|track| track.lock().remove_cues(start, end))
            .sum()
    }

    /// Close open-ended metadata cues at the final duration
    pub fn end_of_stream(&mut self, duration: f64) {
        let Some(track) = &self.metadata_track else {
            return;
        };
        if let Some(cues) = track.lock().cues.as_mut() {
            for cue in cues.iter_mut().filter(|cue| cue.end_time == OPEN_CUE_END) {
                cue.end_time = duration;
            }
        }
    }

    pub fn caption_track(&self, stream: &str) -> Option<&TrackHandle> {
        self.caption_tracks.get(stream)
    }

    pub fn caption_tracks(&self) -> impl Iterator<Item = (&str, &TrackHandle)> {
        self.caption_tracks.iter().map(|(id, t)| (id.as_str(), t))
    }

    pub fn metadata_track(&self) -> Option<&TrackHandle> {
        self.metadata_track.as_ref()
    }
}
