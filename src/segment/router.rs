//! Segment routing
//!
//! Owns the worker connection for one virtual buffer. Outbound bytes go to
//! the worker untouched; inbound fragments are demultiplexed per track type
//! and held back until the worker signals the end of a flush cycle.

use bytes::{Bytes, BytesMut};

use super::types::{ByteView, CaptionRecord, MetadataRecord, TrackInfo, TrackPresence, TrackType};
use super::worker::{WorkerCommand, WorkerMessage, WorkerPort};
use crate::error::Result;

/// Fragments of one track type collected during a flush cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingTrack {
    pub segments: Vec<Bytes>,
    /// Most recent init segment seen in this cycle
    pub init_segment: Option<Bytes>,
    /// Most recent track info seen in this cycle
    pub info: Option<TrackInfo>,
}

impl PendingTrack {
    /// Total size of the queued fragments
    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    /// Concatenate the fragments into one region, optionally led by an
    /// init segment.
    pub fn concat(&self, init_segment: Option<&Bytes>) -> Bytes {
        let init_len = init_segment.map_or(0, Bytes::len);
        let mut out = BytesMut::with_capacity(init_len + self.byte_len());
        if let Some(init) = init_segment {
            out.extend_from_slice(init);
        }
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out.freeze()
    }
}

/// Everything the worker produced between two `Done` messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSegments {
    pub video: Option<PendingTrack>,
    pub audio: Option<PendingTrack>,
    pub captions: Vec<CaptionRecord>,
    pub caption_streams: Vec<String>,
    pub metadata: Vec<MetadataRecord>,
    pub metadata_dispatch_type: Option<String>,
}

impl PendingSegments {
    pub fn track(&self, track_type: TrackType) -> Option<&PendingTrack> {
        match track_type {
            TrackType::Audio => self.audio.as_ref(),
            TrackType::Video => self.video.as_ref(),
        }
    }

    fn track_mut(&mut self, track_type: TrackType) -> &mut PendingTrack {
        let slot = match track_type {
            TrackType::Audio => &mut self.audio,
            TrackType::Video => &mut self.video,
        };
        slot.get_or_insert_with(PendingTrack::default)
    }

    pub fn take_track(&mut self, track_type: TrackType) -> Option<PendingTrack> {
        match track_type {
            TrackType::Audio => self.audio.take(),
            TrackType::Video => self.video.take(),
        }
    }

    pub fn has_media(&self) -> bool {
        self.video.is_some() || self.audio.is_some()
    }

    /// Nothing at all arrived: no fragments, no cues
    pub fn is_empty(&self) -> bool {
        !self.has_media()
            && self.captions.is_empty()
            && self.caption_streams.is_empty()
            && self.metadata.is_empty()
    }
}

/// Result of routing one worker message
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// A fragment was queued under this track type
    Queued(TrackType),
    /// The cycle ended; here is everything it produced
    Flush(PendingSegments),
    /// The worker reported which streams it found
    TrackInfo(TrackPresence),
}

/// Connection to one transmux worker plus its pending queue
pub struct SegmentRouter {
    worker: Box<dyn WorkerPort>,
    pending: PendingSegments,
    presence: Option<TrackPresence>,
}

impl SegmentRouter {
    pub fn new(worker: Box<dyn WorkerPort>) -> Self {
        Self {
            worker,
            pending: PendingSegments::default(),
            presence: None,
        }
    }

    /// Send transport stream bytes followed by a flush request.
    ///
    /// The backing buffer travels as-is; the worker only reads the window.
    pub fn push(&mut self, view: ByteView) -> Result<()> {
        tracing::trace!(
            "push: offset={} length={}",
            view.byte_offset(),
            view.byte_length()
        );
        self.worker.post(WorkerCommand::Push(view))?;
        self.worker.post(WorkerCommand::Flush)
    }

    pub fn set_timestamp_offset(&mut self, offset: f64) -> Result<()> {
        self.worker.post(WorkerCommand::SetTimestampOffset(offset))
    }

    pub fn set_audio_append_start(&mut self, time: f64) -> Result<()> {
        self.worker.post(WorkerCommand::SetAudioAppendStart(time))
    }

    /// Reset the worker and forget everything not yet flushed
    pub fn reset(&mut self) -> Result<()> {
        self.pending = PendingSegments::default();
        self.worker.post(WorkerCommand::Reset)
    }

    /// Demultiplex one worker message
    pub fn route(&mut self, message: WorkerMessage) -> Routed {
        match message {
            WorkerMessage::Data(segment) => {
                let track_type = segment.track_type;
                let track = self.pending.track_mut(track_type);
                track.segments.push(segment.data.to_bytes());
                if let Some(init) = &segment.init_segment {
                    track.init_segment = Some(init.to_bytes());
                }
                if segment.info.is_some() {
                    track.info = segment.info;
                }

                self.pending.captions.extend(segment.captions);
                for stream in segment.caption_streams {
                    if !self.pending.caption_streams.contains(&stream) {
                        self.pending.caption_streams.push(stream);
                    }
                }
                if !segment.metadata.is_empty() {
                    self.pending.metadata.extend(segment.metadata);
                    if self.pending.metadata_dispatch_type.is_none() {
                        self.pending.metadata_dispatch_type = segment.metadata_dispatch_type;
                    }
                }

                tracing::trace!("Queued {} fragment", track_type);
                Routed::Queued(track_type)
            }
            WorkerMessage::Done => Routed::Flush(std::mem::take(&mut self.pending)),
            WorkerMessage::TrackInfo(presence) => {
                self.presence = Some(presence);
                Routed::TrackInfo(presence)
            }
        }
    }

    /// Whether fragments of this type are waiting for `Done`
    pub fn has_pending(&self, track_type: TrackType) -> bool {
        self.pending.track(track_type).is_some()
    }

    /// Last reported stream presence
    pub fn presence(&self) -> Option<TrackPresence> {
        self.presence
    }

    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.worker.try_recv()
    }

    /// Close the worker connection and drop pending fragments
    pub fn terminate(&mut self) {
        self.pending = PendingSegments::default();
        self.worker.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.worker.is_terminated()
    }
}
