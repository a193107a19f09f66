//! Virtual buffer
//!
//! One logical buffer fed with transport stream bytes, backed by up to two
//! native fMP4 sinks (audio and video). Worker output is held per track
//! type until the end of a flush cycle, then appended as one region per
//! type. Sink events from both sinks are merged into one update cycle.

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;

use super::aggregator::{SinkEvent, UpdateAggregator};
use super::sink::{NativeMediaSource, SinkHandle, SinkPool, TimeRanges};
use crate::codec::NegotiatedCodecs;
use crate::cues::{CueSynthesizer, TextTrackHost};
use crate::error::{MediaSourceError, Result};
use crate::segment::{
    ByteView, PendingSegments, PendingTrack, Routed, SegmentRouter, TrackInfo, TrackType,
    WorkerMessage,
};

/// Identifies a virtual buffer within its media source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Usage signals reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSignal {
    /// CEA-608 captions were found in the stream
    InBandCaptions,
}

/// Events observable on a virtual buffer
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    UpdateStart,
    Update,
    UpdateEnd,
    VideoInfo(TrackInfo),
    AudioInfo(TrackInfo),
    Usage(UsageSignal),
}

impl From<SinkEvent> for BufferEvent {
    fn from(event: SinkEvent) -> Self {
        match event {
            SinkEvent::UpdateStart => BufferEvent::UpdateStart,
            SinkEvent::Update => BufferEvent::Update,
            SinkEvent::UpdateEnd => BufferEvent::UpdateEnd,
        }
    }
}

/// Append progress of one track type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPhase {
    /// Nothing queued, nothing in flight
    Idle,
    /// Fragments queued, waiting for the end of the cycle
    AwaitingDone,
    /// An append was issued and its `updateend` has not arrived
    Appending,
}

#[derive(Debug)]
struct TrackState {
    phase: AppendPhase,
    /// Payloads from later cycles waiting for the in-flight append
    backlog: VecDeque<Bytes>,
    /// Most recent init segment of this type
    init_segment: Option<Bytes>,
}

impl TrackState {
    fn new() -> Self {
        Self {
            phase: AppendPhase::Idle,
            backlog: VecDeque::new(),
            init_segment: None,
        }
    }
}

/// Presentation-level collaborators a buffer needs while handling a message
pub struct PresentationContext<'a> {
    pub native: &'a mut dyn NativeMediaSource,
    pub sinks: &'a mut SinkPool,
    pub text_tracks: &'a mut dyn TextTrackHost,
    /// Current presentation duration
    pub duration: f64,
    /// The presentation is closed; flushed data is dropped
    pub closed: bool,
}

pub struct VirtualBuffer {
    id: BufferId,
    codecs: NegotiatedCodecs,
    router: SegmentRouter,
    video_sink: Option<SinkHandle>,
    audio_sink: Option<SinkHandle>,
    timestamp_offset: f64,
    audio_disabled: bool,
    append_audio_init_segment_next: bool,
    /// A push was sent and its `Done` has not arrived
    push_in_flight: bool,
    video: TrackState,
    audio: TrackState,
    aggregator: UpdateAggregator,
    cues: CueSynthesizer,
    events: Vec<BufferEvent>,
}

impl VirtualBuffer {
    pub fn new(id: BufferId, codecs: NegotiatedCodecs, router: SegmentRouter) -> Self {
        Self {
            id,
            codecs,
            router,
            video_sink: None,
            audio_sink: None,
            timestamp_offset: 0.0,
            audio_disabled: false,
            append_audio_init_segment_next: true,
            push_in_flight: false,
            video: TrackState::new(),
            audio: TrackState::new(),
            aggregator: UpdateAggregator::new(),
            cues: CueSynthesizer::new(),
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn codecs(&self) -> &NegotiatedCodecs {
        &self.codecs
    }

    pub fn has_audio(&self) -> bool {
        self.codecs.audio.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.codecs.video.is_some()
    }

    pub fn audio_disabled(&self) -> bool {
        self.audio_disabled
    }

    /// Stop or resume delivering audio. Queued audio payloads are dropped
    /// on disable; an append already in flight still completes.
    pub fn set_audio_disabled(&mut self, disabled: bool) {
        if disabled && !self.audio_disabled {
            self.aggregator.reset(TrackType::Audio);
            self.audio.backlog.clear();
        }
        self.audio_disabled = disabled;
    }

    pub fn append_audio_init_segment_next(&self) -> bool {
        self.append_audio_init_segment_next
    }

    /// Prepend the audio init segment to the next audio append
    pub fn rearm_audio_init_segment(&mut self) {
        self.append_audio_init_segment_next = true;
    }

    pub fn timestamp_offset(&self) -> f64 {
        self.timestamp_offset
    }

    pub fn phase(&self, track_type: TrackType) -> AppendPhase {
        self.track(track_type).phase
    }

    pub fn sink(&self, track_type: TrackType) -> Option<&SinkHandle> {
        match track_type {
            TrackType::Audio => self.audio_sink.as_ref(),
            TrackType::Video => self.video_sink.as_ref(),
        }
    }

    pub fn cues(&self) -> &CueSynthesizer {
        &self.cues
    }

    pub fn cues_mut(&mut self) -> &mut CueSynthesizer {
        &mut self.cues
    }

    fn track(&self, track_type: TrackType) -> &TrackState {
        match track_type {
            TrackType::Audio => &self.audio,
            TrackType::Video => &self.video,
        }
    }

    fn track_mut(&mut self, track_type: TrackType) -> &mut TrackState {
        match track_type {
            TrackType::Audio => &mut self.audio,
            TrackType::Video => &mut self.video,
        }
    }

    /// The sink for a type, unless it exists but is disabled
    fn enabled_sink(&self, track_type: TrackType) -> Option<&SinkHandle> {
        if track_type == TrackType::Audio && self.audio_disabled {
            return None;
        }
        self.sink(track_type)
    }

    /// Attach native sinks for every requested codec, sharing pooled ones
    pub fn ensure_sinks(
        &mut self,
        native: &mut dyn NativeMediaSource,
        sinks: &mut SinkPool,
    ) -> Result<()> {
        for track_type in [TrackType::Video, TrackType::Audio] {
            if self.sink(track_type).is_some() {
                continue;
            }
            let Some(mime) = self.codecs.sink_mime(track_type) else {
                continue;
            };
            let handle = sinks.get_or_create(track_type, &mime, native)?;
            match track_type {
                TrackType::Audio => self.audio_sink = Some(handle),
                TrackType::Video => self.video_sink = Some(handle),
            }
        }
        Ok(())
    }

    /// Send transport stream bytes to the worker.
    ///
    /// Nothing reaches a sink until the worker finishes the cycle.
    pub fn append_buffer(&mut self, view: ByteView) -> Result<()> {
        let audio_end = self
            .enabled_sink(TrackType::Audio)
            .and_then(|sink| sink.lock().buffered().last_end());
        if let Some(end) = audio_end {
            self.router.set_audio_append_start(end)?;
        }

        self.push_in_flight = true;
        self.router.push(view)
    }

    /// Realign the worker's output timeline. Negative or non-finite
    /// offsets are ignored.
    pub fn set_timestamp_offset(&mut self, offset: f64) -> Result<()> {
        if !offset.is_finite() || offset < 0.0 {
            tracing::warn!("Buffer {}: ignoring timestamp offset {}", self.id, offset);
            return Ok(());
        }
        self.timestamp_offset = offset;
        self.router.set_timestamp_offset(offset)
    }

    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.router.try_recv()
    }

    /// Handle one message from the worker
    pub fn handle_message(
        &mut self,
        message: WorkerMessage,
        ctx: &mut PresentationContext<'_>,
    ) -> Result<()> {
        match self.router.route(message) {
            Routed::Queued(track_type) => {
                let track = self.track_mut(track_type);
                if track.phase == AppendPhase::Idle {
                    track.phase = AppendPhase::AwaitingDone;
                }
                Ok(())
            }
            Routed::TrackInfo(presence) => {
                tracing::debug!("Buffer {}: worker reports {:?}", self.id, presence);
                Ok(())
            }
            Routed::Flush(pending) => self.flush(pending, ctx),
        }
    }

    fn flush(&mut self, mut pending: PendingSegments, ctx: &mut PresentationContext<'_>) -> Result<()> {
        self.push_in_flight = false;
        for track_type in [TrackType::Video, TrackType::Audio] {
            let track = self.track_mut(track_type);
            if track.phase == AppendPhase::AwaitingDone {
                track.phase = AppendPhase::Idle;
            }
        }

        if ctx.closed {
            tracing::debug!("Buffer {}: presentation closed, dropping flushed data", self.id);
            return Ok(());
        }
        if pending.is_empty() {
            tracing::trace!("Buffer {}: empty cycle", self.id);
            return Ok(());
        }

        if pending.has_media() && self.video_sink.is_none() && self.audio_sink.is_none() {
            self.drop_absent_codecs(&pending);
            self.ensure_sinks(&mut *ctx.native, &mut *ctx.sinks)?;
        }

        let video_info = pending.video.as_ref().and_then(|t| t.info.clone());
        if let Some(info) = video_info {
            self.events.push(BufferEvent::VideoInfo(info));
        }
        let audio_info = pending.audio.as_ref().and_then(|t| t.info.clone());
        if let Some(info) = audio_info {
            self.events.push(BufferEvent::AudioInfo(info));
        }

        self.synthesize_cues(&pending, ctx);

        let video = match pending.take_track(TrackType::Video) {
            Some(track) => self.append_track(TrackType::Video, track),
            None => Ok(()),
        };
        let audio = match pending.take_track(TrackType::Audio) {
            Some(_) if self.audio_disabled => {
                tracing::trace!("Buffer {}: audio disabled, dropping audio", self.id);
                Ok(())
            }
            Some(track) => self.append_track(TrackType::Audio, track),
            None => Ok(()),
        };
        // a rejected append does not hold back the other type
        video.and(audio)
    }

    /// Before the first sink is created, forget codecs for types the
    /// stream turned out not to carry.
    fn drop_absent_codecs(&mut self, pending: &PendingSegments) {
        let presence = self.router.presence();
        for track_type in [TrackType::Video, TrackType::Audio] {
            let present = match presence {
                Some(presence) => presence.has(track_type),
                None => pending.track(track_type).is_some(),
            };
            if !present && self.codecs.get(track_type).is_some() {
                tracing::debug!("Buffer {}: no {} in stream, dropping codec", self.id, track_type);
                self.codecs.clear(track_type);
            }
        }
    }

    fn synthesize_cues(&mut self, pending: &PendingSegments, ctx: &mut PresentationContext<'_>) {
        let offset = self.timestamp_offset;
        let new_streams = self
            .cues
            .register_caption_streams(&pending.caption_streams, &mut *ctx.text_tracks)
            + self
                .cues
                .add_captions(&pending.captions, offset, &mut *ctx.text_tracks);
        for _ in 0..new_streams {
            self.events.push(BufferEvent::Usage(UsageSignal::InBandCaptions));
        }

        self.cues.add_metadata(
            &pending.metadata,
            pending.metadata_dispatch_type.as_deref(),
            offset,
            ctx.duration,
            &mut *ctx.text_tracks,
        );
    }

    /// Build the payload for one type and append it, or queue it behind an
    /// append that is still in flight.
    fn append_track(&mut self, track_type: TrackType, pending: PendingTrack) -> Result<()> {
        let Some(sink) = self.sink(track_type).cloned() else {
            tracing::warn!("Buffer {}: no {} sink, dropping fragments", self.id, track_type);
            return Ok(());
        };

        let include_init = match track_type {
            TrackType::Video => true,
            TrackType::Audio => self.append_audio_init_segment_next,
        };
        let track = self.track_mut(track_type);
        if let Some(init) = pending.init_segment.clone() {
            track.init_segment = Some(init);
        }
        let init = if include_init {
            track.init_segment.clone()
        } else {
            None
        };
        let payload = pending.concat(init.as_ref());
        if track_type == TrackType::Audio && init.is_some() {
            self.append_audio_init_segment_next = false;
        }

        let id = self.id;
        let track = self.track_mut(track_type);
        if track.phase == AppendPhase::Appending {
            tracing::debug!(
                "Buffer {}: {} append in flight, queueing {} bytes",
                id,
                track_type,
                payload.len()
            );
            track.backlog.push_back(payload);
            return Ok(());
        }

        self.append_to_sink(track_type, &sink, payload)
    }

    fn append_to_sink(&mut self, track_type: TrackType, sink: &SinkHandle, payload: Bytes) -> Result<()> {
        tracing::debug!(
            "Buffer {}: appending {} bytes to {} sink",
            self.id,
            payload.len(),
            track_type
        );
        let result = sink.lock().append(payload);
        match result {
            Ok(()) => {
                self.track_mut(track_type).phase = AppendPhase::Appending;
                Ok(())
            }
            Err(source) => {
                self.track_mut(track_type).phase = AppendPhase::Idle;
                Err(MediaSourceError::Append {
                    track: track_type,
                    source,
                })
            }
        }
    }

    /// Handle an update lifecycle event from one of the native sinks
    pub fn on_sink_event(&mut self, track_type: TrackType, event: SinkEvent) -> Result<()> {
        if self.sink(track_type).is_none() {
            return Ok(());
        }

        // disabled audio still finishes its own append, silently
        let silenced = track_type == TrackType::Audio && self.audio_disabled;
        if !silenced {
            if let Some(event) = self.aggregator.on_event(track_type, event) {
                self.events.push(event.into());
            }
        }

        if event == SinkEvent::UpdateEnd {
            self.drain_backlog(track_type)?;
        }
        Ok(())
    }

    fn drain_backlog(&mut self, track_type: TrackType) -> Result<()> {
        let queued = self.router.has_pending(track_type);
        let track = self.track_mut(track_type);
        if track.phase != AppendPhase::Appending {
            return Ok(());
        }

        match track.backlog.pop_front() {
            Some(payload) => match self.sink(track_type).cloned() {
                Some(sink) => self.append_to_sink(track_type, &sink, payload),
                None => Ok(()),
            },
            None => {
                track.phase = if queued {
                    AppendPhase::AwaitingDone
                } else {
                    AppendPhase::Idle
                };
                Ok(())
            }
        }
    }

    /// Remove media in `[start, end]` from the sinks and the text tracks
    pub fn remove(&mut self, start: f64, end: f64) -> Result<()> {
        let removed = self.cues.remove(start, end);
        tracing::debug!(
            "Buffer {}: remove {}..{} ({} cues)",
            self.id,
            start,
            end,
            removed
        );

        for track_type in [TrackType::Video, TrackType::Audio] {
            if let Some(sink) = self.enabled_sink(track_type) {
                sink.lock().remove(start, end)?;
            }
        }
        Ok(())
    }

    /// Reset the worker and drop everything that has not been appended
    pub fn abort(&mut self) -> Result<()> {
        self.router.reset()?;
        self.push_in_flight = false;
        for track_type in [TrackType::Video, TrackType::Audio] {
            let track = self.track_mut(track_type);
            track.backlog.clear();
            if track.phase == AppendPhase::AwaitingDone {
                track.phase = AppendPhase::Idle;
            }
        }

        for track_type in [TrackType::Video, TrackType::Audio] {
            if let Some(sink) = self.enabled_sink(track_type) {
                sink.lock().abort()?;
            }
        }
        Ok(())
    }

    /// Time buffered on every enabled sink
    pub fn buffered(&self) -> TimeRanges {
        let video = self.enabled_sink(TrackType::Video).map(|s| s.lock().buffered());
        let audio = self.enabled_sink(TrackType::Audio).map(|s| s.lock().buffered());
        match (video, audio) {
            (Some(video), Some(audio)) => video.intersection(&audio),
            (Some(ranges), None) | (None, Some(ranges)) => ranges,
            (None, None) => TimeRanges::empty(),
        }
    }

    /// True while a push awaits its `Done` or an enabled sink is updating
    pub fn updating(&self) -> bool {
        self.push_in_flight
            || [TrackType::Video, TrackType::Audio]
                .into_iter()
                .filter_map(|t| self.enabled_sink(t))
                .any(|sink| sink.lock().updating())
    }

    /// Close metadata cues left open at the final duration
    pub fn end_of_stream(&mut self, duration: f64) {
        self.cues.end_of_stream(duration);
    }

    pub fn take_events(&mut self) -> Vec<BufferEvent> {
        std::mem::take(&mut self.events)
    }

    /// Close the worker connection
    pub fn terminate(&mut self) {
        self.push_in_flight = false;
        self.router.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.router.is_terminated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{negotiate, Negotiation};
    use crate::config::CodecDefaults;
    use crate::cues::InMemoryTextTracks;
    use crate::error::SinkError;
    use crate::segment::{CaptionRecord, Segment, WorkerCommand};
    use crate::tests::fixtures::{data_message, mock_native, NativeHandle, RecordingPort, WorkerLog};

    struct Harness {
        buffer: VirtualBuffer,
        native: Box<dyn NativeMediaSource>,
        handle: NativeHandle,
        sinks: SinkPool,
        tracks: InMemoryTextTracks,
        log: WorkerLog,
    }

    impl Harness {
        fn new(mime: &str) -> Self {
            let Negotiation::Virtual(codecs) = negotiate(mime, &CodecDefaults::default()) else {
                panic!("{} is not a transport stream", mime);
            };
            let log = WorkerLog::default();
            let router = SegmentRouter::new(Box::new(RecordingPort::new(log.clone())));
            let (native, handle) = mock_native();
            Self {
                buffer: VirtualBuffer::new(BufferId(0), codecs, router),
                native,
                handle,
                sinks: SinkPool::new(),
                tracks: InMemoryTextTracks::new(),
                log,
            }
        }

        fn deliver(&mut self, message: WorkerMessage) -> Result<()> {
            let mut ctx = PresentationContext {
                native: self.native.as_mut(),
                sinks: &mut self.sinks,
                text_tracks: &mut self.tracks,
                duration: f64::NAN,
                closed: false,
            };
            self.buffer.handle_message(message, &mut ctx)
        }

        /// Let a sink finish its append and report it
        fn settle(&mut self, track_type: TrackType) {
            self.handle.sink(track_type).unwrap().lock().updating = false;
            self.buffer.on_sink_event(track_type, SinkEvent::Update).unwrap();
            self.buffer.on_sink_event(track_type, SinkEvent::UpdateEnd).unwrap();
        }
    }

    #[test]
    fn test_no_append_before_done() {
        let mut h = Harness::new("video/mp2t");
        h.buffer.append_buffer(ByteView::from(vec![0x47u8])).unwrap();
        assert!(h.buffer.updating());

        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        assert_eq!(h.buffer.phase(TrackType::Video), AppendPhase::AwaitingDone);
        assert_eq!(h.handle.sink_count(), 0, "sinks are created on the first done");

        h.deliver(WorkerMessage::Done).unwrap();
        assert_eq!(h.handle.sink_count(), 2);
        assert_eq!(h.handle.appends(TrackType::Video).len(), 1);
        assert_eq!(h.handle.appends(TrackType::Audio).len(), 1);
        assert_eq!(h.buffer.phase(TrackType::Video), AppendPhase::Appending);
        assert!(h.buffer.updating());
    }

    #[test]
    fn test_one_append_per_type_per_cycle() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Video, &[2])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[3])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.settle(TrackType::Video);
        h.settle(TrackType::Audio);

        // video only in the next cycle
        h.deliver(data_message(TrackType::Video, &[4])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();

        assert_eq!(h.handle.appends(TrackType::Video).len(), 2);
        assert_eq!(h.handle.appends(TrackType::Audio).len(), 1);
        assert_eq!(h.buffer.phase(TrackType::Audio), AppendPhase::Idle);
    }

    #[test]
    fn test_video_init_on_every_append() {
        let mut h = Harness::new("video/mp2t; codecs=\"avc1.4d400d\"");
        for data in [[2u8, 3], [4, 5], [6, 7]] {
            let segment = Segment::new(TrackType::Video, data.to_vec()).with_init_segment(vec![0u8, 1]);
            h.deliver(WorkerMessage::Data(segment)).unwrap();
            h.deliver(WorkerMessage::Done).unwrap();
            h.settle(TrackType::Video);
        }

        let appends = h.handle.appends(TrackType::Video);
        assert_eq!(appends[0].as_ref(), &[0, 1, 2, 3]);
        assert_eq!(appends[1].as_ref(), &[0, 1, 4, 5]);
        assert_eq!(appends[2].as_ref(), &[0, 1, 6, 7]);
    }

    #[test]
    fn test_audio_init_only_when_armed() {
        fn cycle(h: &mut Harness, data: [u8; 2]) {
            let segment =
                Segment::new(TrackType::Audio, data.to_vec()).with_init_segment(vec![0u8, 1]);
            h.deliver(WorkerMessage::Data(segment)).unwrap();
            h.deliver(WorkerMessage::Done).unwrap();
            h.settle(TrackType::Audio);
        }

        let mut h = Harness::new("audio/mp2t; codecs=\"mp4a.40.2\"");

        assert!(h.buffer.append_audio_init_segment_next());
        cycle(&mut h, [2, 3]);
        assert!(!h.buffer.append_audio_init_segment_next());
        cycle(&mut h, [4, 5]);
        h.buffer.rearm_audio_init_segment();
        cycle(&mut h, [6, 7]);
        cycle(&mut h, [8, 9]);

        let appends = h.handle.appends(TrackType::Audio);
        assert_eq!(appends[0].as_ref(), &[0, 1, 2, 3]);
        assert_eq!(appends[1].as_ref(), &[4, 5]);
        assert_eq!(appends[2].as_ref(), &[0, 1, 6, 7]);
        assert_eq!(appends[3].as_ref(), &[8, 9]);
    }

    #[test]
    fn test_second_done_waits_for_updateend() {
        let mut h = Harness::new("video/mp2t; codecs=\"avc1.4d400d\"");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.deliver(data_message(TrackType::Video, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        assert_eq!(h.handle.appends(TrackType::Video).len(), 1);

        h.settle(TrackType::Video);
        assert_eq!(h.handle.appends(TrackType::Video).len(), 2);
        assert_eq!(h.buffer.phase(TrackType::Video), AppendPhase::Appending);

        h.settle(TrackType::Video);
        assert_eq!(h.buffer.phase(TrackType::Video), AppendPhase::Idle);
    }

    #[test]
    fn test_aggregated_events() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        assert!(h.buffer.take_events().is_empty());

        h.buffer.on_sink_event(TrackType::Video, SinkEvent::UpdateStart).unwrap();
        h.buffer.on_sink_event(TrackType::Audio, SinkEvent::UpdateStart).unwrap();
        assert_eq!(h.buffer.take_events(), vec![BufferEvent::UpdateStart]);

        h.settle(TrackType::Audio);
        assert!(h.buffer.take_events().is_empty());
        h.settle(TrackType::Video);
        assert_eq!(
            h.buffer.take_events(),
            vec![BufferEvent::Update, BufferEvent::UpdateEnd]
        );
    }

    #[test]
    fn test_disabled_audio_is_ignored() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        h.buffer.set_audio_disabled(true);
        h.deliver(WorkerMessage::Done).unwrap();

        assert_eq!(h.handle.appends(TrackType::Audio).len(), 0);
        h.buffer.on_sink_event(TrackType::Audio, SinkEvent::UpdateStart).unwrap();
        assert!(h.buffer.take_events().is_empty());

        {
            let video = h.handle.sink(TrackType::Video).unwrap();
            video.lock().buffered = TimeRanges::new(vec![(1.0, 10.0)]);
            let audio = h.handle.sink(TrackType::Audio).unwrap();
            audio.lock().buffered = TimeRanges::new(vec![(2.0, 11.0)]);
        }
        assert_eq!(h.buffer.buffered(), TimeRanges::new(vec![(1.0, 10.0)]));

        h.buffer.remove(3.0, 10.0).unwrap();
        assert_eq!(h.handle.sink(TrackType::Video).unwrap().lock().removes.len(), 1);
        assert!(h.handle.sink(TrackType::Audio).unwrap().lock().removes.is_empty());
    }

    #[test]
    fn test_buffered_intersection() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();

        h.handle.sink(TrackType::Video).unwrap().lock().buffered = TimeRanges::new(vec![(1.0, 10.0)]);
        h.handle.sink(TrackType::Audio).unwrap().lock().buffered = TimeRanges::new(vec![(2.0, 11.0)]);
        assert_eq!(h.buffer.buffered(), TimeRanges::new(vec![(2.0, 10.0)]));
    }

    #[test]
    fn test_audio_append_start_sent_before_push() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.handle.sink(TrackType::Audio).unwrap().lock().buffered =
            TimeRanges::new(vec![(0.0, 4.0), (6.0, 9.5)]);

        h.buffer.append_buffer(ByteView::from(vec![0x47u8])).unwrap();

        let actions: Vec<_> = h.log.commands().iter().map(|c| c.action()).collect();
        assert_eq!(actions, vec!["setAudioAppendStart", "push", "flush"]);
        assert_eq!(h.log.commands()[0], WorkerCommand::SetAudioAppendStart(9.5));
    }

    #[test]
    fn test_timestamp_offset_validation() {
        let mut h = Harness::new("video/mp2t");
        h.buffer.set_timestamp_offset(42.0).unwrap();
        h.buffer.set_timestamp_offset(-1.0).unwrap();
        h.buffer.set_timestamp_offset(f64::NAN).unwrap();
        h.buffer.set_timestamp_offset(f64::INFINITY).unwrap();

        assert_eq!(h.buffer.timestamp_offset(), 42.0);
        assert_eq!(h.log.commands(), vec![WorkerCommand::SetTimestampOffset(42.0)]);
    }

    #[test]
    fn test_captions_emit_usage_once() {
        let mut h = Harness::new("video/mp2t");
        h.buffer.set_timestamp_offset(10.0).unwrap();
        let caption = CaptionRecord {
            stream: "CC1".to_string(),
            start_time: 1.0,
            end_time: 3.0,
            text: "This is an in-band caption in CC1".to_string(),
        };
        for _ in 0..2 {
            let segment = Segment::new(TrackType::Video, vec![1u8])
                .with_captions(vec![caption.clone()])
                .with_caption_streams(["CC1"]);
            h.deliver(WorkerMessage::Data(segment)).unwrap();
            h.deliver(WorkerMessage::Done).unwrap();
            h.settle(TrackType::Video);
        }

        let usage: Vec<_> = h
            .buffer
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, BufferEvent::Usage(_)))
            .collect();
        assert_eq!(usage, vec![BufferEvent::Usage(UsageSignal::InBandCaptions)]);

        let track = h.buffer.cues().caption_track("CC1").unwrap().lock();
        let cues = track.cues.as_ref().unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!((cues[0].start_time, cues[0].end_time), (11.0, 13.0));
    }

    #[test]
    fn test_rejected_append_surfaces() {
        let mut h = Harness::new("video/mp2t; codecs=\"avc1.4d400d\"");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.settle(TrackType::Video);
        h.handle.sink(TrackType::Video).unwrap().lock().reject_appends = true;

        h.deliver(data_message(TrackType::Video, &[2])).unwrap();
        let err = h.deliver(WorkerMessage::Done).unwrap_err();
        assert!(matches!(
            err,
            MediaSourceError::Append {
                track: TrackType::Video,
                source: SinkError::QuotaExceeded
            }
        ));
        assert_eq!(h.buffer.phase(TrackType::Video), AppendPhase::Idle);
    }

    #[test]
    fn test_rejected_video_keeps_audio() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.settle(TrackType::Video);
        h.settle(TrackType::Audio);
        h.handle.sink(TrackType::Video).unwrap().lock().reject_appends = true;

        h.deliver(data_message(TrackType::Video, &[3])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[4])).unwrap();
        let err = h.deliver(WorkerMessage::Done).unwrap_err();
        assert!(matches!(
            err,
            MediaSourceError::Append {
                track: TrackType::Video,
                ..
            }
        ));
        assert_eq!(h.handle.appends(TrackType::Audio).len(), 2);
        assert_eq!(h.buffer.phase(TrackType::Audio), AppendPhase::Appending);
    }

    #[test]
    fn test_disabled_audio_finishes_in_flight_append() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(data_message(TrackType::Audio, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.settle(TrackType::Video);
        h.deliver(data_message(TrackType::Audio, &[3])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        assert_eq!(h.buffer.phase(TrackType::Audio), AppendPhase::Appending);

        h.buffer.set_audio_disabled(true);
        h.buffer.take_events();
        h.settle(TrackType::Audio);
        assert_eq!(h.buffer.phase(TrackType::Audio), AppendPhase::Idle);
        assert!(h.buffer.take_events().is_empty());
        assert_eq!(h.handle.appends(TrackType::Audio).len(), 1, "queued audio is dropped");

        h.buffer.set_audio_disabled(false);
        h.deliver(data_message(TrackType::Audio, &[4])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        assert_eq!(h.handle.appends(TrackType::Audio).len(), 2);
    }

    #[test]
    fn test_abort_drops_pending_and_backlog() {
        let mut h = Harness::new("video/mp2t; codecs=\"avc1.4d400d\"");
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.deliver(data_message(TrackType::Video, &[2])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();
        h.deliver(data_message(TrackType::Video, &[3])).unwrap();

        h.buffer.abort().unwrap();
        assert_eq!(h.log.commands(), vec![WorkerCommand::Reset]);
        assert_eq!(h.handle.sink(TrackType::Video).unwrap().lock().aborts, 1);

        // the queued fragment is gone, so done flushes nothing
        h.deliver(WorkerMessage::Done).unwrap();
        h.settle(TrackType::Video);
        assert_eq!(h.handle.appends(TrackType::Video).len(), 1);
        assert_eq!(h.buffer.phase(TrackType::Video), AppendPhase::Idle);
    }

    #[test]
    fn test_trackinfo_drops_absent_codec() {
        let mut h = Harness::new("video/mp2t");
        h.deliver(WorkerMessage::TrackInfo(crate::segment::TrackPresence {
            has_audio: false,
            has_video: true,
        }))
        .unwrap();
        h.deliver(data_message(TrackType::Video, &[1])).unwrap();
        h.deliver(WorkerMessage::Done).unwrap();

        assert_eq!(h.handle.sink_count(), 1);
        assert!(!h.buffer.has_audio());
        assert!(h.buffer.sink(TrackType::Audio).is_none());
    }
}
