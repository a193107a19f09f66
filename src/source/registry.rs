//! Virtual media source
//!
//! Owns every buffer of one presentation: virtual buffers for transport
//! streams and plain native sinks for everything else. Keeps the active
//! set current, fakes an infinite duration for live streams and routes
//! worker messages and sink events to the right buffer.

use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use super::active::{select_active_buffers, AudioTrack, BufferProfile};
use super::duration::DurationEmulator;
use crate::buffer::{
    BufferEvent, BufferId, NativeMediaSource, PresentationContext, SinkEvent, SinkHandle,
    SinkPool, TimeRanges, VirtualBuffer,
};
use crate::codec::{negotiate, Negotiation};
use crate::config::SourceConfig;
use crate::cues::{duration_of_video, InMemoryTextTracks, TextTrackHost};
use crate::error::{MediaSourceError, Result};
use crate::segment::{ByteView, SegmentRouter, TrackType, WorkerFactory, WorkerMessage};

/// Presentation ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Closed,
    Open,
    Ended,
}

/// A buffer handed out by [`VirtualMediaSource::add_source_buffer`]
#[derive(Clone)]
pub enum SourceBufferRef {
    /// Transport stream buffer driven through a worker
    Virtual(BufferId),
    /// Native sink used as-is
    Native(SinkHandle),
}

impl SourceBufferRef {
    pub fn buffer_id(&self) -> Option<BufferId> {
        match self {
            SourceBufferRef::Virtual(id) => Some(*id),
            SourceBufferRef::Native(_) => None,
        }
    }
}

impl std::fmt::Debug for SourceBufferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceBufferRef::Virtual(id) => write!(f, "Virtual({})", id),
            SourceBufferRef::Native(sink) => write!(f, "Native({:?})", sink.lock().mime_type()),
        }
    }
}

pub struct VirtualMediaSource {
    id: Uuid,
    config: SourceConfig,
    native: Box<dyn NativeMediaSource>,
    workers: Box<dyn WorkerFactory>,
    text_tracks: Box<dyn TextTrackHost>,
    sinks: SinkPool,
    buffers: Vec<VirtualBuffer>,
    source_buffers: Vec<SourceBufferRef>,
    active: Vec<BufferId>,
    audio_tracks: Option<Vec<AudioTrack>>,
    duration: DurationEmulator,
    ready_state: ReadyState,
    next_buffer_id: usize,
}

impl VirtualMediaSource {
    pub fn new(
        config: SourceConfig,
        native: Box<dyn NativeMediaSource>,
        workers: Box<dyn WorkerFactory>,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::info!("Created media source {}", id);
        Self {
            id,
            config,
            native,
            workers,
            text_tracks: Box::new(InMemoryTextTracks::new()),
            sinks: SinkPool::new(),
            buffers: Vec::new(),
            source_buffers: Vec::new(),
            active: Vec::new(),
            audio_tracks: None,
            duration: DurationEmulator::new(),
            ready_state: ReadyState::Closed,
            next_buffer_id: 0,
        }
    }

    /// Use the host's text track list instead of an in-memory one
    pub fn with_text_tracks(mut self, text_tracks: Box<dyn TextTrackHost>) -> Self {
        self.text_tracks = text_tracks;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Every buffer, in creation order
    pub fn source_buffers(&self) -> &[SourceBufferRef] {
        &self.source_buffers
    }

    /// Active virtual buffers, in creation order
    pub fn active_source_buffers(&self) -> &[BufferId] {
        &self.active
    }

    pub fn buffer(&self, id: BufferId) -> Option<&VirtualBuffer> {
        self.buffers.iter().find(|b| b.id() == id)
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut VirtualBuffer> {
        self.buffers
            .iter_mut()
            .find(|b| b.id() == id)
            .ok_or(MediaSourceError::UnknownBuffer(id))
    }

    pub fn text_tracks(&self) -> &dyn TextTrackHost {
        self.text_tracks.as_ref()
    }

    /// Native sink shared by the virtual buffers for this media type
    pub fn native_sink(&self, track_type: TrackType) -> Option<SinkHandle> {
        self.sinks.get(track_type)
    }

    /// Create a buffer for a MIME type.
    ///
    /// Transport streams get a virtual buffer with its own worker; other
    /// types are attached to a native sink directly.
    pub fn add_source_buffer(&mut self, mime: &str) -> Result<SourceBufferRef> {
        let codecs = match negotiate(mime, &self.config.codecs) {
            Negotiation::Passthrough => {
                let sink = self
                    .native
                    .add_source_buffer(mime)
                    .map_err(|source| MediaSourceError::SinkCreate {
                        mime: mime.to_string(),
                        source,
                    })?;
                tracing::info!("Media source {}: native buffer for {:?}", self.id, mime);
                let buffer = SourceBufferRef::Native(Arc::new(Mutex::new(sink)));
                self.source_buffers.push(buffer.clone());
                return Ok(buffer);
            }
            Negotiation::Virtual(codecs) => codecs,
        };

        let worker = self.workers.create(&self.config.worker)?;
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        let mut buffer = VirtualBuffer::new(id, codecs, SegmentRouter::new(worker));

        // alternate audio: attach sinks before the first done
        if let Some(first) = self.buffers.first_mut() {
            first.ensure_sinks(self.native.as_mut(), &mut self.sinks)?;
            buffer.ensure_sinks(self.native.as_mut(), &mut self.sinks)?;
        }

        tracing::info!(
            "Media source {}: virtual buffer {} for {:?} (codecs {:?})",
            self.id,
            id,
            mime,
            buffer.codecs().codec_list()
        );
        self.buffers.push(buffer);
        self.source_buffers.push(SourceBufferRef::Virtual(id));
        self.update_active_source_buffers();
        Ok(SourceBufferRef::Virtual(id))
    }

    /// Recompute which buffers are active and which deliver audio
    pub fn update_active_source_buffers(&mut self) {
        let profiles: Vec<BufferProfile> = self
            .buffers
            .iter()
            .map(|b| BufferProfile {
                has_video: b.has_video(),
                has_audio: b.has_audio(),
            })
            .collect();
        let selection = select_active_buffers(&profiles, self.audio_tracks.as_deref());

        for (buffer, disabled) in self.buffers.iter_mut().zip(&selection.audio_disabled) {
            buffer.rearm_audio_init_segment();
            buffer.set_audio_disabled(*disabled);
        }
        self.active = selection
            .active
            .iter()
            .map(|&index| self.buffers[index].id())
            .collect();

        tracing::debug!(
            "Media source {}: active buffers {:?}",
            self.id,
            self.active
        );
    }

    /// The host's audio track list was added to, removed from or changed
    pub fn on_audio_tracks_changed(&mut self, tracks: Vec<AudioTrack>) {
        self.audio_tracks = Some(tracks);
        self.update_active_source_buffers();
    }

    /// The active rendition changed
    pub fn on_media_change(&mut self) {
        for buffer in &mut self.buffers {
            buffer.rearm_audio_init_segment();
        }
    }

    pub fn append_buffer(&mut self, id: BufferId, view: ByteView) -> Result<()> {
        self.buffer_mut(id)?.append_buffer(view)
    }

    pub fn set_timestamp_offset(&mut self, id: BufferId, offset: f64) -> Result<()> {
        self.buffer_mut(id)?.set_timestamp_offset(offset)
    }

    pub fn remove(&mut self, id: BufferId, start: f64, end: f64) -> Result<()> {
        self.buffer_mut(id)?.remove(start, end)
    }

    pub fn abort(&mut self, id: BufferId) -> Result<()> {
        self.buffer_mut(id)?.abort()
    }

    pub fn buffered(&self, id: BufferId) -> Result<TimeRanges> {
        self.buffer(id)
            .map(VirtualBuffer::buffered)
            .ok_or(MediaSourceError::UnknownBuffer(id))
    }

    pub fn updating(&self, id: BufferId) -> Result<bool> {
        self.buffer(id)
            .map(VirtualBuffer::updating)
            .ok_or(MediaSourceError::UnknownBuffer(id))
    }

    /// Hand one worker message to its buffer
    pub fn handle_worker_message(&mut self, id: BufferId, message: WorkerMessage) -> Result<()> {
        let index = self
            .buffers
            .iter()
            .position(|b| b.id() == id)
            .ok_or(MediaSourceError::UnknownBuffer(id))?;
        self.dispatch(index, message)
    }

    fn dispatch(&mut self, index: usize, message: WorkerMessage) -> Result<()> {
        let duration = self.duration.duration(self.native.as_ref());
        let mut ctx = PresentationContext {
            native: self.native.as_mut(),
            sinks: &mut self.sinks,
            text_tracks: self.text_tracks.as_mut(),
            duration,
            closed: self.ready_state == ReadyState::Closed,
        };
        self.buffers[index].handle_message(message, &mut ctx)
    }

    /// Drain every worker and dispatch what it produced. Returns the number
    /// of messages handled.
    pub fn poll_workers(&mut self) -> Result<usize> {
        let mut handled = 0;
        for index in 0..self.buffers.len() {
            while let Some(message) = self.buffers[index].try_recv() {
                self.dispatch(index, message)?;
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Forward an update event of a pooled native sink to every virtual
    /// buffer attached to it
    pub fn handle_sink_event(&mut self, track_type: TrackType, event: SinkEvent) -> Result<()> {
        let Some(sink) = self.sinks.get(track_type) else {
            return Ok(());
        };
        for buffer in &mut self.buffers {
            let attached = buffer
                .sink(track_type)
                .is_some_and(|handle| Arc::ptr_eq(handle, &sink));
            if attached {
                buffer.on_sink_event(track_type, event)?;
            }
        }
        Ok(())
    }

    /// Collect the events raised by all virtual buffers
    pub fn drain_events(&mut self) -> Vec<(BufferId, BufferEvent)> {
        self.buffers
            .iter_mut()
            .flat_map(|b| {
                let id = b.id();
                b.take_events().into_iter().map(move |event| (id, event))
            })
            .collect()
    }

    pub fn duration(&self) -> f64 {
        self.duration.duration(self.native.as_ref())
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration.set_duration(duration, self.native.as_mut());
    }

    /// Extend the seekable window of a live presentation
    pub fn add_seekable_range(&mut self, start: f64, end: f64) -> Result<()> {
        self.duration
            .add_seekable_range(start, end, self.native.as_mut())
    }

    /// The host attached the presentation to a media element
    pub fn open(&mut self) {
        self.ready_state = ReadyState::Open;
    }

    /// No more data will be appended
    pub fn end_of_stream(&mut self) {
        self.ready_state = ReadyState::Ended;
        let duration = duration_of_video(self.duration());
        for buffer in &mut self.buffers {
            buffer.end_of_stream(duration);
        }
        tracing::info!("Media source {}: ended at {}", self.id, duration);
    }

    /// Tear down: terminate every worker and release every buffer
    pub fn close(&mut self) {
        for buffer in &mut self.buffers {
            buffer.terminate();
        }
        tracing::info!(
            "Media source {}: closed, released {} buffers",
            self.id,
            self.buffers.len()
        );
        self.buffers.clear();
        self.source_buffers.clear();
        self.active.clear();
        self.sinks.clear();
        self.ready_state = ReadyState::Closed;
    }
}

impl Drop for VirtualMediaSource {
    fn drop(&mut self) {
        for buffer in &mut self.buffers {
            buffer.terminate();
        }
    }
}
