//! Native sink interfaces
//!
//! The platform's fMP4 buffers and the media source that creates them.
//! Both are implemented by the host; this crate only drives them.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{MediaSourceError, Result, SinkError};
use crate::segment::TrackType;

/// A native fMP4 buffer
pub trait MediaSink: Send {
    /// MIME type the sink was created with
    fn mime_type(&self) -> &str;

    /// Start an append. Completion is reported later as sink events.
    fn append(&mut self, data: Bytes) -> std::result::Result<(), SinkError>;

    fn remove(&mut self, start: f64, end: f64) -> std::result::Result<(), SinkError>;

    fn abort(&mut self) -> std::result::Result<(), SinkError>;

    fn updating(&self) -> bool;

    fn buffered(&self) -> TimeRanges;
}

/// The native media source sinks are created from
pub trait NativeMediaSource: Send {
    fn add_source_buffer(&mut self, mime: &str)
        -> std::result::Result<Box<dyn MediaSink>, SinkError>;

    fn duration(&self) -> f64;

    fn set_duration(&mut self, duration: f64);
}

/// Shared reference to a native sink
pub type SinkHandle = Arc<Mutex<Box<dyn MediaSink>>>;

/// Ordered, non-overlapping `[start, end)` ranges in seconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<(f64, f64)>,
}

impl TimeRanges {
    /// Build from arbitrary ranges: empty ones are dropped, the rest are
    /// sorted and overlapping ones merged.
    pub fn new(mut ranges: Vec<(f64, f64)>) -> Self {
        ranges.retain(|(start, end)| end > start);
        ranges.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { ranges: merged }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn start(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).map(|r| r.0)
    }

    pub fn end(&self, index: usize) -> Option<f64> {
        self.ranges.get(index).map(|r| r.1)
    }

    /// End of the last range
    pub fn last_end(&self) -> Option<f64> {
        self.ranges.last().map(|r| r.1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.ranges.iter().copied()
    }

    /// Time covered by both sets
    pub fn intersection(&self, other: &TimeRanges) -> TimeRanges {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a_start, a_end) = self.ranges[i];
            let (b_start, b_end) = other.ranges[j];
            let start = a_start.max(b_start);
            let end = a_end.min(b_end);
            if start < end {
                out.push((start, end));
            }
            if a_end < b_end {
                i += 1;
            } else {
                j += 1;
            }
        }
        TimeRanges { ranges: out }
    }
}

/// Native sinks shared between the virtual buffers of one presentation,
/// at most one per media type.
#[derive(Default)]
pub struct SinkPool {
    sinks: BTreeMap<TrackType, SinkHandle>,
}

impl SinkPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_type: TrackType) -> Option<SinkHandle> {
        self.sinks.get(&track_type).cloned()
    }

    /// The pooled sink for this type, asking the native source for a new
    /// one the first time.
    pub fn get_or_create(
        &mut self,
        track_type: TrackType,
        mime: &str,
        native: &mut dyn NativeMediaSource,
    ) -> Result<SinkHandle> {
        if let Some(sink) = self.sinks.get(&track_type) {
            return Ok(sink.clone());
        }

        let sink = native
            .add_source_buffer(mime)
            .map_err(|source| MediaSourceError::SinkCreate {
                mime: mime.to_string(),
                source,
            })?;
        tracing::info!("Created native {} sink {:?}", track_type, mime);

        let handle: SinkHandle = Arc::new(Mutex::new(sink));
        self.sinks.insert(track_type, handle.clone());
        Ok(handle)
    }

    pub fn clear(&mut self) {
        self.sinks.clear();
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}
