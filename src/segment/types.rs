//! Segment and track types exchanged with the transmux worker

use bytes::Bytes;
use std::fmt;

use crate::error::{MediaSourceError, Result};

/// Elementary stream type of a transmuxed segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackType {
    Audio,
    Video,
}

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Audio => "audio",
            TrackType::Video => "video",
        }
    }

    /// The other media type
    pub fn other(&self) -> TrackType {
        match self {
            TrackType::Audio => TrackType::Video,
            TrackType::Video => TrackType::Audio,
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A window onto a shared backing buffer.
///
/// Only `byte_offset..byte_offset + byte_length` is ever transmitted or
/// appended; the rest of the backing buffer is never looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteView {
    buffer: Bytes,
    byte_offset: usize,
    byte_length: usize,
}

impl ByteView {
    /// Create a view, validating that the window fits the buffer
    pub fn new(buffer: impl Into<Bytes>, byte_offset: usize, byte_length: usize) -> Result<Self> {
        let buffer = buffer.into();
        let fits = byte_offset
            .checked_add(byte_length)
            .is_some_and(|end| end <= buffer.len());
        if !fits {
            return Err(MediaSourceError::InvalidByteRange {
                offset: byte_offset,
                length: byte_length,
                available: buffer.len(),
            });
        }
        Ok(Self {
            buffer,
            byte_offset,
            byte_length,
        })
    }

    /// The whole backing buffer
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn is_empty(&self) -> bool {
        self.byte_length == 0
    }

    /// The declared window, without copying
    pub fn to_bytes(&self) -> Bytes {
        self.buffer
            .slice(self.byte_offset..self.byte_offset + self.byte_length)
    }
}

impl From<Bytes> for ByteView {
    fn from(buffer: Bytes) -> Self {
        let byte_length = buffer.len();
        Self {
            buffer,
            byte_offset: 0,
            byte_length,
        }
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        Bytes::from(data).into()
    }
}

impl From<&'static [u8]> for ByteView {
    fn from(data: &'static [u8]) -> Self {
        Bytes::from_static(data).into()
    }
}

/// Descriptive track information reported by the transmuxer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub profile_idc: Option<u8>,
    pub level_idc: Option<u8>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
}

/// A CEA-608 caption in transmuxer-local time
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionRecord {
    /// Caption stream id, `CC1` to `CC4`
    pub stream: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

/// One ID3 frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFrame {
    /// Frame id, e.g. `TXXX` or `PRIV`
    pub id: String,
    pub url: Option<String>,
    pub value: Option<String>,
    pub data: Option<Bytes>,
}

impl MetadataFrame {
    /// Cue text: the value, else the url, else the raw data
    pub fn text(&self) -> String {
        if let Some(value) = &self.value {
            return value.clone();
        }
        if let Some(url) = &self.url {
            return url.clone();
        }
        self.data
            .as_ref()
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .unwrap_or_default()
    }
}

/// An ID3 tag: every frame becomes one cue at `cue_time`
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub cue_time: f64,
    pub frames: Vec<MetadataFrame>,
}

/// A transmuxed fMP4 fragment plus the side data found alongside it
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub track_type: TrackType,
    pub data: ByteView,
    pub init_segment: Option<ByteView>,
    pub captions: Vec<CaptionRecord>,
    /// Caption streams seen so far, even without captions in this segment
    pub caption_streams: Vec<String>,
    pub metadata: Vec<MetadataRecord>,
    pub metadata_dispatch_type: Option<String>,
    pub info: Option<TrackInfo>,
}

impl Segment {
    pub fn new(track_type: TrackType, data: impl Into<ByteView>) -> Self {
        Self {
            track_type,
            data: data.into(),
            init_segment: None,
            captions: Vec::new(),
            caption_streams: Vec::new(),
            metadata: Vec::new(),
            metadata_dispatch_type: None,
            info: None,
        }
    }

    pub fn with_init_segment(mut self, init_segment: impl Into<ByteView>) -> Self {
        self.init_segment = Some(init_segment.into());
        self
    }

    pub fn with_captions(mut self, captions: Vec<CaptionRecord>) -> Self {
        self.captions = captions;
        self
    }

    pub fn with_caption_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caption_streams = streams.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(
        mut self,
        dispatch_type: impl Into<String>,
        metadata: Vec<MetadataRecord>,
    ) -> Self {
        self.metadata_dispatch_type = Some(dispatch_type.into());
        self.metadata = metadata;
        self
    }

    pub fn with_info(mut self, info: TrackInfo) -> Self {
        self.info = Some(info);
        self
    }
}

/// Which elementary streams the transmuxer found in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackPresence {
    pub has_audio: bool,
    pub has_video: bool,
}

impl TrackPresence {
    pub fn has(&self, track_type: TrackType) -> bool {
        match track_type {
            TrackType::Audio => self.has_audio,
            TrackType::Video => self.has_video,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subrange_view() {
        let backing = Bytes::from_static(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let view = ByteView::new(backing.clone(), 5, 2).unwrap();

        assert_eq!(view.buffer().len(), 10);
        assert_eq!(view.to_bytes().as_ref(), &[5, 6]);
        // zero-copy: the window points into the backing allocation
        assert_eq!(view.to_bytes().as_ptr(), backing[5..].as_ptr());
    }

    #[test]
    fn test_view_out_of_bounds() {
        let err = ByteView::new(vec![0u8; 4], 3, 2).unwrap_err();
        assert!(matches!(
            err,
            MediaSourceError::InvalidByteRange {
                offset: 3,
                length: 2,
                available: 4
            }
        ));
        assert!(ByteView::new(vec![0u8; 4], usize::MAX, 2).is_err());
        assert!(ByteView::new(vec![0u8; 4], 4, 0).unwrap().is_empty());
    }

    #[test]
    fn test_frame_text_precedence() {
        let mut frame = MetadataFrame {
            id: "PRIV".to_string(),
            data: Some(Bytes::from_static(b"priv")),
            ..Default::default()
        };
        assert_eq!(frame.text(), "priv");

        frame.url = Some("http://example.com".to_string());
        assert_eq!(frame.text(), "http://example.com");

        frame.value = Some("text tag".to_string());
        assert_eq!(frame.text(), "text tag");

        assert_eq!(MetadataFrame::default().text(), "");
    }

    #[test]
    fn test_track_type_display() {
        assert_eq!(TrackType::Audio.to_string(), "audio");
        assert_eq!(TrackType::Video.to_string(), "video");
        assert_eq!(TrackType::Video.other(), TrackType::Audio);
    }
}
