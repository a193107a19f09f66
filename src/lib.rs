//! Virtual media source for MPEG-2 transport streams
//!
//! Presents a transmux worker plus a pair of fMP4 sinks (audio and video)
//! as one logical media source. Transport stream bytes go to the worker;
//! its output is demultiplexed per track type, appended to the right sink
//! once per flush cycle, and turned into caption and metadata cues along
//! the way.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod config_file;
pub mod cues;
pub mod error;
pub mod logging;
pub mod segment;
pub mod source;

#[cfg(test)]
pub(crate) mod tests;

pub use buffer::{BufferEvent, BufferId, MediaSink, NativeMediaSource, SinkEvent, TimeRanges};
pub use config::SourceConfig;
pub use error::{MediaSourceError, Result, SinkError};
pub use segment::{ByteView, Transmuxer, TransmuxerFactory, WorkerCommand, WorkerMessage};
pub use source::{AudioTrack, AudioTrackKind, SourceBufferRef, VirtualMediaSource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
