//! Segment dispatch
//!
//! Types exchanged with the transmux worker, the worker channel itself,
//! and the router that demultiplexes worker output per track type.

pub mod router;
pub mod types;
pub mod worker;

pub use router::{PendingSegments, PendingTrack, Routed, SegmentRouter};
pub use types::{
    ByteView, CaptionRecord, MetadataFrame, MetadataRecord, Segment, TrackInfo, TrackPresence,
    TrackType,
};
pub use worker::{
    ThreadWorker, Transmuxer, TransmuxerFactory, WorkerCommand, WorkerFactory, WorkerMessage,
    WorkerPort,
};
