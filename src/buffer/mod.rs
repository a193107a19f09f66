//! Buffers
//!
//! Native sink interfaces, the update event aggregator and the virtual
//! buffer that ties a worker to a pair of native sinks.

pub mod aggregator;
pub mod sink;
pub mod virtual_buffer;

pub use aggregator::{BusyState, SinkEvent, UpdateAggregator};
pub use sink::{MediaSink, NativeMediaSource, SinkHandle, SinkPool, TimeRanges};
pub use virtual_buffer::{
    AppendPhase, BufferEvent, BufferId, PresentationContext, UsageSignal, VirtualBuffer,
};
