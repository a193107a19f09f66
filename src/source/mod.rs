//! Media source
//!
//! The presentation-level object: buffer registry, active buffer policy
//! and duration handling.

pub mod active;
pub mod duration;
pub mod registry;

pub use active::{select_active_buffers, ActiveSelection, AudioTrack, AudioTrackKind, BufferProfile};
pub use duration::DurationEmulator;
pub use registry::{ReadyState, SourceBufferRef, VirtualMediaSource};
