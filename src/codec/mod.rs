//! Codec negotiation
//!
//! Turns the MIME type handed to `add_source_buffer` into the pair of
//! codecs the native audio and video sinks are created with.

pub mod negotiator;

pub use negotiator::{
    is_audio_codec, is_transport_stream, is_video_codec, negotiate, parse_content_type,
    translate_legacy_codec, ContentType, NegotiatedCodecs, Negotiation,
};
