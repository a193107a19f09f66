//! MIME type and codec string negotiation

use std::collections::BTreeMap;

use crate::config::CodecDefaults;
use crate::segment::TrackType;

// helper.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

/// A parsed `type/subtype; name=value` content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// The `type/subtype` part, trimmed
    pub mime: String,
    /// Parameters with quotes stripped
    pub parameters: BTreeMap<String, String>,
}

impl ContentType {
    /// The `codecs` parameter, if present
    pub fn codecs(&self) -> Option<&str> {
        self.parameters.get("codecs").map(String::as_str)
    }
}

/// Parse a content type string.
///
/// Parameters without a `=` are ignored.
pub fn parse_content_type(value: &str) -> ContentType {
    let mut parts = value.trim().split(';');
    let mime = parts.next().unwrap_or_default().trim().to_string();

    let mut parameters = BTreeMap::new();
    for part in parts {
        if let Some((name, value)) = part.trim().split_once('=') {
            let name = name.replace('"', "").trim().to_string();
            let value = value.replace('"', "").trim().to_string();
            parameters.insert(name, value);
        }
    }

    ContentType { mime, parameters }
}

/// Whether this MIME type carries MPEG-2 transport stream data
pub fn is_transport_stream(mime: &str) -> bool {
    regex!(r"(?i)^(video|audio)/mp2t$").is_match(mime.trim())
}

/// Whether the codec string names an AAC-family audio codec
pub fn is_audio_codec(codec: &str) -> bool {
    regex!(r"(?i)^mp4a\.[\da-f]+\.\d+$").is_match(codec)
}

/// Whether the codec string names an H.264 video codec
pub fn is_video_codec(codec: &str) -> bool {
    regex!(r"(?i)^avc1\.[\da-f]{6}$").is_match(codec)
}

/// Rewrite an old-style `avc1.<profile>.<level>` identifier (decimal
/// numbers) to the `avc1.PPCCLL` hex form. Other codecs pass through.
pub fn translate_legacy_codec(codec: &str) -> String {
    let Some(caps) = regex!(r"(?i)^avc1\.(\d+)\.(\d+)$").captures(codec) else {
        return codec.to_string();
    };

    // Only the low byte survives, as with a two-digit hex slice.
    let low_byte = |s: &str| s.parse::<u64>().map(|n| (n & 0xff) as u8);
    match (low_byte(&caps[1]), low_byte(&caps[2])) {
        (Ok(profile), Ok(level)) => format!("avc1.{:02x}00{:02x}", profile, level),
        _ => codec.to_string(),
    }
}

/// Codecs requested for one virtual buffer, in canonical per-track form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiatedCodecs {
    pub video: Option<String>,
    pub audio: Option<String>,
}

impl NegotiatedCodecs {
    /// Codec for a track type
    pub fn get(&self, track_type: TrackType) -> Option<&str> {
        match track_type {
            TrackType::Audio => self.audio.as_deref(),
            TrackType::Video => self.video.as_deref(),
        }
    }

    /// Forget the codec for a track type
    pub fn clear(&mut self, track_type: TrackType) {
        match track_type {
            TrackType::Audio => self.audio = None,
            TrackType::Video => self.video = None,
        }
    }

    /// Whether both media types were requested
    pub fn is_combined(&self) -> bool {
        self.video.is_some() && self.audio.is_some()
    }

    /// Codecs in canonical order: video first, then audio
    pub fn codec_list(&self) -> Vec<&str> {
        self.video
            .as_deref()
            .into_iter()
            .chain(self.audio.as_deref())
            .collect()
    }

    /// MIME type for the native sink of a track type
    pub fn sink_mime(&self, track_type: TrackType) -> Option<String> {
        self.get(track_type)
            .map(|codec| format!("{}/mp4;codecs=\"{}\"", track_type, codec))
    }
}

/// Outcome of negotiating a MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Already fragmented MP4: attach a native sink directly
    Passthrough,
    /// Transport stream: virtualize with these codecs
    Virtual(NegotiatedCodecs),
}

/// Negotiate the codecs for a MIME type. Never fails: unknown or missing
/// codecs fall back to the defaults.
pub fn negotiate(mime: &str, defaults: &CodecDefaults) -> Negotiation {
    let content_type = parse_content_type(mime);
    if !is_transport_stream(&content_type.mime) {
        return Negotiation::Passthrough;
    }

    let mut codecs = NegotiatedCodecs::default();
    for token in content_type.codecs().unwrap_or_default().split(',') {
        let codec = translate_legacy_codec(token.trim());
        if is_audio_codec(&codec) {
            codecs.audio = Some(codec);
        } else if is_video_codec(&codec) {
            codecs.video = Some(codec);
        } else if !codec.is_empty() {
            tracing::warn!("Discarding unrecognized codec {:?} in {:?}", codec, mime);
        }
    }

    if codecs.video.is_none() && codecs.audio.is_none() {
        codecs.video = Some(defaults.video.clone());
        codecs.audio = Some(defaults.audio.clone());
    }

    tracing::debug!("Negotiated {:?} -> {:?}", mime, codecs.codec_list());
    Negotiation::Virtual(codecs)
}
