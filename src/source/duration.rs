//! Duration emulation for live presentations
//!
//! A live presentation reports an infinite duration while the native
//! source keeps a finite one, so that the seekable window can grow.

use crate::buffer::NativeMediaSource;
use crate::error::{MediaSourceError, Result};

#[derive(Debug, Clone, Copy)]
pub struct DurationEmulator {
    emulated: f64,
}

impl Default for DurationEmulator {
    fn default() -> Self {
        Self { emulated: f64::NAN }
    }
}

impl DurationEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The presentation duration: infinite while live, else the native one
    pub fn duration(&self, native: &dyn NativeMediaSource) -> f64 {
        if self.emulated == f64::INFINITY {
            f64::INFINITY
        } else {
            native.duration()
        }
    }

    /// Record a duration; infinity is never written to the native source
    pub fn set_duration(&mut self, duration: f64, native: &mut dyn NativeMediaSource) {
        self.emulated = duration;
        if duration != f64::INFINITY {
            native.set_duration(duration);
        }
    }

    /// Grow the native duration to cover a seekable range. Only valid while
    /// the presentation is live; never shrinks.
    pub fn add_seekable_range(
        &self,
        start: f64,
        end: f64,
        native: &mut dyn NativeMediaSource,
    ) -> Result<()> {
        if self.duration(native) != f64::INFINITY {
            return Err(MediaSourceError::InvalidState(
                "MediaSource duration must be infinite to add seekable ranges".to_string(),
            ));
        }

        let current = native.duration();
        if current.is_nan() || end > current {
            tracing::debug!("Seekable range {}..{} extends native duration", start, end);
            native.set_duration(end);
        }
        Ok(())
    }
}
