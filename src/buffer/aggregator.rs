//! Busy-state aggregation
//!
//! Merges the update lifecycles of the audio and video sinks behind one
//! virtual buffer. A start is surfaced for the first sink to become busy;
//! completion only once no enabled sink is busy any more.

use crate::segment::TrackType;

/// Update lifecycle event of a single native sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    UpdateStart,
    Update,
    UpdateEnd,
}

/// Combined busy state of both sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyState {
    Idle,
    /// Exactly one sink is busy
    Pending,
    BothBusy,
}

/// Where one sink is in its update cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SinkPhase {
    #[default]
    Idle,
    /// Between `updatestart` and `update`
    Busy,
    /// `update` seen, `updateend` not yet
    Updated,
}

#[derive(Debug, Default)]
pub struct UpdateAggregator {
    audio: SinkPhase,
    video: SinkPhase,
}

impl UpdateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BusyState {
        match (self.audio == SinkPhase::Busy, self.video == SinkPhase::Busy) {
            (false, false) => BusyState::Idle,
            (true, true) => BusyState::BothBusy,
            _ => BusyState::Pending,
        }
    }

    fn phase_mut(&mut self, track_type: TrackType) -> &mut SinkPhase {
        match track_type {
            TrackType::Audio => &mut self.audio,
            TrackType::Video => &mut self.video,
        }
    }

    fn phase(&self, track_type: TrackType) -> SinkPhase {
        match track_type {
            TrackType::Audio => self.audio,
            TrackType::Video => self.video,
        }
    }

    /// Feed one sink event; returns the event to surface, if any
    pub fn on_event(&mut self, track_type: TrackType, event: SinkEvent) -> Option<SinkEvent> {
        let other = self.phase(track_type.other());
        let phase = match event {
            SinkEvent::UpdateStart => SinkPhase::Busy,
            SinkEvent::Update => SinkPhase::Updated,
            SinkEvent::UpdateEnd => SinkPhase::Idle,
        };
        *self.phase_mut(track_type) = phase;

        let surfaced = match (event, self.state()) {
            // only this sink went busy
            (SinkEvent::UpdateStart, state) => state == BusyState::Pending,
            (SinkEvent::Update, state) => state == BusyState::Idle,
            // the other sink may still owe its own updateend
            (SinkEvent::UpdateEnd, state) => state == BusyState::Idle && other == SinkPhase::Idle,
        };

        tracing::trace!(
            "{} sink {:?}: state={:?} surfaced={}",
            track_type,
            event,
            self.state(),
            surfaced
        );
        surfaced.then_some(event)
    }

    /// Forget a sink's cycle, e.g. when its track gets disabled
    pub fn reset(&mut self, track_type: TrackType) {
        *self.phase_mut(track_type) = SinkPhase::Idle;
    }
}
