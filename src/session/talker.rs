//! Talker detection for monitored participants.
//!
//! Every incoming voice frame is fed to a [`TalkDetector`], which reports
//! the trailing silence in milliseconds. The monitor applies hysteresis on
//! top: short silence flips a silent participant to talking, a full second
//! of silence flips a talking participant back. Each flip yields exactly one
//! edge, which the session turns into a management event.

use crate::constants::{SAMPLE_RATE, SILENCE_TO_TALKING_MS, TALKING_TO_SILENT_MS};
use crate::participant::TalkState;

/// Measures trailing silence on a stream of linear frames.
///
/// The full signal-processing stack lives outside this crate; this trait is
/// the seam it plugs into.
pub trait TalkDetector: Send {
    /// Feeds one frame; returns the trailing silence duration in ms.
    fn trailing_silence(&mut self, samples: &[i16]) -> u32;
}

/// A plain amplitude-threshold detector.
///
/// A frame whose mean absolute amplitude clears the threshold resets the
/// silence run; anything else extends it. The run starts saturated so that
/// a participant who has said nothing yet reads as long-silent rather than
/// freshly quiet.
pub struct EnergyDetector {
    threshold: i32,
    silence_ms: u32,
}

impl EnergyDetector {
    /// Creates a detector with the given mean-amplitude threshold.
    #[must_use]
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold,
            silence_ms: TALKING_TO_SILENT_MS,
        }
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TalkDetector for EnergyDetector {
    fn trailing_silence(&mut self, samples: &[i16]) -> u32 {
        if samples.is_empty() {
            return self.silence_ms;
        }
        let energy: i64 = samples.iter().map(|&s| i64::from(s).abs()).sum();
        let mean = energy / samples.len() as i64;
        if mean >= i64::from(self.threshold) {
            self.silence_ms = 0;
        } else {
            let frame_ms = (samples.len() * 1000 / SAMPLE_RATE) as u32;
            self.silence_ms = self.silence_ms.saturating_add(frame_ms);
        }
        self.silence_ms
    }
}

/// A talking-state transition.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TalkEdge {
    /// The participant started talking.
    Started,
    /// The participant stopped talking.
    Stopped,
}

/// Applies the hysteresis thresholds over a detector, producing one edge
/// per transition.
pub struct TalkerMonitor {
    detector: Box<dyn TalkDetector>,
    state: TalkState,
}

impl TalkerMonitor {
    /// Wraps a detector; the monitor starts unmonitored.
    #[must_use]
    pub fn new(detector: Box<dyn TalkDetector>) -> Self {
        Self {
            detector,
            state: TalkState::Unmonitored,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TalkState {
        self.state
    }

    /// Feeds one voice frame; returns the edge it caused, if any.
    pub fn observe(&mut self, samples: &[i16]) -> Option<TalkEdge> {
        if self.state == TalkState::Unmonitored {
            self.state = TalkState::Silent;
        }
        let silence = self.detector.trailing_silence(samples);

        match self.state {
            TalkState::Silent if silence < SILENCE_TO_TALKING_MS => {
                self.state = TalkState::Talking;
                Some(TalkEdge::Started)
            }
            TalkState::Talking if silence > TALKING_TO_SILENT_MS => {
                self.state = TalkState::Silent;
                Some(TalkEdge::Stopped)
            }
            _ => None,
        }
    }
}
