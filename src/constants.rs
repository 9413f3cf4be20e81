//! Constants governing conference audio framing and control timing.

use std::time::Duration;

/// Number of bytes in one complete frame of signed-linear conference audio.
pub const CONF_SIZE: usize = 320;

/// Number of 16-bit samples in one complete frame.
pub const SAMPLES_PER_FRAME: usize = CONF_SIZE / 2;

/// Sample rate of the mixer device's linear stream.
pub const SAMPLE_RATE: usize = 8_000;

/// Number of audio frames exchanged with the mixer per second.
pub const AUDIO_FRAME_RATE: usize = SAMPLE_RATE / SAMPLES_PER_FRAME;

/// Length (in milliseconds) of any audio frame.
pub const FRAME_LEN_MS: u64 = 1000 / AUDIO_FRAME_RATE as u64;

/// Length of time between any two audio frames.
///
/// This is also the upper bound on the session loop's multiplex wait, so
/// admin-flag changes are observed within one frame period.
pub const FRAME_TIME: Duration = Duration::from_millis(FRAME_LEN_MS);

/// Trailing silence (ms) below which a silent participant is declared talking.
pub const SILENCE_TO_TALKING_MS: u32 = 300;

/// Trailing silence (ms) above which a talking participant is declared silent.
pub const TALKING_TO_SILENT_MS: u32 = 1000;

/// Map from volume steps -5..=5 to decibel settings for channel drivers.
///
/// Not a straight linear-to-dB conversion; the numbers are tuned to give the
/// user a useful level of adjustability. Level 0 maps to 0 dB.
pub const GAIN_MAP: [i8; 11] = [-15, -13, -10, -6, 0, 0, 0, 6, 10, 13, 15];

/// Number of device buffers requested for a pseudo mixer port.
pub const MIXER_NUM_BUFS: u32 = 4;

/// Attempts allowed when collecting a conference number or PIN.
pub const MAX_ENTRY_ATTEMPTS: u32 = 3;

/// Highest conference number probed by the empty-conference scan.
pub const EMPTY_SCAN_LIMIT: u32 = 1024;

/// Maximum length (seconds) of a recorded participant name.
pub const NAME_RECORD_SECS: u32 = 10;
