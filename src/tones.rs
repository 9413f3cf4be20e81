//! In-memory enter/leave tones.
//!
//! The tones live as raw signed-linear byte arrays so the playback path can
//! hand them straight to the mixer's announcement port through the careful
//! write loop. They are synthesized once, on first use: a short rising
//! two-note chime on enter, the same notes falling on leave, frame-aligned
//! and faded at the edges to avoid clicks.

use crate::constants::{CONF_SIZE, SAMPLE_RATE};
use byteorder::{ByteOrder, LittleEndian};
use once_cell::sync::Lazy;
use std::f64::consts::TAU;

/// Which in-band tone to play to a conference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    /// Played when a participant joins.
    Enter,
    /// Played when a participant leaves.
    Leave,
}

impl Tone {
    /// Raw signed-linear bytes for this tone.
    #[must_use]
    pub fn data(self) -> &'static [u8] {
        match self {
            Tone::Enter => &ENTER[..],
            Tone::Leave => &LEAVE[..],
        }
    }
}

static ENTER: Lazy<Vec<u8>> = Lazy::new(|| chime(&[660.0, 880.0]));
static LEAVE: Lazy<Vec<u8>> = Lazy::new(|| chime(&[880.0, 660.0]));

const NOTE_MS: usize = 100;
const FADE_MS: usize = 8;
const AMPLITUDE: f64 = 0.25;

fn chime(notes: &[f64]) -> Vec<u8> {
    let note_len = SAMPLE_RATE * NOTE_MS / 1000;
    let fade_len = SAMPLE_RATE * FADE_MS / 1000;
    let mut samples = Vec::with_capacity(notes.len() * note_len);

    for &freq in notes {
        for n in 0..note_len {
            let t = n as f64 / SAMPLE_RATE as f64;
            let mut v = AMPLITUDE * (TAU * freq * t).sin();
            if n < fade_len {
                v *= n as f64 / fade_len as f64;
            } else if n >= note_len - fade_len {
                v *= (note_len - n) as f64 / fade_len as f64;
            }
            samples.push((v * f64::from(i16::MAX)) as i16);
        }
    }

    // Pad to a whole number of frames; the device expects full buffers.
    while (samples.len() * 2) % CONF_SIZE != 0 {
        samples.push(0);
    }

    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(&samples, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tones_are_frame_aligned() {
        assert_eq!(Tone::Enter.data().len() % CONF_SIZE, 0);
        assert_eq!(Tone::Leave.data().len() % CONF_SIZE, 0);
        assert!(!Tone::Enter.data().is_empty());
    }

    #[test]
    fn tones_are_distinct_and_nonsilent() {
        assert_ne!(Tone::Enter.data(), Tone::Leave.data());
        let any_audio = Tone::Enter
            .data()
            .chunks_exact(2)
            .any(|c| LittleEndian::read_i16(c).unsigned_abs() > 1000);
        assert!(any_audio);
    }
}
