//! The telephony channel boundary.
//!
//! A participant session drives exactly one [`Call`]: reading frames,
//! writing mixed audio back, playing prompts, and poking channel-level
//! switches (gain, music on hold, variables). The trait covers the full
//! surface the session needs so that the telephony runtime stays pluggable
//! and the session is testable against a scripted call.

#[cfg(test)]
pub(crate) mod testutil;

use crate::{
    error::Result,
    mixer::MixerPort,
};
use std::{path::Path, time::Duration};

/// One frame read from a call.
#[derive(Clone, Debug, PartialEq)]
pub enum CallFrame {
    /// Signed-linear voice samples.
    Voice(Vec<i16>),
    /// A decoded DTMF digit.
    Dtmf(char),
    /// Any other frame class; the session drops these.
    Other,
}

/// What woke the session's multiplex wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Activity {
    /// The call has a frame ready.
    Call,
    /// The mixer port has mixed audio ready.
    Mixer,
    /// The frame period elapsed with nothing to do.
    Timeout,
}

/// Which gain knob a volume adjustment targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Gain {
    /// Audio received from the caller (their talk path).
    Talk,
    /// Audio sent toward the caller (their listen path).
    Listen,
}

/// The channel driver could not absorb a gain request; the session must
/// scale samples in software instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GainUnsupported;

/// A live telephony call, as seen by a conference session.
pub trait Call: Send {
    /// Channel name, e.g. `SIP/alice-00000001`.
    fn name(&self) -> &str;

    /// Globally unique call identifier.
    fn unique_id(&self) -> &str;

    /// Caller id number, when known.
    fn caller_id(&self) -> Option<&str> {
        None
    }

    /// Caller id display name, when known.
    fn caller_name(&self) -> Option<&str> {
        None
    }

    /// Language for prompt playback.
    fn language(&self) -> &str {
        "en"
    }

    /// Dialplan context the call is executing in.
    fn context(&self) -> &str {
        ""
    }

    /// Whether the call has been answered.
    fn is_up(&self) -> bool;

    /// Answers the call.
    fn answer(&mut self) -> Result<()>;

    /// Switches the read path to signed linear.
    fn set_linear_read(&mut self) -> Result<()>;

    /// Switches the write path to signed linear.
    fn set_linear_write(&mut self) -> Result<()>;

    /// Asks the channel driver to apply a decibel gain. Drivers that cannot
    /// honor the request report [`GainUnsupported`] and the caller falls
    /// back to software scaling.
    fn set_gain(&mut self, which: Gain, db: i8) -> std::result::Result<(), GainUnsupported>;

    /// Hands over the call's own mixer port, when the call terminates on the
    /// mixer device natively. Returns `None` for every other channel type,
    /// which sends the session down the pseudo-port path.
    fn take_native_mixer_port(&mut self) -> Option<Box<dyn MixerPort>> {
        None
    }

    /// Bumped whenever the call's underlying descriptors are swapped out
    /// (e.g. by a masquerade); the session re-runs port selection on change.
    fn descriptor_generation(&self) -> u64 {
        0
    }

    /// Suppresses (or restores) in-band DTMF passthrough while a menu is
    /// armed. Channels without the option ignore this.
    fn set_dtmf_suppression(&mut self, _on: bool) {}

    /// Blocks until the call or the given mixer port has data, or the
    /// timeout elapses.
    fn wait_activity(&mut self, mixer: Option<&mut dyn MixerPort>, timeout: Duration)
        -> Activity;

    /// Reads the next frame. `None` means the peer hung up.
    fn read_frame(&mut self) -> Option<CallFrame>;

    /// Writes mixed voice samples toward the caller.
    fn write_voice(&mut self, samples: &[i16]) -> Result<()>;

    /// Plays a prompt, interruptible by DTMF. Returns the interrupting
    /// digit, if any.
    fn play_prompt(&mut self, prompt: &str) -> Result<Option<char>>;

    /// Speaks a number, interruptible by DTMF.
    fn say_number(&mut self, n: i64) -> Result<Option<char>>;

    /// Speaks a digit string, interruptible by DTMF.
    fn say_digits(&mut self, digits: &str) -> Result<Option<char>>;

    /// Plays a prompt and collects digits until terminator or timeout.
    fn read_digits(&mut self, prompt: &str, max_len: usize) -> Result<String>;

    /// Prompts for and records the caller's name at the given path.
    fn record_name(&mut self, path: &Path, max_secs: u32) -> Result<()>;

    /// Starts music on hold.
    fn moh_start(&mut self);

    /// Stops music on hold.
    fn moh_stop(&mut self);

    /// Reads a channel variable.
    fn get_var(&self, name: &str) -> Option<String>;

    /// Sets a channel variable.
    fn set_var(&mut self, name: &str, value: &str);

    /// If `exten` exists in `context`, primes the dialplan to continue there
    /// and returns true.
    fn goto_if_exists(&mut self, context: &str, exten: &str) -> bool;

    /// Runs a background script on the call, returning its exit code.
    fn run_background(&mut self, script: &str) -> Result<i32>;
}

/// What to play through a conference's announcement port.
#[derive(Clone, Copy, Debug)]
pub enum Clip<'a> {
    /// A named, language-resolved prompt.
    Prompt(&'a str),
    /// A recorded file, e.g. a participant's name recording.
    File(&'a Path),
}

/// Renders prompts and recordings into a mixer port.
///
/// The prompt/file-format layer lives outside this crate; conferences hold a
/// player so join/leave name announcements can be injected in-band.
pub trait PromptPlayer: Send + Sync {
    /// Plays one clip into the port, blocking until done.
    fn play_to_mixer(&self, port: &mut dyn MixerPort, clip: Clip<'_>, language: &str)
        -> Result<()>;
}

/// A player that renders nothing, for deployments without in-band prompts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPromptPlayer;

impl PromptPlayer for NullPromptPlayer {
    fn play_to_mixer(
        &self,
        _port: &mut dyn MixerPort,
        _clip: Clip<'_>,
        _language: &str,
    ) -> Result<()> {
        Ok(())
    }
}
