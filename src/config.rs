use crate::constants::{FRAME_TIME, NAME_RECORD_SECS};
use std::{path::PathBuf, time::Duration};

/// Configuration for the conference registry and its sessions.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
    /// Directory for transient name recordings and default conference
    /// recordings.
    ///
    /// Name recordings land under `<spool_dir>/meetme/`.
    pub spool_dir: PathBuf,

    /// Location of the static rooms file.
    ///
    /// Re-read at admission time, so edits apply to the next join.
    pub rooms_file: PathBuf,

    /// Recording container format used when the caller supplies none.
    ///
    /// Defaults to `wav`.
    pub default_record_format: String,

    /// Upper bound on the session loop's multiplex wait.
    ///
    /// Defaults to one frame period (20 ms). Lowering it tightens
    /// admin-command latency at the cost of idle wakeups.
    pub frame_time: Duration,

    /// Disables music on hold for participants alone in a conference, even
    /// when they asked for it.
    pub skip_moh_when_alone: bool,

    /// Maximum length, in seconds, of a recorded participant name.
    pub name_record_secs: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("/var/spool/meetme"),
            rooms_file: PathBuf::from("/etc/meetme.conf"),
            default_record_format: "wav".to_string(),
            frame_time: FRAME_TIME,
            skip_moh_when_alone: false,
            name_record_secs: NAME_RECORD_SECS,
        }
    }
}

impl Config {
    /// Sets this `Config`'s spool directory.
    #[must_use]
    pub fn spool_dir(mut self, spool_dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = spool_dir.into();
        self
    }

    /// Sets this `Config`'s static rooms file.
    #[must_use]
    pub fn rooms_file(mut self, rooms_file: impl Into<PathBuf>) -> Self {
        self.rooms_file = rooms_file.into();
        self
    }

    /// Sets this `Config`'s default recording format.
    #[must_use]
    pub fn default_record_format(mut self, format: impl Into<String>) -> Self {
        self.default_record_format = format.into();
        self
    }

    /// Sets this `Config`'s session wait quantum.
    #[must_use]
    pub fn frame_time(mut self, frame_time: Duration) -> Self {
        self.frame_time = frame_time;
        self
    }

    /// Sets whether music on hold is suppressed for lone participants.
    #[must_use]
    pub fn skip_moh_when_alone(mut self, skip: bool) -> Self {
        self.skip_moh_when_alone = skip;
        self
    }

    /// Sets the maximum recorded-name length in seconds.
    #[must_use]
    pub fn name_record_secs(mut self, secs: u32) -> Self {
        self.name_record_secs = secs;
        self
    }

    /// Directory that holds per-participant name recordings.
    #[must_use]
    pub fn name_record_dir(&self) -> PathBuf {
        self.spool_dir.join("meetme")
    }
}
