//! Per-participant state shared between a session and the admin plane.

use crate::channel::Call;
use crate::constants::GAIN_MAP;
use bitflags::bitflags;
use std::{
    sync::atomic::{AtomicI8, AtomicU32, AtomicU8, Ordering},
    time::Instant,
};

bitflags! {
    /// Option flags selected at admission (plus a few the menus mutate).
    pub struct ConfFlags: u32 {
        /// `a` — admin mode.
        const ADMIN = 1 << 1;
        /// `m` — monitor only: listen, never talk.
        const MONITOR = 1 << 2;
        /// `p` — `#` exits the conference.
        const POUND_EXIT = 1 << 3;
        /// `s` — `*` opens the user/admin menu.
        const STAR_MENU = 1 << 4;
        /// `t` — talk only: never listen.
        const TALKER = 1 << 5;
        /// `q` — quiet: no enter/leave sounds.
        const QUIET = 1 << 6;
        /// `v` — video mode. Accepted and carried; drives nothing.
        const VIDEO = 1 << 7;
        /// `b` — run a background script instead of the audio loop.
        const BACKGROUND_SCRIPT = 1 << 8;
        /// `M` — music on hold while alone in the conference.
        const MOH = 1 << 9;
        /// `x` — leave when the last marked user leaves.
        const MARKED_EXIT = 1 << 10;
        /// `w` — wait for a marked user before conferencing in.
        const WAIT_MARKED = 1 << 11;
        /// `X` — one-digit exit into the configured context.
        const EXIT_CONTEXT = 1 << 12;
        /// `A` — this participant is marked.
        const MARKED = 1 << 13;
        /// `i` — record the caller's name and announce join/leave.
        const INTRO_USER = 1 << 14;
        /// `r` — record the conference mix.
        const RECORD_CONF = 1 << 15;
        /// `T` — monitor whether this participant is talking.
        const MONITOR_TALKER = 1 << 16;
        /// `d` — create the conference dynamically.
        const DYNAMIC = 1 << 17;
        /// `D` — create dynamically, prompting for a PIN.
        const DYNAMIC_PIN = 1 << 18;
        /// `e` — select an empty conference.
        const EMPTY = 1 << 19;
        /// `E` — select an empty conference with no PIN.
        const EMPTY_NO_PIN = 1 << 20;
        /// `P` — always prompt for the PIN even when preset.
        const ALWAYS_PROMPT = 1 << 21;
        /// `c` — announce how many users are already in.
        const ANNOUNCE_COUNT = 1 << 22;
    }
}

bitflags! {
    /// Flags the admin plane sets on a participant; the owning session
    /// drains them at the top of each loop iteration.
    pub struct AdminFlags: u8 {
        /// Talk path revoked by an admin.
        const MUTED = 1 << 1;
        /// One-shot cooperative kick; honored within one frame period.
        const KICK_ME = 1 << 2;
    }
}

/// Talker-detection state, as shown by `meetme list`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TalkState {
    /// Talker detection is not running for this participant.
    Unmonitored,
    /// Monitored and currently silent.
    Silent,
    /// Monitored and currently talking.
    Talking,
}

impl TalkState {
    fn from_raw(raw: i8) -> Self {
        match raw {
            r if r < 0 => TalkState::Unmonitored,
            0 => TalkState::Silent,
            _ => TalkState::Talking,
        }
    }

    fn raw(self) -> i8 {
        match self {
            TalkState::Unmonitored => -1,
            TalkState::Silent => 0,
            TalkState::Talking => 1,
        }
    }
}

/// Direction of a volume adjustment request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VolumeAction {
    /// One step louder.
    Up,
    /// One step quieter.
    Down,
}

/// A volume channel: the level the user asked for, and whether software
/// scaling still has to apply it (`actual != 0`) or the channel driver
/// absorbed it (`actual == 0`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Volume {
    /// Requested level, -5..=5.
    pub desired: i8,
    /// Level still to be applied in software; zero when driver-absorbed.
    pub actual: i8,
}

impl Volume {
    /// Steps the desired level along the adjustment curve.
    ///
    /// The curve is deliberately asymmetric around zero: the first step up
    /// from flat jumps to +2 and the first step down to -2, skipping the
    /// levels whose gain rounds to 0 dB anyway; past that, steps are linear
    /// and clamp at ±5.
    pub fn tweak(&mut self, action: VolumeAction) {
        match action {
            VolumeAction::Up => match self.desired {
                5 => {}
                0 => self.desired = 2,
                -2 => self.desired = 0,
                _ => self.desired += 1,
            },
            VolumeAction::Down => match self.desired {
                -5 => {}
                2 => self.desired = 0,
                0 => self.desired = -2,
                _ => self.desired -= 1,
            },
        }
    }
}

/// Decibel gain for a volume step, per the driver mapping table.
#[must_use]
pub fn gain_for(step: i8) -> i8 {
    GAIN_MAP[(step + 5) as usize]
}

/// Scales linear samples by a software volume step: positive steps multiply,
/// negative steps divide, both saturating at the 16-bit rails.
pub fn adjust_volume(samples: &mut [i16], adjustment: i8) {
    if adjustment == 0 {
        return;
    }
    for s in samples.iter_mut() {
        let v = i32::from(*s);
        let adjusted = if adjustment > 0 {
            v.saturating_mul(i32::from(adjustment))
        } else {
            v / i32::from(-adjustment)
        };
        *s = adjusted.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }
}

/// The shared handle for one conference participant.
///
/// The owning session holds its audio buffers and volume state privately;
/// what lives here is exactly what the admin plane and the CLI need to see
/// or poke, all of it atomic so neither side blocks the other.
#[derive(Debug)]
pub struct Participant {
    user_no: u32,
    channel: String,
    unique_id: String,
    caller_id: Option<String>,
    caller_name: Option<String>,
    flags: AtomicU32,
    admin_flags: AtomicU8,
    talking: AtomicI8,
    joined_at: Instant,
}

impl Participant {
    pub(crate) fn new(user_no: u32, call: &dyn Call, flags: ConfFlags) -> Self {
        Self {
            user_no,
            channel: call.name().to_string(),
            unique_id: call.unique_id().to_string(),
            caller_id: call.caller_id().map(str::to_string),
            caller_name: call.caller_name().map(str::to_string),
            flags: AtomicU32::new(flags.bits()),
            admin_flags: AtomicU8::new(0),
            talking: AtomicI8::new(TalkState::Unmonitored.raw()),
            joined_at: Instant::now(),
        }
    }

    /// Participant number; monotonic per conference, never reused.
    #[must_use]
    pub fn user_no(&self) -> u32 {
        self.user_no
    }

    /// Name of the attached channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The attached call's unique identifier.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Caller id number, when known.
    #[must_use]
    pub fn caller_id(&self) -> Option<&str> {
        self.caller_id.as_deref()
    }

    /// Caller id display name, when known.
    #[must_use]
    pub fn caller_name(&self) -> Option<&str> {
        self.caller_name.as_deref()
    }

    /// The participant's current option flags.
    #[must_use]
    pub fn flags(&self) -> ConfFlags {
        ConfFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    /// Mirrors the session's live flags so list/eject see menu changes.
    pub(crate) fn store_flags(&self, flags: ConfFlags) {
        self.flags.store(flags.bits(), Ordering::SeqCst);
    }

    /// Whether this participant holds admin rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.flags().contains(ConfFlags::ADMIN)
    }

    /// Current admin-set flags.
    #[must_use]
    pub fn admin_flags(&self) -> AdminFlags {
        AdminFlags::from_bits_truncate(self.admin_flags.load(Ordering::SeqCst))
    }

    /// Sets admin flags (OR into the current set).
    pub fn raise_admin_flags(&self, flags: AdminFlags) {
        self.admin_flags.fetch_or(flags.bits(), Ordering::SeqCst);
    }

    /// Clears admin flags.
    pub fn clear_admin_flags(&self, flags: AdminFlags) {
        self.admin_flags.fetch_and(!flags.bits(), Ordering::SeqCst);
    }

    /// Current talker-detection state.
    #[must_use]
    pub fn talk_state(&self) -> TalkState {
        TalkState::from_raw(self.talking.load(Ordering::SeqCst))
    }

    pub(crate) fn set_talk_state(&self, state: TalkState) {
        self.talking.store(state.raw(), Ordering::SeqCst);
    }

    /// When the participant joined.
    #[must_use]
    pub fn joined_at(&self) -> Instant {
        self.joined_at
    }
}
