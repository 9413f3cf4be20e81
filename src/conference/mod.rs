//! Conference objects: per-room state, the participant roster, in-band
//! announcements, and recording control.

pub mod recorder;
pub mod registry;

use crate::{
    channel::{Call, Clip, PromptPlayer},
    events::{EventBus, EventKind, ManagerEvent},
    mixer::{careful_write, MixerPort},
    participant::{ConfFlags, Participant},
    tones::Tone,
};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::BTreeMap,
    io,
    sync::Arc,
    time::Instant,
};
use tracing::{debug, warn};

/// Recording lifecycle of a conference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordingState {
    /// No recorder attached.
    Off,
    /// A recorder task is draining the announcement monitor stream.
    Active,
    /// Teardown has asked the recorder to stop; it has not yet confirmed.
    Terminating,
}

struct ConfState {
    users: BTreeMap<u32, Arc<Participant>>,
    user_count: usize,
    marked_count: usize,
    locked: bool,
    recording: RecordingState,
    recording_file: Option<String>,
    recording_format: String,
}

/// One live conference room.
///
/// A conference owns the mixer's announcement port for its room. Sessions
/// hold an `Arc<Conference>`; the registry drops its reference when the last
/// participant leaves, and the mixer binding is released when the final
/// holder (usually the departing session or the recorder) lets go.
pub struct Conference {
    confno: String,
    mixer_id: i32,
    pin: String,
    admin_pin: String,
    is_dynamic: bool,
    auto_destroy: bool,
    created_at: Instant,
    announce: Mutex<Box<dyn MixerPort>>,
    player: Arc<dyn PromptPlayer>,
    state: Mutex<ConfState>,
    recorder_idle: Condvar,
    bus: EventBus,
}

/// A point-in-time view of one conference, for the CLI table.
#[derive(Clone, Debug)]
pub struct ConferenceSummary {
    /// Conference number.
    pub confno: String,
    /// Number of participants.
    pub parties: usize,
    /// Number of marked participants.
    pub marked: usize,
    /// Seconds since the conference was created.
    pub age_secs: u64,
    /// Whether the conference was created at runtime.
    pub is_dynamic: bool,
}

impl Conference {
    pub(crate) fn new(
        confno: String,
        pin: String,
        admin_pin: String,
        is_dynamic: bool,
        mixer_id: i32,
        announce: Box<dyn MixerPort>,
        player: Arc<dyn PromptPlayer>,
        bus: EventBus,
    ) -> Self {
        Self {
            confno,
            mixer_id,
            pin,
            admin_pin,
            is_dynamic,
            auto_destroy: true,
            created_at: Instant::now(),
            announce: Mutex::new(announce),
            player,
            state: Mutex::new(ConfState {
                users: BTreeMap::new(),
                user_count: 0,
                marked_count: 0,
                locked: false,
                recording: RecordingState::Off,
                recording_file: None,
                recording_format: String::new(),
            }),
            recorder_idle: Condvar::new(),
            bus,
        }
    }

    /// Conference number, the registry key.
    #[must_use]
    pub fn confno(&self) -> &str {
        &self.confno
    }

    /// The mixer device's identifier for this conference.
    #[must_use]
    pub fn mixer_id(&self) -> i32 {
        self.mixer_id
    }

    /// Entry PIN; empty when open.
    #[must_use]
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Admin PIN; empty when not configured.
    #[must_use]
    pub fn admin_pin(&self) -> &str {
        &self.admin_pin
    }

    /// Whether this conference was created at runtime.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    /// Whether the conference is destroyed when its last participant leaves.
    #[must_use]
    pub fn auto_destroy(&self) -> bool {
        self.auto_destroy
    }

    /// When the conference was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether admission is currently locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Locks or unlocks admission.
    pub fn set_locked(&self, locked: bool) {
        self.state.lock().locked = locked;
    }

    /// Number of participants.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.state.lock().user_count
    }

    /// Number of marked participants.
    #[must_use]
    pub fn marked_count(&self) -> usize {
        self.state.lock().marked_count
    }

    /// Adjusts the marked-participant counter by the given delta.
    pub(crate) fn bump_marked(&self, delta: isize) {
        let mut state = self.state.lock();
        state.marked_count = (state.marked_count as isize + delta).max(0) as usize;
    }

    /// Admits a call: assigns the next participant number (strictly above
    /// every number ever issued), links the participant at the roster tail,
    /// and bumps the counters.
    pub(crate) fn admit(&self, call: &dyn Call, flags: ConfFlags) -> Arc<Participant> {
        let mut state = self.state.lock();
        let user_no = state
            .users
            .keys()
            .next_back()
            .map_or(1, |last| last + 1);
        let participant = Arc::new(Participant::new(user_no, call, flags));
        state.users.insert(user_no, Arc::clone(&participant));
        state.user_count += 1;
        if flags.contains(ConfFlags::MARKED) {
            state.marked_count += 1;
        }
        participant
    }

    /// Removes a participant, preserving roster order, and returns how many
    /// remain. `marked` reflects the participant's flags at departure (the
    /// menu may have changed them since admission).
    pub(crate) fn remove(&self, user_no: u32, marked: bool) -> usize {
        let mut state = self.state.lock();
        if state.users.remove(&user_no).is_some() {
            state.user_count -= 1;
            if marked {
                state.marked_count = state.marked_count.saturating_sub(1);
            }
        } else {
            warn!("participant {} missing from conference {}", user_no, self.confno);
        }
        state.user_count
    }

    /// Roster snapshot in participant-number order.
    #[must_use]
    pub fn participants(&self) -> Vec<Arc<Participant>> {
        self.state.lock().users.values().cloned().collect()
    }

    /// Looks up one participant by number.
    #[must_use]
    pub fn participant(&self, user_no: u32) -> Option<Arc<Participant>> {
        self.state.lock().users.get(&user_no).cloned()
    }

    /// The most recently admitted participant still present.
    #[must_use]
    pub fn last_participant(&self) -> Option<Arc<Participant>> {
        self.state
            .lock()
            .users
            .values()
            .next_back()
            .cloned()
    }

    /// Plays an enter/leave tone into the conference through the
    /// announcement port. Playback failures are logged and swallowed; a
    /// missing tone must never fail a join or leave.
    pub(crate) fn play_tone(&self, tone: Tone) {
        let mut port = self.announce.lock();
        if let Err(e) = careful_write(&mut **port, tone.data()) {
            warn!("could not play {:?} tone to conference {}: {}", tone, self.confno, e);
        }
    }

    /// Plays a prompt or recording into the conference in-band.
    pub(crate) fn play_clip(&self, clip: Clip<'_>, language: &str) {
        let mut port = self.announce.lock();
        if let Err(e) = self.player.play_to_mixer(&mut **port, clip, language) {
            warn!("announcement to conference {} failed: {}", self.confno, e);
        }
    }

    /// Reads mixed audio from the announcement monitor stream (the recording
    /// tap). Nonblocking; used by the recorder task.
    pub(crate) fn read_announce(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.announce.lock().read_audio(buf)
    }

    /// Emits a management event on behalf of a participant.
    pub(crate) fn emit(&self, kind: EventKind, participant: &Participant) {
        self.bus.emit(ManagerEvent {
            kind,
            channel: participant.channel().to_string(),
            unique_id: participant.unique_id().to_string(),
            meetme: self.confno.clone(),
            usernum: participant.user_no(),
        });
    }

    /// Current recording state.
    #[must_use]
    pub fn recording_state(&self) -> RecordingState {
        self.state.lock().recording
    }

    /// Claims the recorder slot: transitions Off -> Active and stores the
    /// target file. Returns false when a recorder is already attached (or
    /// shutting down), in which case nothing changes.
    pub(crate) fn try_start_recording(&self, file: String, format: String) -> bool {
        let mut state = self.state.lock();
        if state.recording != RecordingState::Off {
            return false;
        }
        state.recording = RecordingState::Active;
        state.recording_file = Some(file);
        state.recording_format = format;
        true
    }

    /// The recording target, while a recorder is attached.
    #[must_use]
    pub fn recording_target(&self) -> Option<(String, String)> {
        let state = self.state.lock();
        state
            .recording_file
            .clone()
            .map(|f| (f, state.recording_format.clone()))
    }

    /// Marks the recorder finished and wakes anyone waiting on teardown.
    pub(crate) fn finish_recording(&self) {
        let mut state = self.state.lock();
        state.recording = RecordingState::Off;
        self.recorder_idle.notify_all();
    }

    /// Asks an active recorder to stop and blocks until it confirms.
    ///
    /// Replaces the historical lock/sleep/lock polling with a condition
    /// variable signalled by [`finish_recording`].
    ///
    /// [`finish_recording`]: Conference::finish_recording
    pub(crate) fn stop_recorder_blocking(&self) {
        let mut state = self.state.lock();
        if state.recording == RecordingState::Active {
            state.recording = RecordingState::Terminating;
            debug!("waiting for conference {} recorder to stop", self.confno);
        }
        while state.recording != RecordingState::Off {
            self.recorder_idle.wait(&mut state);
        }
    }

    /// A point-in-time view for the CLI.
    #[must_use]
    pub fn summary(&self) -> ConferenceSummary {
        let state = self.state.lock();
        ConferenceSummary {
            confno: self.confno.clone(),
            parties: state.user_count,
            marked: state.marked_count,
            age_secs: self.created_at.elapsed().as_secs(),
            is_dynamic: self.is_dynamic,
        }
    }
}
