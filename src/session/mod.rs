//! The per-participant session: admission, the frame-paced main loop, and
//! teardown.
//!
//! Each active participant runs one session on its own thread. The session
//! owns the call's audio path end to end: it selects a mixer port (the
//! call's native one when the call already lives on the mixer device, a
//! fresh pseudo port otherwise), pumps voice frames into the conference and
//! mixed audio back out, watches admin flags once per frame period, and
//! handles the DTMF surface (pound exit, exit context, the star menu).

mod menu;
pub mod talker;

use crate::{
    channel::{Activity, Call, CallFrame, Clip, Gain},
    conference::{recorder, Conference, RecordingState},
    constants::CONF_SIZE,
    error::Error,
    events::EventKind,
    mixer::{careful_write, ConfInfo, ConfMode, MixerPort},
    participant::{
        adjust_volume, gain_for, AdminFlags, ConfFlags, Participant, TalkState, Volume,
        VolumeAction,
    },
    Registry,
};
use byteorder::{ByteOrder, LittleEndian};
use std::{path::PathBuf, sync::Arc};
use talker::{EnergyDetector, TalkDetector, TalkEdge, TalkerMonitor};
use tracing::{debug, instrument, warn};

/// The session left through an error path that skips courteous goodbyes
/// (leave tone, name announcement) and goes straight to roster cleanup.
struct Abort;

type Flow = Result<(), Abort>;

/// Runs a conference session to completion on the calling thread.
///
/// Returns the dialplan result code: `0` when the participant left by an
/// explicit exit (pound, exit context, kick), `-1` otherwise.
pub fn run(call: &mut dyn Call, registry: &Registry, conf: &Arc<Conference>, flags: ConfFlags) -> i32 {
    run_with_detector(
        call,
        registry,
        conf,
        flags,
        Box::new(EnergyDetector::default()),
    )
}

/// [`run`], with an explicit talker detector.
#[instrument(skip_all, fields(confno = %conf.confno(), channel = %call.name()))]
pub fn run_with_detector(
    call: &mut dyn Call,
    registry: &Registry,
    conf: &Arc<Conference>,
    flags: ConfFlags,
    detector: Box<dyn TalkDetector>,
) -> i32 {
    maybe_start_recorder(call, registry, conf, flags);

    if conf.is_locked() && !flags.contains(ConfFlags::ADMIN) {
        let _ = call.play_prompt("conf-locked");
        return 0;
    }

    let me = conf.admit(call, flags);
    debug!("admitted as participant {}", me.user_no());

    let mut session = Session {
        call,
        registry,
        conf,
        me,
        flags,
        talk: Volume::default(),
        listen: Volume::default(),
        port: None,
        using_pseudo: false,
        port_generation: 0,
        mode: ConfMode::empty(),
        menu_active: false,
        music_on_hold: false,
        exit_context: String::new(),
        name_rec: None,
        monitor: flags
            .contains(ConfFlags::MONITOR_TALKER)
            .then(|| TalkerMonitor::new(detector)),
        ret: -1,
    };

    let graceful = session.drive().is_ok();
    session.teardown(graceful);
    session.ret
}

fn maybe_start_recorder(
    call: &mut dyn Call,
    registry: &Registry,
    conf: &Arc<Conference>,
    flags: ConfFlags,
) {
    if !flags.contains(ConfFlags::RECORD_CONF)
        || conf.recording_state() == RecordingState::Active
    {
        return;
    }
    let file = call
        .get_var("MEETME_RECORDINGFILE")
        .unwrap_or_else(|| format!("meetme-conf-rec-{}-{}", conf.confno(), call.unique_id()));
    let format = call
        .get_var("MEETME_RECORDINGFORMAT")
        .unwrap_or_else(|| registry.config().default_record_format.clone());
    if conf.try_start_recording(file.clone(), format.clone()) {
        debug!("starting recording of conference into {}.{}", file, format);
        recorder::spawn(
            Arc::clone(conf),
            registry.config().frame_time,
            registry.config().spool_dir.clone(),
        );
    }
}

struct Session<'a> {
    call: &'a mut dyn Call,
    registry: &'a Registry,
    conf: &'a Arc<Conference>,
    me: Arc<Participant>,
    flags: ConfFlags,
    talk: Volume,
    listen: Volume,
    port: Option<Box<dyn MixerPort>>,
    using_pseudo: bool,
    port_generation: u64,
    mode: ConfMode,
    menu_active: bool,
    music_on_hold: bool,
    exit_context: String,
    name_rec: Option<PathBuf>,
    monitor: Option<TalkerMonitor>,
    ret: i32,
}

impl<'a> Session<'a> {
    fn drive(&mut self) -> Flow {
        self.resolve_exit_context();
        self.record_name()?;
        self.announce_admission()?;
        self.set_linear_formats()?;
        self.attach_mixer()?;
        self.join_conference()?;

        if self.flags.contains(ConfFlags::BACKGROUND_SCRIPT) {
            self.run_background_script();
            return Ok(());
        }

        if !self.using_pseudo && self.flags.contains(ConfFlags::STAR_MENU) {
            // Keep the device from leaking menu DTMF into the mix.
            self.call.set_dtmf_suppression(true);
        }

        self.main_loop()
    }

    fn resolve_exit_context(&mut self) {
        if self.flags.contains(ConfFlags::EXIT_CONTEXT) {
            self.exit_context = self
                .call
                .get_var("MEETME_EXIT_CONTEXT")
                .unwrap_or_else(|| self.call.context().to_string());
        }
    }

    fn record_name(&mut self) -> Flow {
        if self.flags.contains(ConfFlags::QUIET) || !self.flags.contains(ConfFlags::INTRO_USER) {
            return Ok(());
        }
        let path = self.registry.config().name_record_dir().join(format!(
            "meetme-username-{}-{}",
            self.conf.confno(),
            self.me.user_no()
        ));
        let secs = self.registry.config().name_record_secs;
        if let Err(e) = self.call.record_name(&path, secs) {
            warn!("could not record participant name: {}", e);
            return Ok(());
        }
        self.name_rec = Some(path);
        Ok(())
    }

    fn announce_admission(&mut self) -> Flow {
        let users = self.conf.user_count();
        if !self.flags.contains(ConfFlags::QUIET) {
            if users == 1 && !self.flags.contains(ConfFlags::WAIT_MARKED) {
                self.prompt("conf-onlyperson")?;
            }
            if self.flags.contains(ConfFlags::WAIT_MARKED) && self.conf.marked_count() == 0 {
                self.prompt("conf-waitforleader")?;
            }
        }

        if !self.flags.contains(ConfFlags::QUIET)
            && self.flags.contains(ConfFlags::ANNOUNCE_COUNT)
            && users > 1
        {
            // Any digit cancels the rest of the announcement, not the join.
            if users == 2 {
                self.prompt("conf-onlyone")?;
            } else if self.prompt("conf-thereare")?.is_none() {
                let others = users as i64 - 1;
                let interrupted = self
                    .call
                    .say_number(others)
                    .map_err(|_| Abort)?
                    .is_some();
                if !interrupted {
                    self.prompt("conf-otherinparty")?;
                }
            }
        }
        Ok(())
    }

    fn set_linear_formats(&mut self) -> Flow {
        if self.call.set_linear_write().is_err() {
            warn!("unable to set '{}' to write linear mode", self.call.name());
            return Err(Abort);
        }
        if self.call.set_linear_read().is_err() {
            warn!("unable to set '{}' to read linear mode", self.call.name());
            return Err(Abort);
        }
        Ok(())
    }

    /// Selects the mixer port, falling back from the call's native port to a
    /// fresh pseudo port when the native one is already bound to a
    /// conference the driver has not yet released.
    fn attach_mixer(&mut self) -> Flow {
        let mut force_pseudo = self.using_pseudo;
        loop {
            let (mut port, pseudo) = if force_pseudo {
                match self.registry.open_session_port() {
                    Ok(p) => (p, true),
                    Err(e) => {
                        warn!("unable to open pseudo port: {}", e);
                        return Err(Abort);
                    }
                }
            } else {
                match self.call.take_native_mixer_port() {
                    Some(p) => (p, false),
                    None => {
                        force_pseudo = true;
                        continue;
                    }
                }
            };

            let bound = match port.get_conf() {
                Ok(info) => info,
                Err(e) => {
                    warn!("error getting conference: {}", e);
                    return Err(Abort);
                }
            };
            if !bound.mode.is_empty() && !pseudo {
                debug!("channel is in a conference already, retrying with pseudo");
                force_pseudo = true;
                continue;
            }

            self.port = Some(port);
            self.using_pseudo = pseudo;
            self.port_generation = self.call.descriptor_generation();
            return Ok(());
        }
    }

    fn join_conference(&mut self) -> Flow {
        if !self.flags.contains(ConfFlags::QUIET)
            && self.flags.contains(ConfFlags::INTRO_USER)
            && self.conf.user_count() > 1
        {
            if let Some(path) = self.name_rec.clone().filter(|p| p.exists()) {
                self.conf
                    .play_clip(Clip::File(&path), self.call.language());
                self.conf
                    .play_clip(Clip::Prompt("conf-hasjoin"), self.call.language());
            }
        }

        self.mode = self.mode_for_flags();
        if !self.apply_mode() {
            return Err(Abort);
        }
        debug!(
            "placed channel {} in mixer conference {}",
            self.call.name(),
            self.conf.mixer_id()
        );

        self.conf.emit(EventKind::Join, &self.me);

        if !self.flags.contains(ConfFlags::MONITOR)
            && !self.flags.contains(ConfFlags::ADMIN)
            && !self.flags.contains(ConfFlags::QUIET)
            && (!self.flags.contains(ConfFlags::WAIT_MARKED) || self.conf.marked_count() >= 1)
        {
            self.conf.play_tone(crate::tones::Tone::Enter);
        }

        if let Some(port) = self.port.as_mut() {
            let _ = port.flush();
        }
        Ok(())
    }

    fn run_background_script(&mut self) {
        if !self.using_pseudo {
            self.call.set_dtmf_suppression(true);
        }
        let script = self
            .call
            .get_var("MEETME_BACKGROUND_SCRIPT")
            .unwrap_or_else(|| "conf-background".to_string());
        match self.call.run_background(&script) {
            Ok(code) => self.ret = code,
            Err(e) => {
                warn!("could not run background script '{}': {}", script, e);
                self.ret = -2;
            }
        }
        if !self.using_pseudo {
            self.call.set_dtmf_suppression(false);
        }
    }

    fn mode_for_flags(&self) -> ConfMode {
        if self.flags.contains(ConfFlags::MONITOR) {
            ConfMode::CONF_MONITOR | ConfMode::LISTENER
        } else if self.flags.contains(ConfFlags::TALKER) {
            ConfMode::CONF | ConfMode::TALKER
        } else {
            ConfMode::CONF | ConfMode::TALKER | ConfMode::LISTENER
        }
    }

    /// Pushes `self.mode` to the device. Failures are logged and reported,
    /// not fatal by themselves; callers decide.
    fn apply_mode(&mut self) -> bool {
        let info = ConfInfo {
            channel: 0,
            conf_id: self.conf.mixer_id(),
            mode: self.mode,
        };
        match self.port.as_mut() {
            Some(port) => match port.set_conf(info) {
                Ok(_) => true,
                Err(e) => {
                    warn!("error setting conference: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    fn detach_mode(&mut self) -> bool {
        match self.port.as_mut() {
            Some(port) => match port.set_conf(ConfInfo::default()) {
                Ok(_) => true,
                Err(e) => {
                    warn!("error clearing conference binding: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    fn main_loop(&mut self) -> Flow {
        let mut lastmarked = 0usize;
        let mut menu_was_active = false;

        loop {
            // Restore a driver-absorbed talk gain suspended for the menu.
            if !self.menu_active
                && menu_was_active
                && self.talk.desired != 0
                && self.talk.actual == 0
            {
                let _ = self.call.set_gain(Gain::Talk, gain_for(self.talk.desired));
            }
            menu_was_active = self.menu_active;

            let currentmarked = self.conf.marked_count();
            self.preannounce_marked_arrival(currentmarked, lastmarked)?;

            let timeout = self.registry.config().frame_time;
            let activity = match (self.using_pseudo, self.port.as_mut()) {
                (true, Some(port)) => self.call.wait_activity(Some(port.as_mut()), timeout),
                _ => self.call.wait_activity(None, timeout),
            };

            // Mirror live flags so list/eject see menu-driven changes.
            self.me.store_flags(self.flags);

            if self.flags.contains(ConfFlags::WAIT_MARKED) {
                self.handle_marked_transition(currentmarked, lastmarked)?;
                if self.left_with_marked(currentmarked, lastmarked) {
                    break;
                }
            }

            self.music_when_alone();

            if currentmarked == 0
                && lastmarked != 0
                && self.flags.contains(ConfFlags::MARKED_EXIT)
                && !self.flags.contains(ConfFlags::WAIT_MARKED)
            {
                self.ret = -1;
                break;
            }

            if !self.observe_admin_flags() {
                break;
            }

            match activity {
                Activity::Call => {
                    if self.call.descriptor_generation() != self.port_generation {
                        debug!("channel descriptors swapped out underneath us, starting over");
                        self.port = None;
                        self.attach_mixer()?;
                        if !self.apply_mode() {
                            return Err(Abort);
                        }
                        lastmarked = currentmarked;
                        continue;
                    }
                    let frame = match self.call.read_frame() {
                        Some(f) => f,
                        None => break,
                    };
                    if !self.handle_call_frame(frame)? {
                        break;
                    }
                }
                Activity::Mixer => self.pump_mixed_audio(),
                Activity::Timeout => {}
            }

            lastmarked = currentmarked;
        }
        Ok(())
    }

    /// The first loop pass after a marked-and-waiting leader arrives tells
    /// them how many parties are about to be conferenced in.
    fn preannounce_marked_arrival(&mut self, currentmarked: usize, lastmarked: usize) -> Flow {
        if self.flags.contains(ConfFlags::QUIET)
            || !self.flags.contains(ConfFlags::MARKED)
            || !self.flags.contains(ConfFlags::WAIT_MARKED)
            || lastmarked != 0
        {
            return Ok(());
        }
        let users = self.conf.user_count();
        if currentmarked == 1 && users > 1 {
            let others = users as i64 - 1;
            self.call.say_number(others).map_err(|_| Abort)?;
            if others == 1 {
                self.prompt("conf-userwilljoin")?;
            } else {
                self.prompt("conf-userswilljoin")?;
            }
        }
        Ok(())
    }

    fn handle_marked_transition(&mut self, currentmarked: usize, lastmarked: usize) -> Flow {
        if currentmarked == 0 {
            if lastmarked != 0 {
                if !self.flags.contains(ConfFlags::QUIET) {
                    self.prompt("conf-leaderhasleft")?;
                }
                if self.flags.contains(ConfFlags::MARKED_EXIT) {
                    return Ok(());
                }
                self.mode = ConfMode::CONF;
                if !self.apply_mode() {
                    return Err(Abort);
                }
            }
            if !self.music_on_hold && self.flags.contains(ConfFlags::MOH) {
                self.call.moh_start();
                self.music_on_hold = true;
            } else {
                self.mode = ConfMode::CONF;
                if !self.apply_mode() {
                    return Err(Abort);
                }
            }
        } else if lastmarked == 0 {
            self.mode = self.mode_for_flags();
            if !self.apply_mode() {
                return Err(Abort);
            }
            if self.music_on_hold && self.flags.contains(ConfFlags::MOH) {
                self.call.moh_stop();
                self.music_on_hold = false;
            }
            if !self.flags.contains(ConfFlags::QUIET) && !self.flags.contains(ConfFlags::MARKED) {
                self.prompt("conf-placeintoconf")?;
                self.conf.play_tone(crate::tones::Tone::Enter);
            }
        }
        Ok(())
    }

    fn left_with_marked(&self, currentmarked: usize, lastmarked: usize) -> bool {
        currentmarked == 0 && lastmarked != 0 && self.flags.contains(ConfFlags::MARKED_EXIT)
    }

    fn music_when_alone(&mut self) {
        if !self.flags.contains(ConfFlags::MOH)
            || self.flags.contains(ConfFlags::WAIT_MARKED)
            || self.registry.config().skip_moh_when_alone
        {
            return;
        }
        if self.conf.user_count() == 1 {
            if !self.music_on_hold {
                self.call.moh_start();
                self.music_on_hold = true;
            }
        } else if self.music_on_hold {
            self.call.moh_stop();
            self.music_on_hold = false;
        }
    }

    /// Applies admin-set flags; returns false when the session must end.
    fn observe_admin_flags(&mut self) -> bool {
        let admin_flags = self.me.admin_flags();
        if !admin_flags.is_empty() {
            if admin_flags.contains(AdminFlags::MUTED) && self.mode.contains(ConfMode::TALKER) {
                self.mode.remove(ConfMode::TALKER);
                if !self.apply_mode() {
                    self.ret = -1;
                    return false;
                }
            }
            if !admin_flags.contains(AdminFlags::MUTED)
                && !self.flags.contains(ConfFlags::MONITOR)
                && !self.mode.contains(ConfMode::TALKER)
            {
                self.mode.insert(ConfMode::TALKER);
                if !self.apply_mode() {
                    self.ret = -1;
                    return false;
                }
            }
            if admin_flags.contains(AdminFlags::KICK_ME) {
                let _ = self.call.play_prompt("conf-kicked");
                self.ret = 0;
                return false;
            }
        } else if !self.flags.contains(ConfFlags::MONITOR) && !self.mode.contains(ConfMode::TALKER)
        {
            self.mode.insert(ConfMode::TALKER);
            if !self.apply_mode() {
                self.ret = -1;
                return false;
            }
        }
        true
    }

    /// Handles one frame from the call; false ends the session.
    fn handle_call_frame(&mut self, frame: CallFrame) -> Result<bool, Abort> {
        match frame {
            CallFrame::Voice(mut samples) => {
                if self.talk.actual != 0 {
                    adjust_volume(&mut samples, self.talk.actual);
                }
                self.watch_talker(&samples);
                if self.using_pseudo && !self.flags.contains(ConfFlags::MONITOR) {
                    let mut bytes = vec![0u8; samples.len() * 2];
                    LittleEndian::write_i16_into(&samples, &mut bytes);
                    if let Some(port) = self.port.as_mut() {
                        let _ = careful_write(port.as_mut(), &bytes);
                    }
                }
            }
            CallFrame::Dtmf(digit) if self.flags.contains(ConfFlags::EXIT_CONTEXT) => {
                let exten = digit.to_string();
                let context = self.exit_context.clone();
                if self.call.goto_if_exists(&context, &exten) {
                    self.ret = 0;
                    return Ok(false);
                }
                debug!(
                    "exit by single digit failed: extension {} not in context {}",
                    exten, context
                );
            }
            CallFrame::Dtmf('#') if self.flags.contains(ConfFlags::POUND_EXIT) => {
                self.ret = 0;
                return Ok(false);
            }
            CallFrame::Dtmf(digit)
                if (digit == '*' && self.flags.contains(ConfFlags::STAR_MENU))
                    || self.menu_active =>
            {
                self.star_menu(digit)?;
            }
            other => {
                debug!("dropping unrecognized frame {:?}", other);
            }
        }
        Ok(true)
    }

    fn watch_talker(&mut self, samples: &[i16]) {
        let monitor = match self.monitor.as_mut() {
            Some(m) => m,
            None => return,
        };
        if let Some(edge) = monitor.observe(samples) {
            let (state, kind) = match edge {
                TalkEdge::Started => (TalkState::Talking, EventKind::Talking),
                TalkEdge::Stopped => (TalkState::Silent, EventKind::StopTalking),
            };
            self.me.set_talk_state(state);
            self.conf.emit(kind, &self.me);
        } else {
            self.me.set_talk_state(monitor.state());
        }
    }

    fn pump_mixed_audio(&mut self) {
        if !self.using_pseudo {
            return;
        }
        let mut buf = [0u8; CONF_SIZE];
        let read = match self.port.as_mut() {
            Some(port) => port.read_audio(&mut buf),
            None => return,
        };
        match read {
            Ok(n) if n >= 2 => {
                let mut samples = vec![0i16; n / 2];
                LittleEndian::read_i16_into(&buf[..(n / 2) * 2], &mut samples);
                if self.listen.actual != 0 {
                    adjust_volume(&mut samples, self.listen.actual);
                }
                if let Err(e) = self.call.write_voice(&samples) {
                    warn!("unable to write frame to channel: {}", e);
                }
            }
            Ok(_) => warn!("failed to read frame from mixer"),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => warn!("failed to read frame from mixer: {}", e),
        }
    }

    /// Plays a prompt to the call, mapping hangup to an abort.
    fn prompt(&mut self, name: &str) -> Result<Option<char>, Abort> {
        match self.call.play_prompt(name) {
            Ok(digit) => Ok(digit),
            Err(Error::PeerHangup) => Err(Abort),
            Err(e) => {
                warn!("prompt '{}' failed: {}", name, e);
                Ok(None)
            }
        }
    }

    fn tweak_talk(&mut self, action: VolumeAction) {
        self.talk.tweak(action);
        if self
            .call
            .set_gain(Gain::Talk, gain_for(self.talk.desired))
            .is_ok()
        {
            self.talk.actual = 0;
        } else {
            self.talk.actual = self.talk.desired;
        }
    }

    fn tweak_listen(&mut self, action: VolumeAction) {
        self.listen.tweak(action);
        if self
            .call
            .set_gain(Gain::Listen, gain_for(self.listen.desired))
            .is_ok()
        {
            self.listen.actual = 0;
        } else {
            self.listen.actual = self.listen.desired;
        }
    }

    fn teardown(&mut self, graceful: bool) {
        if !self.using_pseudo {
            // The native binding belongs to the call; leave it unbound
            // rather than closed.
            self.detach_mode();
        }
        self.port = None;

        let _ = self.call.set_gain(Gain::Talk, 0);
        let _ = self.call.set_gain(Gain::Listen, 0);

        if graceful
            && !self.flags.contains(ConfFlags::QUIET)
            && !self.flags.contains(ConfFlags::MONITOR)
            && !self.flags.contains(ConfFlags::ADMIN)
        {
            self.conf.play_tone(crate::tones::Tone::Leave);
        }

        if graceful && !self.flags.contains(ConfFlags::QUIET) && self.flags.contains(ConfFlags::INTRO_USER)
        {
            if let Some(path) = self.name_rec.clone().filter(|p| p.exists()) {
                if self.conf.user_count() > 1 {
                    self.conf.play_clip(Clip::File(&path), self.call.language());
                    self.conf
                        .play_clip(Clip::Prompt("conf-hasleft"), self.call.language());
                }
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("could not delete name recording {}: {}", path.display(), e);
                }
            }
        }

        self.conf.emit(EventKind::Leave, &self.me);
        self.conf
            .remove(self.me.user_no(), self.flags.contains(ConfFlags::MARKED));

        let secs = self.me.joined_at().elapsed().as_secs();
        self.call.set_var("MEETMESECS", &secs.to_string());

        self.registry.reap_if_empty(self.conf);
    }
}
