//! Scripted call implementation backing the session and scenario tests.
//!
//! A `ScriptedCall` walks a fixed sequence of wait outcomes (frames,
//! timeouts, mixer readiness, gates for cross-thread sequencing) and records
//! everything the session does to it: prompts, spoken numbers, gain pokes,
//! music-on-hold flips, written audio, and variable stores.

use super::{Activity, Call, CallFrame, Clip, Gain, GainUnsupported, PromptPlayer};
use crate::{
    error::{Error, Result},
    mixer::MixerPort,
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    fs,
    path::Path,
    sync::Arc,
    time::Duration,
};

/// One scripted outcome of `wait_activity`.
pub(crate) enum Step {
    /// The call produces this frame.
    Frame(CallFrame),
    /// The frame period elapses idle.
    Timeout,
    /// The mixer port has audio queued.
    Mixer,
    /// Block until the paired sender fires, then report an idle period.
    /// Used to interleave sessions deterministically across threads.
    Gate(flume::Receiver<()>),
}

/// Everything a session did to a scripted call.
#[derive(Default)]
pub(crate) struct CallLog {
    pub prompts: Mutex<Vec<String>>,
    pub numbers: Mutex<Vec<i64>>,
    pub digit_strings: Mutex<Vec<String>>,
    pub gains: Mutex<Vec<(Gain, i8)>>,
    pub moh: Mutex<Vec<bool>>,
    pub written: Mutex<Vec<i16>>,
    pub vars: Mutex<HashMap<String, String>>,
    pub background: Mutex<Vec<String>>,
    pub gotos: Mutex<Vec<(String, String)>>,
}

impl CallLog {
    pub(crate) fn prompt_played(&self, name: &str) -> bool {
        self.prompts.lock().iter().any(|p| p == name)
    }

    pub(crate) fn prompt_count(&self, name: &str) -> usize {
        self.prompts.lock().iter().filter(|p| *p == name).count()
    }

    pub(crate) fn var(&self, name: &str) -> Option<String> {
        self.vars.lock().get(name).cloned()
    }
}

pub(crate) struct ScriptedCall {
    name: String,
    unique_id: String,
    caller_id: Option<String>,
    caller_name: Option<String>,
    language: String,
    context: String,
    up: bool,
    steps: VecDeque<Step>,
    staged: Option<CallFrame>,
    digits: VecDeque<String>,
    prompt_interrupts: HashMap<String, char>,
    gain_supported: bool,
    vars: HashMap<String, String>,
    extens: HashSet<(String, String)>,
    native: Option<Box<dyn MixerPort>>,
    generation: u64,
    log: Arc<CallLog>,
}

impl ScriptedCall {
    pub(crate) fn new(name: &str, unique_id: &str) -> Self {
        Self {
            name: name.to_string(),
            unique_id: unique_id.to_string(),
            caller_id: None,
            caller_name: None,
            language: "en".to_string(),
            context: "default".to_string(),
            up: true,
            steps: VecDeque::new(),
            staged: None,
            digits: VecDeque::new(),
            prompt_interrupts: HashMap::new(),
            gain_supported: true,
            vars: HashMap::new(),
            extens: HashSet::new(),
            native: None,
            generation: 0,
            log: Arc::new(CallLog::default()),
        }
    }

    pub(crate) fn log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }

    pub(crate) fn push_step(&mut self, step: Step) -> &mut Self {
        self.steps.push_back(step);
        self
    }

    pub(crate) fn push_timeouts(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            self.steps.push_back(Step::Timeout);
        }
        self
    }

    pub(crate) fn push_voice(&mut self, samples: Vec<i16>) -> &mut Self {
        self.steps.push_back(Step::Frame(CallFrame::Voice(samples)));
        self
    }

    pub(crate) fn push_dtmf(&mut self, digit: char) -> &mut Self {
        self.steps.push_back(Step::Frame(CallFrame::Dtmf(digit)));
        self
    }

    /// Queues a response for the next `read_digits` call.
    pub(crate) fn push_digits(&mut self, digits: &str) -> &mut Self {
        self.digits.push_back(digits.to_string());
        self
    }

    /// Makes the named prompt be interrupted by `digit`.
    pub(crate) fn interrupt_prompt(&mut self, prompt: &str, digit: char) -> &mut Self {
        self.prompt_interrupts.insert(prompt.to_string(), digit);
        self
    }

    /// Simulates a channel driver that cannot absorb gain requests.
    pub(crate) fn deny_gain(&mut self) -> &mut Self {
        self.gain_supported = false;
        self
    }

    pub(crate) fn set_variable(&mut self, name: &str, value: &str) -> &mut Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn allow_exten(&mut self, context: &str, exten: &str) -> &mut Self {
        self.extens
            .insert((context.to_string(), exten.to_string()));
        self
    }

    pub(crate) fn with_caller(&mut self, num: &str, name: &str) -> &mut Self {
        self.caller_id = Some(num.to_string());
        self.caller_name = Some(name.to_string());
        self
    }

    /// Gives the call a native mixer port, as a device-attached channel has.
    pub(crate) fn with_native_port(&mut self, port: Box<dyn MixerPort>) -> &mut Self {
        self.native = Some(port);
        self
    }
}

impl Call for ScriptedCall {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn caller_id(&self) -> Option<&str> {
        self.caller_id.as_deref()
    }

    fn caller_name(&self) -> Option<&str> {
        self.caller_name.as_deref()
    }

    fn language(&self) -> &str {
        &self.language
    }

    fn context(&self) -> &str {
        &self.context
    }

    fn is_up(&self) -> bool {
        self.up
    }

    fn answer(&mut self) -> Result<()> {
        self.up = true;
        Ok(())
    }

    fn set_linear_read(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_linear_write(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_gain(&mut self, which: Gain, db: i8) -> std::result::Result<(), GainUnsupported> {
        if self.gain_supported {
            self.log.gains.lock().push((which, db));
            Ok(())
        } else {
            Err(GainUnsupported)
        }
    }

    fn take_native_mixer_port(&mut self) -> Option<Box<dyn MixerPort>> {
        self.native.take()
    }

    fn descriptor_generation(&self) -> u64 {
        self.generation
    }

    fn wait_activity(
        &mut self,
        _mixer: Option<&mut dyn MixerPort>,
        _timeout: Duration,
    ) -> Activity {
        match self.steps.pop_front() {
            Some(Step::Frame(f)) => {
                self.staged = Some(f);
                Activity::Call
            }
            Some(Step::Timeout) => Activity::Timeout,
            Some(Step::Mixer) => Activity::Mixer,
            Some(Step::Gate(rx)) => {
                let _ = rx.recv();
                Activity::Timeout
            }
            // Script exhausted: report a readable call whose read then
            // signals hangup.
            None => Activity::Call,
        }
    }

    fn read_frame(&mut self) -> Option<CallFrame> {
        self.staged.take()
    }

    fn write_voice(&mut self, samples: &[i16]) -> Result<()> {
        self.log.written.lock().extend_from_slice(samples);
        Ok(())
    }

    fn play_prompt(&mut self, prompt: &str) -> Result<Option<char>> {
        self.log.prompts.lock().push(prompt.to_string());
        Ok(self.prompt_interrupts.get(prompt).copied())
    }

    fn say_number(&mut self, n: i64) -> Result<Option<char>> {
        self.log.numbers.lock().push(n);
        Ok(None)
    }

    fn say_digits(&mut self, digits: &str) -> Result<Option<char>> {
        self.log.digit_strings.lock().push(digits.to_string());
        Ok(None)
    }

    fn read_digits(&mut self, prompt: &str, _max_len: usize) -> Result<String> {
        self.log.prompts.lock().push(prompt.to_string());
        self.digits.pop_front().ok_or(Error::PeerHangup)
    }

    fn record_name(&mut self, path: &Path, _max_secs: u32) -> Result<()> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        fs::write(path, b"scripted-name").map_err(Error::Device)
    }

    fn moh_start(&mut self) {
        self.log.moh.lock().push(true);
    }

    fn moh_stop(&mut self) {
        self.log.moh.lock().push(false);
    }

    fn get_var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set_var(&mut self, name: &str, value: &str) {
        self.log
            .vars
            .lock()
            .insert(name.to_string(), value.to_string());
    }

    fn goto_if_exists(&mut self, context: &str, exten: &str) -> bool {
        let hit = self
            .extens
            .contains(&(context.to_string(), exten.to_string()));
        if hit {
            self.log
                .gotos
                .lock()
                .push((context.to_string(), exten.to_string()));
        }
        hit
    }

    fn run_background(&mut self, script: &str) -> Result<i32> {
        self.log.background.lock().push(script.to_string());
        Ok(0)
    }
}

/// Prompt player that records what was asked of it instead of rendering.
#[derive(Clone, Default)]
pub(crate) struct RecordingPromptPlayer {
    played: Arc<Mutex<Vec<String>>>,
}

impl RecordingPromptPlayer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }
}

impl PromptPlayer for RecordingPromptPlayer {
    fn play_to_mixer(
        &self,
        _port: &mut dyn MixerPort,
        clip: Clip<'_>,
        _language: &str,
    ) -> Result<()> {
        let tag = match clip {
            Clip::Prompt(name) => name.to_string(),
            Clip::File(path) => format!("file:{}", path.display()),
        };
        self.played.lock().push(tag);
        Ok(())
    }
}
