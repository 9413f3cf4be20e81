//! The per-conference recorder task.
//!
//! When a participant requests recording, a detached thread drains the
//! conference's announcement monitor stream and hands each linear frame to a
//! [`RecordSink`]. The thread runs until the conference asks it to stop or
//! the stream ends; either way it reports `Off` so teardown can complete.

use super::{Conference, RecordingState};
use crate::{
    constants::CONF_SIZE,
    error::{Error, Result},
};
use byteorder::{ByteOrder, LittleEndian};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};
use tracing::{debug, instrument, warn};

/// Receives the recorded conference mix, one frame at a time.
pub trait RecordSink: Send {
    /// Appends one frame of linear samples.
    fn write_frame(&mut self, samples: &[i16]) -> Result<()>;

    /// Flushes and closes the underlying file.
    fn finish(&mut self) -> Result<()>;
}

/// The default sink: a mono 16-bit WAV file at the conference sample rate.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavSink {
    /// Creates the output file, truncating any previous recording.
    pub fn create(path: &Path) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: crate::constants::SAMPLE_RATE as u32,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(wav_err)?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl RecordSink for WavSink {
    fn write_frame(&mut self, samples: &[i16]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::Device(io::Error::new(
                io::ErrorKind::Other,
                "recording already finalized",
            ))
        })?;
        for &s in samples {
            writer.write_sample(s).map_err(wav_err)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(wav_err),
            None => Ok(()),
        }
    }
}

fn wav_err(e: hound::Error) -> Error {
    match e {
        hound::Error::IoError(io) => Error::Device(io),
        other => Error::Device(io::Error::new(io::ErrorKind::Other, other.to_string())),
    }
}

/// Resolves the recording target into a concrete path and sink.
///
/// Relative filenames land in the spool directory. Formats other than `wav`
/// are noted and recorded as WAV anyway; the sink trait is the extension
/// point for real alternate formats.
pub fn open_sink(file: &str, format: &str, spool_dir: &Path) -> Result<(PathBuf, Box<dyn RecordSink>)> {
    let base = if Path::new(file).is_absolute() {
        PathBuf::from(file)
    } else {
        spool_dir.join(file)
    };
    // Append rather than set_extension: unique ids in default filenames
    // contain dots.
    let mut os = base.into_os_string();
    os.push(".");
    os.push(format);
    let path = PathBuf::from(os);

    if !format.eq_ignore_ascii_case("wav") {
        warn!("recording format '{}' not available, writing wav", format);
    }
    let sink = WavSink::create(&path)?;
    Ok((path, Box::new(sink)))
}

/// Starts the detached recorder thread for a conference whose recording
/// state was just claimed. On spawn failure the claim is released so the
/// conference can tear down normally.
pub(crate) fn spawn(conf: Arc<Conference>, frame_time: Duration, spool_dir: PathBuf) {
    let confno = conf.confno().to_string();
    let spawned = thread::Builder::new()
        .name(format!("meetme-rec-{}", confno))
        .spawn(move || runner(conf, frame_time, &spool_dir));
    if let Err(e) = spawned {
        warn!("unable to start recorder for conference {}: {}", confno, e);
    }
}

#[instrument(skip(conf, spool_dir), fields(confno = %conf.confno()))]
fn runner(conf: Arc<Conference>, frame_time: Duration, spool_dir: &Path) {
    let (file, format) = match conf.recording_target() {
        Some(target) => target,
        None => {
            conf.finish_recording();
            return;
        }
    };

    let (path, mut sink) = match open_sink(&file, &format, spool_dir) {
        Ok(opened) => opened,
        Err(e) => {
            warn!("cannot open recording {}: {}", file, e);
            conf.finish_recording();
            return;
        }
    };
    debug!("recording conference into {}", path.display());

    let mut buf = [0u8; CONF_SIZE];
    let mut samples = [0i16; CONF_SIZE / 2];
    loop {
        if conf.recording_state() == RecordingState::Terminating {
            break;
        }
        match conf.read_announce(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let count = n / 2;
                LittleEndian::read_i16_into(&buf[..count * 2], &mut samples[..count]);
                if let Err(e) = sink.write_frame(&samples[..count]) {
                    warn!("recording write failed: {}", e);
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(frame_time),
            Err(e) => {
                warn!("recording read failed: {}", e);
                break;
            }
        }
    }

    if let Err(e) = sink.finish() {
        warn!("could not finalize recording {}: {}", path.display(), e);
    }
    conf.finish_recording();
}
