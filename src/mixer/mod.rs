//! The mixer-device boundary.
//!
//! The conference core does no audio summation itself: a kernel-style mixer
//! device owns that. What the core needs from it is small — open a pseudo
//! port, bind it to a conference in some mode, push and pull linear audio,
//! and poll for writability — so the whole device is expressed as two traits
//! that an in-memory implementation can stand in for under test.

#[cfg(test)]
pub(crate) mod testutil;

use crate::error::{Error, Result};
use bitflags::bitflags;
use std::io;
use tracing::warn;

bitflags! {
    /// Conference binding mode bits, laid out as the device expects them.
    ///
    /// The low bits select the binding class, the high bits grant the talk
    /// and listen paths independently.
    pub struct ConfMode: u32 {
        /// Ordinary conference membership.
        const CONF = 1 << 2;
        /// The conference's own announcement binding.
        const CONF_ANNOUNCE = 1 << 3;
        /// Monitor a conference without joining it.
        const CONF_MONITOR = 1 << 4;
        /// Monitor the announcement channel (the recording tap).
        const CONF_ANNOUNCE_MONITOR = 1 << 5;
        /// The port receives mixed conference audio.
        const LISTENER = 1 << 8;
        /// The port contributes audio to the mix.
        const TALKER = 1 << 9;
    }
}

/// One conference binding, as passed to and returned by [`MixerPort::set_conf`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConfInfo {
    /// Device channel the binding applies to; `0` means "this port".
    pub channel: i32,
    /// Mixer conference identifier; [`CREATE_CONF_ID`] asks the device to
    /// allocate a fresh one.
    pub conf_id: i32,
    /// Binding mode; empty detaches the port from any conference.
    pub mode: ConfMode,
}

impl Default for ConfInfo {
    /// The detached binding: no conference, no mode.
    fn default() -> Self {
        Self {
            channel: 0,
            conf_id: 0,
            mode: ConfMode::empty(),
        }
    }
}

/// Sentinel conference id requesting allocation of a new mixer conference.
pub const CREATE_CONF_ID: i32 = -1;

/// Buffering policy for a pseudo port's audio queues.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BufferPolicy {
    /// Make audio available as soon as it arrives.
    Immediate,
}

/// Buffer geometry handed to the device when configuring a pseudo port.
#[derive(Clone, Copy, Debug)]
pub struct BufferInfo {
    /// Size of each device buffer, in bytes.
    pub bufsize: usize,
    /// Number of device buffers.
    pub numbufs: u32,
    /// Transmit-side policy.
    pub tx_policy: BufferPolicy,
    /// Receive-side policy.
    pub rx_policy: BufferPolicy,
}

impl Default for BufferInfo {
    /// The conference defaults: half a frame per buffer, four buffers,
    /// immediate policy both ways.
    fn default() -> Self {
        Self {
            bufsize: crate::constants::CONF_SIZE / 2,
            numbufs: crate::constants::MIXER_NUM_BUFS,
            tx_policy: BufferPolicy::Immediate,
            rx_policy: BufferPolicy::Immediate,
        }
    }
}

/// A handle onto the mixer device itself, used to open pseudo ports.
pub trait MixerDevice: Send + Sync {
    /// Opens a fresh pseudo port on the device.
    fn open_pseudo(&self) -> io::Result<Box<dyn MixerPort>>;
}

/// One open port (file descriptor) on the mixer device.
///
/// Audio I/O is nonblocking: `read_audio` reports `WouldBlock` when no mixed
/// audio is queued and `Ok(0)` at end of stream; `write_audio` may accept a
/// short count or zero when the device is backpressured.
pub trait MixerPort: Send {
    /// Binds (or unbinds) this port to a conference. When `conf_id` is
    /// [`CREATE_CONF_ID`] the device allocates a conference and the returned
    /// info carries its real id.
    fn set_conf(&mut self, info: ConfInfo) -> io::Result<ConfInfo>;

    /// Reports the port's current conference binding.
    fn get_conf(&mut self) -> io::Result<ConfInfo>;

    /// Configures the port's buffer geometry.
    fn set_buffering(&mut self, info: BufferInfo) -> io::Result<()>;

    /// Switches the port's sample stream to signed linear.
    fn set_linear(&mut self, linear: bool) -> io::Result<()>;

    /// Blocks until the device can accept a write (or a signalling event
    /// interrupts the wait).
    fn wait_writable(&mut self) -> io::Result<()>;

    /// Discards any queued audio in both directions.
    fn flush(&mut self) -> io::Result<()>;

    /// Writes raw linear bytes into the conference.
    fn write_audio(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Reads mixed linear bytes out of the conference.
    fn read_audio(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Writes a complete buffer to a port, polling for writability between
/// chunks. Backpressure (a zero-length or `WouldBlock` write) abandons the
/// remainder silently; any other error is reported.
pub fn careful_write(port: &mut dyn MixerPort, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        port.wait_writable().map_err(Error::Device)?;
        match port.write_audio(data) {
            Ok(0) => return Ok(()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => {
                warn!("failed to write audio data to conference: {}", e);
                return Err(Error::Device(e));
            }
        }
    }
    Ok(())
}
