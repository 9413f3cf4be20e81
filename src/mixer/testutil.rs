//! Scripted in-memory mixer used by the test suites.
//!
//! `TestMixer` records every binding change and every byte written through
//! each port, and serves reads from per-port queues, so tests can assert on
//! exactly what reached the device and feed synthetic mixed audio back.

use super::{BufferInfo, ConfInfo, MixerDevice, MixerPort, CREATE_CONF_ID};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
        Arc,
    },
};

/// Shared observable state of one opened port.
pub(crate) struct PortState {
    binding: Mutex<ConfInfo>,
    bindings_seen: Mutex<Vec<ConfInfo>>,
    writes: Mutex<Vec<u8>>,
    reads: Mutex<VecDeque<Vec<u8>>>,
    eof: AtomicBool,
    flushes: AtomicUsize,
    linear: AtomicBool,
    write_limit: AtomicUsize,
    writes_left: AtomicI32,
}

impl PortState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            binding: Mutex::new(ConfInfo::default()),
            bindings_seen: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            reads: Mutex::new(VecDeque::new()),
            eof: AtomicBool::new(false),
            flushes: AtomicUsize::new(0),
            linear: AtomicBool::new(false),
            write_limit: AtomicUsize::new(0),
            writes_left: AtomicI32::new(-1),
        })
    }

    /// All bytes written through this port so far.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes.lock().clone()
    }

    /// Queues mixed audio for the next reads.
    pub(crate) fn push_audio(&self, data: &[u8]) {
        self.reads.lock().push_back(data.to_vec());
    }

    /// Marks the read side as ended; further reads return `Ok(0)`.
    pub(crate) fn mark_eof(&self) {
        self.eof.store(true, Ordering::SeqCst);
    }

    /// The port's current conference binding.
    pub(crate) fn binding(&self) -> ConfInfo {
        *self.binding.lock()
    }

    /// Overrides the binding, e.g. to fake a port already in a conference.
    pub(crate) fn preset_binding(&self, info: ConfInfo) {
        *self.binding.lock() = info;
    }

    /// Every binding handed to `set_conf`, in order.
    pub(crate) fn bindings_seen(&self) -> Vec<ConfInfo> {
        self.bindings_seen.lock().clone()
    }

    /// Number of flushes issued.
    pub(crate) fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Whether the port was switched to signed-linear samples.
    pub(crate) fn is_linear(&self) -> bool {
        self.linear.load(Ordering::SeqCst)
    }

    /// Caps each write to at most `n` bytes, forcing the careful-write loop
    /// to iterate.
    pub(crate) fn limit_write(&self, n: usize) {
        self.write_limit.store(n, Ordering::SeqCst);
    }

    /// After `n` more writes, report backpressure (zero-length writes).
    pub(crate) fn block_after(&self, n: i32) {
        self.writes_left.store(n, Ordering::SeqCst);
    }
}

struct MixerInner {
    next_conf: AtomicI32,
    ports: Mutex<Vec<Arc<PortState>>>,
    fail_opens: AtomicUsize,
}

/// The scripted device.
#[derive(Clone)]
pub(crate) struct TestMixer {
    inner: Arc<MixerInner>,
}

impl TestMixer {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(MixerInner {
                next_conf: AtomicI32::new(1),
                ports: Mutex::new(Vec::new()),
                fail_opens: AtomicUsize::new(0),
            }),
        }
    }

    /// State of the `n`th port opened on this device.
    pub(crate) fn port(&self, n: usize) -> Arc<PortState> {
        Arc::clone(&self.inner.ports.lock()[n])
    }

    /// How many ports have been opened so far.
    pub(crate) fn port_count(&self) -> usize {
        self.inner.ports.lock().len()
    }

    /// Makes the next `n` opens fail, for device-error paths.
    pub(crate) fn fail_next_opens(&self, n: usize) {
        self.inner.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Opens a port outside the `MixerDevice` trait, handing back both ends.
    pub(crate) fn open_scripted(&self) -> (Box<dyn MixerPort>, Arc<PortState>) {
        let state = PortState::new();
        self.inner.ports.lock().push(Arc::clone(&state));
        (
            Box::new(TestPort {
                state: Arc::clone(&state),
                mixer: Arc::clone(&self.inner),
            }),
            state,
        )
    }
}

impl MixerDevice for TestMixer {
    fn open_pseudo(&self) -> io::Result<Box<dyn MixerPort>> {
        let failing = self.inner.fail_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.inner.fail_opens.store(failing - 1, Ordering::SeqCst);
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "pseudo device unavailable",
            ));
        }
        Ok(self.open_scripted().0)
    }
}

struct TestPort {
    state: Arc<PortState>,
    mixer: Arc<MixerInner>,
}

impl MixerPort for TestPort {
    fn set_conf(&mut self, mut info: ConfInfo) -> io::Result<ConfInfo> {
        if info.conf_id == CREATE_CONF_ID {
            info.conf_id = self.mixer.next_conf.fetch_add(1, Ordering::SeqCst);
        }
        self.state.bindings_seen.lock().push(info);
        *self.state.binding.lock() = info;
        Ok(info)
    }

    fn get_conf(&mut self) -> io::Result<ConfInfo> {
        Ok(*self.state.binding.lock())
    }

    fn set_buffering(&mut self, _info: BufferInfo) -> io::Result<()> {
        Ok(())
    }

    fn set_linear(&mut self, linear: bool) -> io::Result<()> {
        self.state.linear.store(linear, Ordering::SeqCst);
        Ok(())
    }

    fn wait_writable(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        self.state.reads.lock().clear();
        Ok(())
    }

    fn write_audio(&mut self, data: &[u8]) -> io::Result<usize> {
        let left = self.state.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(0);
        }
        if left > 0 {
            self.state.writes_left.store(left - 1, Ordering::SeqCst);
        }

        let limit = self.state.write_limit.load(Ordering::SeqCst);
        let n = if limit == 0 { data.len() } else { data.len().min(limit) };
        self.state.writes.lock().extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn read_audio(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reads = self.state.reads.lock();
        match reads.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    reads.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            None if self.state.eof.load(Ordering::SeqCst) => Ok(0),
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no mixed audio")),
        }
    }
}
