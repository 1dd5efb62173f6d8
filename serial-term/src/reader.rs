// Background reader: pulls bytes from a PortSession, frames them into lines
// and hands each line to a callback. Cancellation is cooperative; the bounded
// read timeout is what bounds shutdown latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::event::LineEvent;
use crate::framer::{LineFramer, decode_record};
use crate::port::PortSession;

// ============================================================================
// Run State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Running = 0,
    StopRequested = 1,
    Stopped = 2,
    Failed = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunState::Running,
            1 => RunState::StopRequested,
            2 => RunState::Stopped,
            _ => RunState::Failed,
        }
    }
}

/// The only value both the control thread and the reader thread touch.
#[derive(Debug)]
struct RunFlag(AtomicU8);

impl RunFlag {
    fn new(state: RunState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: RunState, to: RunState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// Reader Loop
// ============================================================================

/// Handle to the reader thread of one session.
///
/// Dropping the handle requests a stop without waiting.
#[derive(Debug)]
pub struct ReaderLoop {
    state: Arc<RunFlag>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    grace: Duration,
}

impl ReaderLoop {
    /// Spawn the reader thread in the `Running` state.
    ///
    /// `on_line` receives every completed line in arrival order. `on_error`
    /// receives the transport error text if a read fails; the loop then exits
    /// without retrying. A failure observed after a stop request is not
    /// reported.
    pub fn start<L, E>(
        session: Arc<PortSession>,
        on_line: L,
        on_error: E,
        grace: Duration,
    ) -> std::io::Result<Self>
    where
        L: FnMut(LineEvent) + Send + 'static,
        E: FnOnce(String) + Send + 'static,
    {
        let state = Arc::new(RunFlag::new(RunState::Running));
        let (done_tx, done_rx) = mpsc::sync_channel(1);

        let thread_state = state.clone();
        let handle = thread::Builder::new()
            .name(format!("serial-reader:{}", session.descriptor().name))
            .spawn(move || run(session, thread_state, on_line, on_error, done_tx))?;

        Ok(Self {
            state,
            done_rx,
            handle: Some(handle),
            grace,
        })
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    /// Request a stop and wait up to the grace period for the thread to exit.
    ///
    /// Returns `false` if the thread was still running when the grace period
    /// ran out; it is then left to finish on its own.
    pub fn stop(mut self) -> bool {
        self.state.transition(RunState::Running, RunState::StopRequested);

        match self.done_rx.recv_timeout(self.grace) {
            // Disconnected means the thread died without signalling (panic).
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        error!("Serial reader thread panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Serial reader did not exit within {:?}, detaching",
                    self.grace
                );
                false
            }
        }
    }
}

impl Drop for ReaderLoop {
    fn drop(&mut self) {
        self.state.transition(RunState::Running, RunState::StopRequested);
    }
}

fn run<L, E>(
    session: Arc<PortSession>,
    state: Arc<RunFlag>,
    mut on_line: L,
    on_error: E,
    done_tx: SyncSender<()>,
) where
    L: FnMut(LineEvent),
    E: FnOnce(String),
{
    let port = session.descriptor().name.clone();
    info!("Serial reader started on {}", port);

    let mut framer = LineFramer::new();

    while state.get() == RunState::Running && session.is_open() {
        let started = Instant::now();
        match session.read_available() {
            Ok(bytes) if bytes.is_empty() => {
                // Some transports return nothing immediately (e.g. a pty at
                // EOF); never poll faster than one read timeout.
                let idle = session.read_timeout().saturating_sub(started.elapsed());
                if !idle.is_zero() && session.is_open() {
                    thread::sleep(idle);
                }
            }
            Ok(bytes) => {
                for record in framer.feed(&bytes) {
                    on_line(LineEvent::new(decode_record(&record)));
                }
            }
            Err(e) => {
                if state.transition(RunState::Running, RunState::Failed) {
                    error!("Error reading from {}: {}", port, e);
                    on_error(e.to_string());
                } else {
                    debug!("Read on {} failed after stop request: {}", port, e);
                }
                break;
            }
        }
    }

    if !framer.pending().is_empty() {
        debug!(
            "Dropping {} unterminated bytes from {}",
            framer.pending().len(),
            port
        );
    }

    // Failed stays Failed; anything else ends as Stopped.
    if !state.transition(RunState::Running, RunState::Stopped) {
        state.transition(RunState::StopRequested, RunState::Stopped);
    }
    info!("Serial reader on {} exited ({:?})", port, state.get());

    let _ = done_tx.send(());
}

// ============================================================================
// Tests
// ============================================================================
