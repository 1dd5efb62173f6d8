// Session lifecycle: open port -> start reader -> stop reader -> close port.
//
// At most one PortSession and one ReaderLoop exist at a time. A read failure
// tears the session down from the reader thread before the error is handed
// to the presentation layer; a write failure leaves it connected.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{ConnectError, SendError};
use crate::event::SessionEvents;
use crate::port::{PortDescriptor, PortOpener, PortSession, SystemPortOpener};
use crate::reader::ReaderLoop;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

struct ActiveSession {
    port: Arc<PortSession>,
    reader: Option<ReaderLoop>,
}

impl ActiveSession {
    /// Stop the reader (bounded wait) and close the port.
    fn shutdown(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
        self.port.close();
    }
}

struct Inner {
    state: SessionState,
    /// Descriptor being opened or in use.
    target: Option<PortDescriptor>,
    /// Bumped on every connect attempt so a stale attempt or reader cannot
    /// touch a newer session.
    generation: u64,
    active: Option<ActiveSession>,
}

pub struct SessionController {
    inner: Arc<Mutex<Inner>>,
    opener: Box<dyn PortOpener>,
    events: Arc<dyn SessionEvents>,
    config: SessionConfig,
}

impl SessionController {
    /// Controller for real serial devices with default timings.
    pub fn new(events: Arc<dyn SessionEvents>) -> Self {
        Self::with_config(events, Box::new(SystemPortOpener), SessionConfig::default())
    }

    pub fn with_config(
        events: Arc<dyn SessionEvents>,
        opener: Box<dyn PortOpener>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Disconnected,
                target: None,
                generation: 0,
                active: None,
            })),
            opener,
            events,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Descriptor of the live session, if any.
    pub fn descriptor(&self) -> Option<PortDescriptor> {
        self.lock()
            .active
            .as_ref()
            .map(|active| active.port.descriptor().clone())
    }

    /// Validate the raw port/baud input and open a session.
    pub fn connect(&self, port: &str, baud: &str) -> Result<(), ConnectError> {
        let descriptor = PortDescriptor::parse(port, baud)?;
        self.connect_to(descriptor)
    }

    /// Open a session for `descriptor`.
    ///
    /// The controller lock is released while the device opens, so `state()`
    /// reports `Connecting` meanwhile. A `disconnect` during that window
    /// cancels the attempt.
    pub fn connect_to(&self, descriptor: PortDescriptor) -> Result<(), ConnectError> {
        let generation = {
            let mut inner = self.lock();
            if inner.state != SessionState::Disconnected {
                let current = inner
                    .target
                    .as_ref()
                    .map(PortDescriptor::to_string)
                    .unwrap_or_default();
                return Err(ConnectError::AlreadyConnected(current));
            }
            inner.state = SessionState::Connecting;
            inner.target = Some(descriptor.clone());
            inner.generation += 1;
            inner.generation
        };

        let opened = PortSession::open(&descriptor, self.opener.as_ref(), &self.config);

        let mut inner = self.lock();
        if inner.state != SessionState::Connecting || inner.generation != generation {
            // Disconnected while the device was opening.
            if let Ok(port) = opened {
                port.close();
            }
            info!("Connect to {} cancelled", descriptor);
            return Err(ConnectError::Cancelled(descriptor.name));
        }

        let port = match opened {
            Ok(port) => Arc::new(port),
            Err(e) => {
                warn!("{}", e);
                inner.state = SessionState::Disconnected;
                inner.target = None;
                return Err(e);
            }
        };

        let line_events = self.events.clone();
        let error_events = self.events.clone();
        let controller = Arc::downgrade(&self.inner);

        let reader = ReaderLoop::start(
            port.clone(),
            move |event| line_events.on_line_event(event),
            move |message| {
                if teardown_after_read_failure(&controller, generation) {
                    error_events.on_fatal_error(message);
                }
            },
            self.config.stop_grace,
        );

        let reader = match reader {
            Ok(reader) => reader,
            Err(source) => {
                port.close();
                inner.state = SessionState::Disconnected;
                inner.target = None;
                return Err(ConnectError::ReaderSpawn {
                    port: descriptor.name,
                    source,
                });
            }
        };

        inner.active = Some(ActiveSession {
            port,
            reader: Some(reader),
        });
        inner.state = SessionState::Connected;
        info!("Connected to {}", descriptor);

        Ok(())
    }

    /// Stop the reader and close the port. No-op when already disconnected.
    pub fn disconnect(&self) {
        let active = {
            let mut inner = self.lock();
            inner.state = SessionState::Disconnected;
            inner.target = None;
            inner.active.take()
        };

        match active {
            Some(active) => {
                let name = active.port.descriptor().name.clone();
                active.shutdown();
                info!("Disconnected from {}", name);
            }
            None => debug!("Disconnect requested while not connected"),
        }
    }

    /// Send one line. Surrounding whitespace is trimmed and a single `\n`
    /// appended; blank input sends nothing.
    pub fn send(&self, text: &str) -> Result<(), SendError> {
        let port = self
            .lock()
            .active
            .as_ref()
            .map(|active| active.port.clone())
            .ok_or(SendError::NotConnected)?;

        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(b'\n');

        port.write(&payload).map_err(|e| {
            warn!("Write to {} failed: {}", port.descriptor().name, e);
            send_error(e)
        })?;
        debug!("Sent {} bytes to {}", payload.len(), port.descriptor().name);

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// A port closed under us (read-failure teardown racing a send) means the
/// session is gone, not that the write failed.
fn send_error(e: io::Error) -> SendError {
    if e.kind() == io::ErrorKind::NotConnected {
        SendError::NotConnected
    } else {
        SendError::Write(e)
    }
}

/// Runs on the reader thread after its loop has failed. Returns whether the
/// failed reader still belonged to the live session.
fn teardown_after_read_failure(inner: &Weak<Mutex<Inner>>, generation: u64) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };

    let active = {
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.generation != generation || guard.active.is_none() {
            return false;
        }
        guard.state = SessionState::Disconnected;
        guard.target = None;
        guard.active.take()
    };

    if let Some(mut active) = active {
        // This is the reader's own thread; dropping the handle detaches it.
        drop(active.reader.take());
        active.port.close();
        warn!(
            "Session on {} closed after read failure",
            active.port.descriptor().name
        );
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LineEvent;
    use std::time::Duration;

    struct Ignore;

    impl SessionEvents for Ignore {
        fn on_line_event(&self, _: LineEvent) {}
        fn on_fatal_error(&self, _: String) {}
    }

    struct NoDevices;

    impl PortOpener for NoDevices {
        fn open(
            &self,
            descriptor: &PortDescriptor,
            _: Duration,
        ) -> io::Result<Box<dyn crate::port::Transport>> {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("could not open port {}", descriptor.name),
            ))
        }
    }

    fn controller() -> SessionController {
        SessionController::with_config(
            Arc::new(Ignore),
            Box::new(NoDevices),
            SessionConfig::default(),
        )
    }

    #[test]
    fn test_starts_disconnected() {
        let controller = controller();
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert!(controller.descriptor().is_none());
    }

    #[test]
    fn test_disconnect_when_never_connected() {
        let controller = controller();
        controller.disconnect();
        controller.disconnect();
        assert_eq!(controller.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_input_validated_before_open() {
        let controller = controller();
        assert!(matches!(controller.connect("", "9600"), Err(ConnectError::InvalidPort)));
        assert!(matches!(
            controller.connect("COM1", "abc"),
            Err(ConnectError::InvalidBaud(_))
        ));
    }

    #[test]
    fn test_open_failure_leaves_disconnected() {
        let controller = controller();
        let err = controller.connect("/dev/ttyUSB9", "9600").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to open /dev/ttyUSB9: could not open port /dev/ttyUSB9"
        );
        assert_eq!(controller.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_closed_port_maps_to_not_connected() {
        let closed = io::Error::new(io::ErrorKind::NotConnected, "port is closed");
        assert!(matches!(send_error(closed), SendError::NotConnected));

        let broken = io::Error::new(io::ErrorKind::BrokenPipe, "Broken pipe");
        match send_error(broken) {
            SendError::Write(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_send_while_disconnected() {
        let controller = controller();
        assert!(matches!(controller.send("hello"), Err(SendError::NotConnected)));
        assert!(matches!(controller.send("   "), Err(SendError::NotConnected)));
    }
}
