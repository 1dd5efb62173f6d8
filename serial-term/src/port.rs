// Serial port ownership: descriptor validation, opening, bounded reads and
// writes over one exclusively owned transport handle.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use tracing::{debug, info, warn};

use crate::config::{NO_PORTS_LABEL, SessionConfig};
use crate::error::ConnectError;

// ============================================================================
// Types
// ============================================================================

/// Which device to open and how fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    pub baud_rate: u32,
}

impl PortDescriptor {
    /// Validate user input from the port selector and the baud field.
    pub fn parse(port: &str, baud: &str) -> Result<Self, ConnectError> {
        let name = port.trim();
        if name.is_empty() || name == NO_PORTS_LABEL {
            return Err(ConnectError::InvalidPort);
        }

        let baud_rate = match baud.trim().parse::<u32>() {
            Ok(rate) if rate > 0 => rate,
            _ => return Err(ConnectError::InvalidBaud(baud.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            baud_rate,
        })
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.baud_rate)
    }
}

/// Anything a session can read from and write to.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Transport for T {}

/// Opens transports for descriptors.
pub trait PortOpener: Send + Sync {
    fn open(
        &self,
        descriptor: &PortDescriptor,
        read_timeout: Duration,
    ) -> io::Result<Box<dyn Transport>>;
}

/// Opens real devices through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        descriptor: &PortDescriptor,
        read_timeout: Duration,
    ) -> io::Result<Box<dyn Transport>> {
        let port = serialport::new(&descriptor.name, descriptor.baud_rate)
            .timeout(read_timeout)
            .open()?;
        Ok(Box::new(port))
    }
}

// ============================================================================
// Port Session
// ============================================================================

/// One open transport handle.
///
/// The handle lives behind a mutex so the control thread's writes are
/// serialized against the reader thread's reads. Closing never waits for an
/// in-flight read: if the reader holds the handle, it releases it once the
/// read returns.
pub struct PortSession {
    descriptor: PortDescriptor,
    transport: Mutex<Option<Box<dyn Transport>>>,
    open: AtomicBool,
    read_timeout: Duration,
    read_buffer_size: usize,
}

impl PortSession {
    pub fn open(
        descriptor: &PortDescriptor,
        opener: &dyn PortOpener,
        config: &SessionConfig,
    ) -> Result<Self, ConnectError> {
        info!("Opening serial connection to {}", descriptor);

        let transport = opener
            .open(descriptor, config.read_timeout)
            .map_err(|source| ConnectError::Connection {
                port: descriptor.name.clone(),
                source,
            })?;

        Ok(Self::from_transport(descriptor.clone(), transport, config))
    }

    pub fn from_transport(
        descriptor: PortDescriptor,
        transport: Box<dyn Transport>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            descriptor,
            transport: Mutex::new(Some(transport)),
            open: AtomicBool::new(true),
            read_timeout: config.read_timeout,
            read_buffer_size: config.read_buffer_size.max(1),
        }
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    /// Upper bound on one idle read cycle.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Read whatever arrives within the transport's read timeout.
    ///
    /// A timeout is not an error and yields an empty buffer, as does reading
    /// a closed session.
    pub fn read_available(&self) -> io::Result<Vec<u8>> {
        let mut guard = self.lock_transport();
        let Some(transport) = guard.as_mut() else {
            return Ok(Vec::new());
        };

        let mut buf = vec![0u8; self.read_buffer_size];
        let result = transport.read(&mut buf);

        // Closed while this read was in flight.
        if !self.is_open() {
            guard.take();
            debug!("Released {} after in-flight read", self.descriptor.name);
            return Ok(Vec::new());
        }

        match result {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if is_idle(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut guard = self.lock_transport();
        let transport = guard
            .as_mut()
            .filter(|_| self.is_open())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is closed"))?;
        transport.write_all(bytes)?;
        transport.flush()
    }

    /// Mark the session closed and release the handle. Safe to call more than
    /// once. Never blocks: a handle held by an in-flight read is released by
    /// the reader.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);

        let mut guard = match self.transport.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("{} busy reading, handle released by reader", self.descriptor.name);
                return;
            }
        };
        if guard.take().is_some() {
            debug!("Closed {}", self.descriptor.name);
        }
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Box<dyn Transport>>> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PortSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSession")
            .field("descriptor", &self.descriptor)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ============================================================================
// Enumeration
// ============================================================================

/// A port the system reports as present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial ports. Enumeration failures yield an empty list.
pub fn list_ports() -> Vec<PortInfo> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| PortInfo {
                kind: port_kind(&p.port_type).to_string(),
                name: p.port_name,
            })
            .collect(),
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            Vec::new()
        }
    }
}

fn port_kind(port_type: &SerialPortType) -> &'static str {
    match port_type {
        SerialPortType::UsbPort(_) => "usb",
        SerialPortType::PciPort => "pci",
        SerialPortType::BluetoothPort => "bluetooth",
        SerialPortType::Unknown => "unknown",
    }
}

// ============================================================================
// Tests
// ============================================================================
