//! Interactive terminal for newline-delimited serial links.
//!
//! The core is small: [`LineFramer`] splits the byte stream into lines,
//! [`PortSession`] owns the open device, [`ReaderLoop`] runs the background
//! read and [`SessionController`] ties their lifecycles together. The TUI in
//! [`app`] and [`ui`] only talks to the controller and to the
//! [`SessionEvents`] it receives.

pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod framer;
pub mod port;
pub mod reader;
pub mod ui;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionState};
pub use error::{ConnectError, SendError};
pub use event::{LineEvent, SessionEvent, SessionEvents};
pub use framer::LineFramer;
pub use port::{PortDescriptor, PortInfo, PortOpener, PortSession, SystemPortOpener, Transport};
pub use reader::{ReaderLoop, RunState};
