use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_LOG_FILE: &str = "serial_term.log";

/// Shown in the port selector when enumeration finds nothing.
pub const NO_PORTS_LABEL: &str = "(no ports)";

/// Incoming lines kept in the TUI before the oldest are dropped.
pub const MAX_LOG_LINES: usize = 1000;

/// Timing knobs for one serial session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on a single blocking read. Also bounds how long the
    /// reader takes to notice a stop request.
    pub read_timeout: Duration,
    /// How long `disconnect` waits for the reader thread to exit.
    pub stop_grace: Duration,
    /// Bytes requested per read.
    pub read_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            stop_grace: Duration::from_millis(100),
            read_buffer_size: 1024,
        }
    }
}

/// Interactive terminal for newline-delimited serial links
#[derive(Debug, Parser)]
#[command(name = "serial-term", version)]
pub struct Cli {
    /// Serial port to preselect (or connect to with --headless)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Initial baud rate
    #[arg(short, long, default_value = "9600")]
    pub baudrate: String,

    /// File that receives tracing output
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Print available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Run without the TUI: echo incoming lines to stdout, send stdin lines
    #[arg(long, requires = "port")]
    pub headless: bool,

    /// Emit JSON (with --list-ports or --headless)
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.stop_grace, Duration::from_millis(100));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["serial-term"]);
        assert_eq!(cli.port, None);
        assert_eq!(cli.baudrate, "9600");
        assert_eq!(cli.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        assert!(!cli.headless);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["serial-term", "-p", "/dev/ttyACM0", "-b", "115200"]);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.baudrate, "115200");
    }

    #[test]
    fn test_headless_requires_port() {
        assert!(Cli::try_parse_from(["serial-term", "--headless"]).is_err());
        assert!(Cli::try_parse_from(["serial-term", "--headless", "-p", "COM3"]).is_ok());
    }
}
