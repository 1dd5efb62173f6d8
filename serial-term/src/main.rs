use anyhow::{Context, Result, bail};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serial_term::app::App;
use serial_term::config::Cli;
use serial_term::port::list_ports;
use serial_term::ui::render_ui;
use serial_term::{SessionController, SessionEvent};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; the TUI owns stdout
    let log_file = std::fs::File::create(&cli.log_file)
        .with_context(|| format!("Failed to create log file {}", cli.log_file.display()))?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting serial-term");

    if cli.list_ports {
        return print_ports(cli.json);
    }

    if cli.headless {
        return run_headless(&cli).await;
    }

    let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();
    let controller = SessionController::new(Arc::new(tx));

    let ports = list_ports().into_iter().map(|p| p.name).collect();
    let mut app = App::new(ports, cli.port.as_deref(), cli.baudrate.clone());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let result = run_app(&mut terminal, &mut app, &controller, rx);

    controller.disconnect();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        error!("serial-term exited with error: {:#}", e);
    }
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    controller: &SessionController,
    mut events: UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    loop {
        // Drain reader events onto the UI thread
        while let Ok(event) = events.try_recv() {
            app.apply_event(event);
        }

        render_ui(terminal, app, controller.state())?;

        // Handle input (non-blocking with timeout)
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key, controller);
                }

                if app.should_quit {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_ports(json: bool) -> Result<()> {
    let ports = list_ports();
    let mut out = io::stdout().lock();

    if json {
        serde_json::to_writer_pretty(&mut out, &ports).context("Failed to serialize ports")?;
        writeln!(out)?;
    } else if ports.is_empty() {
        writeln!(out, "No serial ports found")?;
    } else {
        for port in &ports {
            writeln!(out, "{}\t{}", port.name, port.kind)?;
        }
    }

    Ok(())
}

/// Line-oriented mode: incoming lines to stdout, stdin lines to the port.
async fn run_headless(cli: &Cli) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
    let controller = SessionController::new(Arc::new(tx));

    let port = cli.port.as_deref().unwrap_or_default();
    controller
        .connect(port, &cli.baudrate)
        .context("Connection Error")?;
    if let Some(descriptor) = controller.descriptor() {
        eprintln!("Connected to {}", descriptor);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SessionEvent::Line(line)) => {
                    if cli.json {
                        println!("{}", serde_json::to_string(&SessionEvent::Line(line))?);
                    } else {
                        println!("{}", line);
                    }
                }
                Some(SessionEvent::FatalError { message }) => {
                    bail!("Read error: {}", message);
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(text) => {
                    if let Err(e) = controller.send(&text) {
                        eprintln!("Write Error: {}", e);
                    }
                }
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.disconnect();
    eprintln!("Disconnected");
    Ok(())
}
