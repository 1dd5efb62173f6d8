use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::info;

use crate::config::{MAX_LOG_LINES, NO_PORTS_LABEL};
use crate::controller::SessionController;
use crate::error::{ConnectError, SendError};
use crate::event::SessionEvent;
use crate::port::list_ports;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Baud,
    Outgoing,
}

// Application state
pub struct App {
    pub ports: Vec<String>,
    pub selected_port: usize,
    pub baud_input: String,
    pub outgoing: String,
    pub incoming: VecDeque<String>,
    pub line_count: usize,
    pub status: String,
    pub focus: Focus,
    pub should_quit: bool,
}

impl App {
    pub fn new(ports: Vec<String>, preferred_port: Option<&str>, baud: String) -> Self {
        let mut app = Self {
            ports: Vec::new(),
            selected_port: 0,
            baud_input: baud,
            outgoing: String::new(),
            incoming: VecDeque::new(),
            line_count: 0,
            status: "Not connected".to_string(),
            focus: Focus::Outgoing,
            should_quit: false,
        };
        app.set_ports(ports);
        if let Some(port) = preferred_port {
            match app.ports.iter().position(|p| p == port) {
                Some(index) => app.selected_port = index,
                None => {
                    // Not enumerated (e.g. a pty); still let the user pick it.
                    app.ports.insert(0, port.to_string());
                    app.selected_port = 0;
                }
            }
        }
        app
    }

    /// Replace the port list, keeping the current selection if it survives.
    pub fn set_ports(&mut self, ports: Vec<String>) {
        let current = self.ports.get(self.selected_port).cloned();
        self.ports = ports;
        self.selected_port = current
            .and_then(|name| self.ports.iter().position(|p| *p == name))
            .unwrap_or(0);
    }

    pub fn refresh_ports(&mut self) {
        let ports: Vec<String> = list_ports().into_iter().map(|p| p.name).collect();
        info!("Found {} serial ports", ports.len());
        self.set_ports(ports);
    }

    pub fn current_port(&self) -> &str {
        self.ports
            .get(self.selected_port)
            .map(String::as_str)
            .unwrap_or(NO_PORTS_LABEL)
    }

    pub fn select_next_port(&mut self) {
        if !self.ports.is_empty() {
            self.selected_port = (self.selected_port + 1) % self.ports.len();
        }
    }

    pub fn select_previous_port(&mut self) {
        if !self.ports.is_empty() {
            self.selected_port = (self.selected_port + self.ports.len() - 1) % self.ports.len();
        }
    }

    pub fn push_line(&mut self, line: String) {
        self.line_count += 1;
        self.incoming.push_back(line);

        // Keep only the most recent lines
        while self.incoming.len() > MAX_LOG_LINES {
            self.incoming.pop_front();
        }
    }

    pub fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Line(line) => self.push_line(line.to_string()),
            SessionEvent::FatalError { message } => {
                self.status = format!("Read error: {}", message);
            }
        }
    }

    pub fn toggle_connection(&mut self, controller: &SessionController) {
        if controller.is_connected() {
            controller.disconnect();
            self.status = "Disconnected".to_string();
            return;
        }

        match controller.connect(self.current_port(), &self.baud_input) {
            Ok(()) => {
                self.status = match controller.descriptor() {
                    Some(d) => format!("Connected to {}", d),
                    None => "Connected".to_string(),
                };
            }
            Err(e @ (ConnectError::InvalidPort | ConnectError::InvalidBaud(_))) => {
                self.status = format!("Error: {}", e);
            }
            Err(e) => {
                self.status = format!("Connection Error: {}", e);
            }
        }
    }

    pub fn send_outgoing(&mut self, controller: &SessionController) {
        match controller.send(&self.outgoing) {
            Ok(()) => {
                let sent = self.outgoing.trim().chars().count();
                if sent > 0 {
                    self.status = format!("Sent {} chars", sent);
                }
            }
            Err(SendError::NotConnected) => {
                self.status = "Error: Not connected".to_string();
            }
            Err(e) => {
                self.status = format!("Write Error: {}", e);
            }
        }
    }

    pub fn shutdown(&mut self, controller: &SessionController) {
        controller.disconnect();
        self.should_quit = true;
    }

    fn focused_input(&mut self) -> &mut String {
        match self.focus {
            Focus::Baud => &mut self.baud_input,
            Focus::Outgoing => &mut self.outgoing,
        }
    }

    // Handle user input
    pub fn handle_key(&mut self, key: KeyEvent, controller: &SessionController) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => self.shutdown(controller),
            KeyCode::Char('c') if ctrl => self.shutdown(controller),
            KeyCode::Char('o') if ctrl => self.toggle_connection(controller),
            KeyCode::Char('r') if ctrl => self.refresh_ports(),
            KeyCode::F(5) => self.refresh_ports(),
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Baud => Focus::Outgoing,
                    Focus::Outgoing => Focus::Baud,
                };
            }
            KeyCode::Left if !controller.is_connected() => self.select_previous_port(),
            KeyCode::Right if !controller.is_connected() => self.select_next_port(),
            KeyCode::Enter => match self.focus {
                Focus::Baud => self.toggle_connection(controller),
                Focus::Outgoing => self.send_outgoing(controller),
            },
            KeyCode::Backspace => {
                self.focused_input().pop();
            }
            KeyCode::Char(c) if !ctrl => self.focused_input().push(c),
            _ => {}
        }
    }
}
