use std::io;
use std::rc::Rc;

use anyhow::Result;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use crate::app::{App, Focus};
use crate::controller::SessionState;

// Render the TUI
pub fn render_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &App,
    state: SessionState,
) -> Result<()> {
    terminal.draw(|f| draw(f, app, state))?;
    Ok(())
}

fn draw(f: &mut Frame, app: &App, state: SessionState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Port bar
            Constraint::Min(0),    // Incoming
            Constraint::Length(3), // Outgoing
            Constraint::Length(3), // Status
        ])
        .split(f.area());

    draw_port_bar(f, app, state, chunks[0]);

    // Incoming
    let visible = chunks[1].height.saturating_sub(2) as usize;
    let lines: Vec<ListItem> = app
        .incoming
        .iter()
        .skip(app.incoming.len().saturating_sub(visible))
        .map(|l| ListItem::new(l.as_str()))
        .collect();
    let incoming = List::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Read (incoming)"),
    );
    f.render_widget(incoming, chunks[1]);

    // Outgoing
    let outgoing = Paragraph::new(app.outgoing.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Write (outgoing)")
            .border_style(focus_style(app.focus == Focus::Outgoing)),
    );
    f.render_widget(outgoing, chunks[2]);

    // Status bar
    let status_lines = vec![
        Line::from(app.status.as_str()),
        Line::from(vec![
            Span::raw("Keys: "),
            Span::styled("[Ctrl-O]", Style::default().fg(Color::Yellow)),
            Span::raw(" Connect/Disconnect | "),
            Span::styled("[\u{2190}/\u{2192}]", Style::default().fg(Color::Yellow)),
            Span::raw(" Port | "),
            Span::styled("[F5]", Style::default().fg(Color::Yellow)),
            Span::raw(" Refresh | "),
            Span::styled("[Tab]", Style::default().fg(Color::Yellow)),
            Span::raw(" Focus | "),
            Span::styled("[Enter]", Style::default().fg(Color::Yellow)),
            Span::raw(" Send | "),
            Span::styled("[Esc]", Style::default().fg(Color::Yellow)),
            Span::raw(" Quit"),
        ]),
    ];
    let status = Paragraph::new(status_lines).block(Block::default().borders(Borders::TOP));
    f.render_widget(status, chunks[3]);

    // Cursor in the focused field
    let (area, text) = match app.focus {
        Focus::Outgoing => (chunks[2], app.outgoing.as_str()),
        Focus::Baud => (port_bar_columns(chunks[0])[1], app.baud_input.as_str()),
    };
    let x = area
        .x
        .saturating_add(1)
        .saturating_add(text.chars().count().min(u16::MAX as usize) as u16);
    f.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
}

fn draw_port_bar(f: &mut Frame, app: &App, state: SessionState, area: Rect) {
    let (state_label, state_style) = match state {
        SessionState::Connected => (
            " CONNECTED ",
            Style::default()
                .fg(Color::White)
                .bg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        SessionState::Connecting => (" CONNECTING ", Style::default().fg(Color::Yellow)),
        SessionState::Disconnected => (" DISCONNECTED ", Style::default().fg(Color::DarkGray)),
    };

    let columns = port_bar_columns(area);

    let port = Paragraph::new(Line::from(vec![
        Span::raw("Port: "),
        Span::styled(
            app.current_port(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(port, columns[0]);

    let baud = Paragraph::new(app.baud_input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Baud")
            .border_style(focus_style(app.focus == Focus::Baud)),
    );
    f.render_widget(baud, columns[1]);

    let badge = Paragraph::new(Span::styled(state_label, state_style))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(badge, columns[2]);
}

fn port_bar_columns(area: Rect) -> Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(20),
            Constraint::Length(12),
            Constraint::Length(16),
        ])
        .split(area)
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}
