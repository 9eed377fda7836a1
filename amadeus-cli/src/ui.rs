use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};

use crate::controls::{SlotRow, StatusSnapshot};

pub fn draw_monitor(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    status: &StatusSnapshot,
    rows: &[SlotRow],
    log_lines: &[String],
) {
    let _ = terminal.draw(|f| {
        let slots_height = (rows.len().max(1) as u16).saturating_add(2).min(14);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Length(4),
                Constraint::Length(slots_height),
                Constraint::Min(0),
            ])
            .split(f.size());

        let title = Paragraph::new("Amadeus slot monitor").style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
        f.render_widget(title, chunks[0]);

        let controls = Paragraph::new("space=pause/resume ticking  q=quit")
            .style(Style::default().fg(Color::Blue))
            .block(Block::default().borders(Borders::ALL).title("Controls"));
        f.render_widget(controls, chunks[1]);

        let status_widget = Paragraph::new(status.text.as_str())
            .style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .block(Block::default().borders(Borders::ALL).title("Registry"));
        f.render_widget(status_widget, chunks[2]);

        let slot_text = if rows.is_empty() {
            "All slots empty.".to_string()
        } else {
            rows.iter()
                .map(|row| row.to_string())
                .collect::<Vec<_>>()
                .join("\n")
        };
        let slots_widget = Paragraph::new(slot_text)
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title("Slots"));
        f.render_widget(slots_widget, chunks[3]);

        let log_height = chunks[4].height.saturating_sub(2) as usize;
        let start = log_lines.len().saturating_sub(log_height);
        let log_text = if log_lines.is_empty() {
            "No logs yet.".to_string()
        } else {
            log_lines[start..].join("\n")
        };

        let log_widget = Paragraph::new(log_text)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title("Logs"));
        f.render_widget(log_widget, chunks[4]);
    });
}
