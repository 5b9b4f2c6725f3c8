use std::time::Duration;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

/// Areas of the main screen
pub struct MainAreas {
    pub header: Rect,
    pub tabs: Rect,
    pub content: Rect,
    pub footer: Rect,
}

/// Defines the main layout of the application
pub fn draw_main_layout(frame: &Frame) -> MainAreas {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header area
            Constraint::Length(3), // Tabs
            Constraint::Min(10),   // Main content area
            Constraint::Length(3), // Footer area
        ])
        .split(frame.area());

    MainAreas {
        header: chunks[0],
        tabs: chunks[1],
        content: chunks[2],
        footer: chunks[3],
    }
}

/// Draws the application header with a status line and the refresh countdown
pub fn draw_header(
    frame: &mut Frame,
    area: Rect,
    status: &str,
    since_refresh: Duration,
    refresh_interval: Duration,
) {
    let next_refresh = refresh_interval.saturating_sub(since_refresh).as_secs();
    let header = Paragraph::new(Text::from(vec![Line::from(vec![
        Span::styled("GRIDVIEW", Style::default().fg(Color::Cyan).bold()),
        Span::raw(" - "),
        Span::styled(status.to_string(), Style::default().fg(Color::White)),
        Span::raw(" | "),
        Span::styled(
            format!("refresh in {}s", next_refresh),
            Style::default().fg(Color::DarkGray),
        ),
    ])]))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(header, area);
}

/// Draws tabs for different views
pub fn draw_tabs(frame: &mut Frame, area: Rect, titles: &[&str], active_tab: usize) {
    let tab_titles: Vec<Line> = titles
        .iter()
        .map(|t| Line::from(Span::styled(*t, Style::default().fg(Color::White))))
        .collect();

    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL))
        .select(active_tab)
        .highlight_style(Style::default().fg(Color::Cyan).bold());

    frame.render_widget(tabs, area);
}

/// Draws the application footer with key hints
pub fn draw_footer(frame: &mut Frame, area: Rect, hints: &[(&str, &str)]) {
    let mut footer_text = Vec::with_capacity(hints.len() * 2);
    for (i, (key, action)) in hints.iter().enumerate() {
        footer_text.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
        let separator = if i + 1 < hints.len() { " | " } else { "" };
        footer_text.push(Span::raw(format!(": {}{}", action, separator)));
    }

    let footer =
        Paragraph::new(Line::from(footer_text)).block(Block::default().borders(Borders::ALL));

    frame.render_widget(footer, area);
}

/// Creates a popup area in the center of the screen
pub fn centered_popup_area(frame_size: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(frame_size);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
