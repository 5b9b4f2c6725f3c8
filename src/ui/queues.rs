use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::gridengine::Queue;

/// Queue instances from the full (`-f`) qstat listing
#[derive(Default)]
pub struct QueuesView {
    pub state: TableState,
    pub queues: Vec<Queue>,
}

impl QueuesView {
    pub fn update_queues(&mut self, queues: Vec<Queue>) {
        self.queues = queues;
        match self.state.selected() {
            _ if self.queues.is_empty() => self.state.select(None),
            Some(i) if i >= self.queues.len() => self.state.select(Some(self.queues.len() - 1)),
            None => self.state.select(Some(0)),
            Some(_) => {}
        }
    }

    pub fn next(&mut self) {
        if self.queues.is_empty() {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + 1) % self.queues.len());
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.queues.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.queues.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect, full: bool) {
        if self.queues.is_empty() {
            let message = if full {
                "No queue instances reported."
            } else {
                "Queue instances are only listed in full mode. Press 'f' to switch."
            };
            let empty = Paragraph::new(message)
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default().title("Queues").borders(Borders::ALL));
            frame.render_widget(empty, area);
            return;
        }

        let header = Row::new(
            ["Queue", "Type", "Used", "Resv", "Total", "Free", "Load", "Arch", "State", "Jobs"]
                .into_iter()
                .map(|h| Cell::from(h).style(Style::default().add_modifier(Modifier::BOLD))),
        )
        .style(Style::default().bg(Color::DarkGray));

        let rows = self.queues.iter().map(|q| {
            let color = if !q.state.is_empty() {
                Color::Red
            } else if q.slots_free() == 0 {
                Color::Yellow
            } else {
                Color::Green
            };
            Row::new(vec![
                Cell::from(q.name.clone()),
                Cell::from(q.qtype.clone()),
                Cell::from(q.slots_used.to_string()),
                Cell::from(q.slots_reserved.to_string()),
                Cell::from(q.slots_total.to_string()),
                Cell::from(q.slots_free().to_string()),
                Cell::from(q.load_avg.map_or_else(|| "-".to_string(), |l| format!("{:.2}", l))),
                Cell::from(q.arch.clone()),
                Cell::from(q.state.clone()),
                Cell::from(q.jobs.len().to_string()),
            ])
            .style(Style::default().fg(color))
        });

        let constraints = [
            Constraint::Min(20),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Length(5),
            Constraint::Length(6),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(5),
        ];

        let table = Table::new(rows, constraints)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Queues ({})", self.queues.len())),
            )
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol(" > ");

        frame.render_stateful_widget(table, area, &mut self.state);
    }
}
