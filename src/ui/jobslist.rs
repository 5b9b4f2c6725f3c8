use std::cmp::Ordering;

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::gridengine::{JobStateFlag, QueueJob};
use crate::utils::truncate_string;

/// Columns of the jobs table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobColumn {
    Id,
    Name,
    Owner,
    State,
    Tasks,
    Slots,
    Queue,
    Priority,
    Time,
}

impl JobColumn {
    pub const ALL: [JobColumn; 9] = [
        JobColumn::Id,
        JobColumn::Name,
        JobColumn::Owner,
        JobColumn::State,
        JobColumn::Tasks,
        JobColumn::Slots,
        JobColumn::Queue,
        JobColumn::Priority,
        JobColumn::Time,
    ];

    pub fn title(self) -> &'static str {
        match self {
            JobColumn::Id => "Job ID",
            JobColumn::Name => "Name",
            JobColumn::Owner => "Owner",
            JobColumn::State => "State",
            JobColumn::Tasks => "Tasks",
            JobColumn::Slots => "Slots",
            JobColumn::Queue => "Queue",
            JobColumn::Priority => "Priority",
            JobColumn::Time => "Submit/Start",
        }
    }

    fn constraint(self) -> Constraint {
        match self {
            JobColumn::Id => Constraint::Length(10),
            JobColumn::Name => Constraint::Min(15),
            JobColumn::Owner => Constraint::Length(10),
            JobColumn::State => Constraint::Length(6),
            JobColumn::Tasks => Constraint::Length(16),
            JobColumn::Slots => Constraint::Length(6),
            JobColumn::Queue => Constraint::Min(15),
            JobColumn::Priority => Constraint::Length(9),
            JobColumn::Time => Constraint::Length(19),
        }
    }

    fn cell(self, job: &QueueJob) -> String {
        match self {
            JobColumn::Id => job.job_number.to_string(),
            JobColumn::Name => truncate_string(&job.name, 30),
            JobColumn::Owner => job.owner.clone(),
            JobColumn::State => job.state.clone(),
            JobColumn::Tasks => tasks_label(job),
            JobColumn::Slots => job.slots.to_string(),
            JobColumn::Queue => job.queue_name.clone(),
            JobColumn::Priority => format!("{:.5}", job.normalized_priority),
            JobColumn::Time => {
                if job.start_time.is_empty() {
                    job.submission_time.clone()
                } else {
                    job.start_time.clone()
                }
            }
        }
    }

    fn compare(self, a: &QueueJob, b: &QueueJob) -> Ordering {
        match self {
            JobColumn::Id => a.job_number.cmp(&b.job_number),
            JobColumn::Tasks => a.num_tasks().cmp(&b.num_tasks()),
            JobColumn::Slots => a.slots.cmp(&b.slots),
            JobColumn::Priority => a.normalized_priority.total_cmp(&b.normalized_priority),
            _ => self.cell(a).cmp(&self.cell(b)),
        }
    }
}

/// Task count of a row, with the task list when it is an array job
pub fn tasks_label(job: &QueueJob) -> String {
    let n = job.num_tasks();
    if job.tasks.is_empty() {
        n.to_string()
    } else {
        truncate_string(&format!("{} ({})", n, job.tasks), 16)
    }
}

/// Display color of a job, by its most significant state flag
pub fn state_color(job: &QueueJob) -> Color {
    if job.has_state(JobStateFlag::Error) {
        Color::Red
    } else if job.has_state(JobStateFlag::Deletion) {
        Color::DarkGray
    } else if job.has_state(JobStateFlag::Hold) {
        Color::Magenta
    } else if job.has_state(JobStateFlag::Suspended)
        || job.has_state(JobStateFlag::QueueSuspended)
        || job.has_state(JobStateFlag::Threshold)
    {
        Color::Blue
    } else if job.has_state(JobStateFlag::Running) || job.has_state(JobStateFlag::Transferring) {
        Color::Green
    } else if job.has_state(JobStateFlag::Queued) || job.has_state(JobStateFlag::Waiting) {
        Color::Yellow
    } else {
        Color::White
    }
}

/// Struct to manage the jobs list view
pub struct JobsList {
    pub state: TableState,
    pub jobs: Vec<QueueJob>,
    pub sort_column: JobColumn,
    pub sort_ascending: bool,
}

impl Default for JobsList {
    fn default() -> Self {
        Self::new()
    }
}

impl JobsList {
    pub fn new() -> Self {
        Self {
            state: TableState::default(),
            jobs: Vec::new(),
            sort_column: JobColumn::Id,
            sort_ascending: true,
        }
    }

    /// Replace the list of jobs, keeping the selection on the same job if it is still listed
    pub fn update_jobs(&mut self, jobs: Vec<QueueJob>) {
        let selected = self.selected_job().map(|j| (j.job_number, j.tasks.clone()));
        self.jobs = jobs;
        self.sort_jobs();

        let index = selected.and_then(|(number, tasks)| {
            self.jobs
                .iter()
                .position(|j| j.job_number == number && j.tasks == tasks)
        });
        match index {
            Some(i) => self.state.select(Some(i)),
            None if self.jobs.is_empty() => self.state.select(None),
            None => {
                let i = self.state.selected().unwrap_or(0).min(self.jobs.len() - 1);
                self.state.select(Some(i));
            }
        }
    }

    /// Sort jobs based on current sort column and direction
    pub fn sort_jobs(&mut self) {
        let column = self.sort_column;
        let ascending = self.sort_ascending;
        self.jobs.sort_by(|a, b| {
            let ord = column.compare(a, b);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
    }

    /// Sort by a column, toggling the direction if already sorting by it
    pub fn sort_by(&mut self, column: JobColumn) {
        if self.sort_column == column {
            self.sort_ascending = !self.sort_ascending;
        } else {
            self.sort_column = column;
            self.sort_ascending = true;
        }
        self.sort_jobs();
    }

    /// Sort by the next column
    pub fn cycle_sort(&mut self) {
        let i = JobColumn::ALL
            .iter()
            .position(|c| *c == self.sort_column)
            .unwrap_or(0);
        self.sort_by(JobColumn::ALL[(i + 1) % JobColumn::ALL.len()]);
    }

    /// Navigate to next job, returns whether the selection moved
    pub fn next(&mut self) -> bool {
        if self.jobs.is_empty() {
            return false;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.jobs.len() => i + 1,
            Some(_) => 0,
            None => 0,
        };
        let moved = self.state.selected() != Some(i);
        self.state.select(Some(i));
        moved
    }

    /// Navigate to previous job, returns whether the selection moved
    pub fn previous(&mut self) -> bool {
        if self.jobs.is_empty() {
            return false;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.jobs.len() - 1,
            Some(i) => i - 1,
        };
        let moved = self.state.selected() != Some(i);
        self.state.select(Some(i));
        moved
    }

    /// Draw the jobs list widget
    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        if self.jobs.is_empty() {
            let empty = Paragraph::new("No jobs in the queue.")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default().title("Jobs").borders(Borders::ALL));
            frame.render_widget(empty, area);
            return;
        }

        let header_cells = JobColumn::ALL.iter().map(|col| {
            if *col == self.sort_column {
                let indicator = if self.sort_ascending { " ↑" } else { " ↓" };
                Cell::from(format!("{}{}", col.title(), indicator)).style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Cell::from(col.title()).style(
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                )
            }
        });

        let header = Row::new(header_cells)
            .style(Style::default().bg(Color::DarkGray))
            .height(1);

        let rows = self.jobs.iter().map(|job| {
            let cells: Vec<Cell> = JobColumn::ALL
                .iter()
                .map(|col| Cell::from(col.cell(job)))
                .collect();
            Row::new(cells)
                .style(Style::default().fg(state_color(job)))
                .height(1)
        });

        let constraints: Vec<Constraint> = JobColumn::ALL.iter().map(|c| c.constraint()).collect();

        let total_tasks = self.total_tasks();
        let table = Table::new(rows, constraints)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Jobs ({} rows, {} tasks)", self.jobs.len(), total_tasks)),
            )
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol(" > ");

        frame.render_stateful_widget(table, area, &mut self.state);
    }

    /// Tasks across all listed jobs, saturating instead of overflowing
    pub fn total_tasks(&self) -> i64 {
        self.jobs
            .iter()
            .map(QueueJob::num_tasks)
            .fold(0i64, i64::saturating_add)
    }

    /// Get the currently selected job, if any
    pub fn selected_job(&self) -> Option<&QueueJob> {
        self.state.selected().and_then(|i| self.jobs.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(number: i64, name: &str, state: &str, tasks: &str) -> QueueJob {
        QueueJob {
            job_number: number,
            name: name.to_string(),
            state: state.to_string(),
            tasks: tasks.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_keeps_selected_job() {
        let mut list = JobsList::new();
        list.update_jobs(vec![job(3, "c", "r", ""), job(1, "a", "qw", "")]);
        assert_eq!(list.selected_job().map(|j| j.job_number), Some(1));

        list.next();
        assert_eq!(list.selected_job().map(|j| j.job_number), Some(3));

        list.update_jobs(vec![job(2, "b", "qw", ""), job(3, "c", "r", ""), job(1, "a", "r", "")]);
        assert_eq!(list.selected_job().map(|j| j.job_number), Some(3));

        list.update_jobs(Vec::new());
        assert!(list.selected_job().is_none());
    }

    #[test]
    fn test_navigation_wraps() {
        let mut list = JobsList::new();
        list.update_jobs(vec![job(1, "a", "r", ""), job(2, "b", "r", "")]);
        assert!(list.previous());
        assert_eq!(list.state.selected(), Some(1));
        assert!(list.next());
        assert_eq!(list.state.selected(), Some(0));

        let mut single = JobsList::new();
        single.update_jobs(vec![job(1, "a", "r", "")]);
        assert!(!single.next());
    }

    #[test]
    fn test_sort_by_tasks() {
        let mut list = JobsList::new();
        list.update_jobs(vec![
            job(1, "a", "qw", "1-100"),
            job(2, "b", "qw", "garbage"),
            job(3, "c", "qw", "1-10:2"),
        ]);
        list.sort_by(JobColumn::Tasks);
        let order: Vec<i64> = list.jobs.iter().map(|j| j.job_number).collect();
        assert_eq!(order, vec![2, 3, 1]);

        list.sort_by(JobColumn::Tasks);
        let order: Vec<i64> = list.jobs.iter().map(|j| j.job_number).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn test_total_tasks_saturates() {
        let mut list = JobsList::new();
        list.update_jobs(vec![job(1, "a", "qw", "6-8,1-3"), job(2, "b", "r", "")]);
        assert_eq!(list.total_tasks(), 7);

        let huge = format!("1-{}", i64::MAX);
        list.update_jobs(vec![job(1, "a", "qw", &huge), job(2, "b", "qw", &huge)]);
        assert_eq!(list.total_tasks(), i64::MAX);
    }

    #[test]
    fn test_tasks_label() {
        assert_eq!(tasks_label(&job(1, "a", "r", "")), "1");
        assert_eq!(tasks_label(&job(1, "a", "qw", "6-8,1-3")), "6 (6-8,1-3)");
        assert_eq!(tasks_label(&job(1, "a", "qw", "bogus")), "1 (bogus)");
    }

    #[test]
    fn test_state_color() {
        assert_eq!(state_color(&job(1, "a", "Eqw", "")), Color::Red);
        assert_eq!(state_color(&job(1, "a", "r", "")), Color::Green);
        assert_eq!(state_color(&job(1, "a", "hqw", "")), Color::Magenta);
        assert_eq!(state_color(&job(1, "a", "qw", "")), Color::Yellow);
    }
}
