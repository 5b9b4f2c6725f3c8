use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::gridengine::{Accounting, ArcoJob, JobInfo, JobLog};
use crate::utils::{format_duration, format_memory};

/// Detail popup for one job, filled from `qstat -j` and ARCo
pub struct JobDetail {
    pub job_number: i64,
    pub info: Option<JobInfo>,
    /// ARCo record, used when qstat no longer knows the job
    pub summary: Option<ArcoJob>,
    pub accounting: Vec<Accounting>,
    pub events: Vec<JobLog>,
    pub error: Option<String>,
    pub scroll: u16,
}

impl JobDetail {
    pub fn new(job_number: i64) -> Self {
        Self {
            job_number,
            info: None,
            summary: None,
            accounting: Vec::new(),
            events: Vec::new(),
            error: None,
            scroll: 0,
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_add(1);
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        frame.render_widget(Clear, area);

        let mut lines = Vec::new();
        if let Some(error) = &self.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        match &self.info {
            Some(info) => lines.extend(info_lines(info)),
            None => match &self.summary {
                Some(summary) => lines.extend(summary_lines(summary)),
                None if self.error.is_none() => lines.push(Line::from("Loading job details...")),
                None => {}
            },
        }
        if !self.accounting.is_empty() {
            lines.push(Line::from(""));
            lines.extend(accounting_lines(&self.accounting));
        }
        if !self.events.is_empty() {
            lines.push(Line::from(""));
            lines.extend(event_lines(&self.events));
        }

        let detail = Paragraph::new(Text::from(lines))
            .block(
                Block::default()
                    .title(format!("Job Details: {}", self.job_number))
                    .borders(Borders::ALL),
            )
            .wrap(Wrap { trim: false })
            .scroll((self.scroll, 0));

        frame.render_widget(detail, area);
    }
}

fn field<'a>(name: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(
            format!("{:<14}", name),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

/// Lines describing a job
pub fn info_lines(info: &JobInfo) -> Vec<Line<'static>> {
    let mut lines = vec![
        field("Name", info.job_name.clone()),
        field("Owner", format!("{} ({})", info.owner, info.group)),
        field("Project", info.project.clone()),
        field("Account", info.account.clone()),
        field(
            "Submitted",
            info.submitted_at()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        ),
        field("Command", info.command()),
        field("Cwd", info.cwd.clone()),
        field("Priority", info.priority.to_string()),
    ];

    if info.job_array.is_single() {
        lines.push(field("Tasks", "1".to_string()));
    } else {
        lines.push(field(
            "Tasks",
            format!("{} ({})", info.num_tasks(), info.job_array),
        ));
    }

    let resources = info
        .hard_resource_requests()
        .iter()
        .map(|r| format!("{}={}", r.name, r.string_val))
        .collect::<Vec<_>>()
        .join(",");
    if !resources.is_empty() {
        lines.push(field("Resources", resources));
    }

    for p in info.stdout_paths() {
        lines.push(field("Stdout", p.path));
    }
    if info.merge_stderr {
        lines.push(field("Stderr", "merged with stdout".to_string()));
    } else {
        for p in info.stderr_paths() {
            lines.push(field("Stderr", p.path));
        }
    }

    if !info.mail_list.is_empty() {
        let mail = info
            .mail_list
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(field("Mail", mail));
    }
    if !info.jid_request_list.is_empty() {
        lines.push(field("Waits for", info.jid_request_list.join(", ")));
    }
    if !info.jid_successor_list.is_empty() {
        let successors = info
            .jid_successor_list
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(field("Successors", successors));
    }

    lines
}

/// Lines describing a finished job from its ARCo record
pub fn summary_lines(job: &ArcoJob) -> Vec<Line<'static>> {
    vec![
        field("Name", job.job_name.clone()),
        field("Owner", format!("{} ({})", job.owner, job.group)),
        field("Project", job.project.clone()),
        field("Department", job.department.clone()),
        field("Account", job.account.clone()),
        field(
            "Submitted",
            job.submission_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        field("Priority", job.priority.to_string()),
        field("State", "finished".to_string()),
    ]
}

/// Job log events, oldest first
pub fn event_lines(events: &[JobLog]) -> Vec<Line<'static>> {
    events
        .iter()
        .map(|e| {
            let mut text = format!(
                "{} {:<10} {:<10} {}",
                e.time.format("%Y-%m-%d %H:%M:%S"),
                e.event,
                e.state,
                e.host
            );
            if !e.message.is_empty() {
                text.push_str(&format!(" ({})", e.message));
            }
            Line::from(text)
        })
        .collect()
}

/// Lines summarising the accounting records of a job, one per task
pub fn accounting_lines(records: &[Accounting]) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!(
            "{:>6} {:<19} {:>10} {:>10} {:>8} {:>5}",
            "Task", "Start", "Wallclock", "CPU", "MaxVMem", "Exit"
        ),
        Style::default().add_modifier(Modifier::BOLD),
    ))];

    for a in records {
        let color = if a.exit_status == 0 {
            Color::Green
        } else {
            Color::Red
        };
        lines.push(Line::from(Span::styled(
            format!(
                "{:>6} {:<19} {:>10} {:>10} {:>8} {:>5}",
                a.task_number,
                a.start_time.format("%Y-%m-%d %H:%M:%S"),
                format_duration(a.wallclock_time.max(0) as u64),
                format_duration(a.cpu.max(0.0) as u64),
                format_memory(a.maxvmem / (1024.0 * 1024.0)),
                a.exit_status
            ),
            Style::default().fg(color),
        )));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridengine::TaskRange;
    use chrono::NaiveDate;

    fn text(lines: &[Line]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_info_lines_show_array_tasks() {
        let info = JobInfo {
            job_name: "render".to_string(),
            job_array: TaskRange::new(1, 10, 3).unwrap(),
            merge_stderr: true,
            ..Default::default()
        };
        let lines = text(&info_lines(&info));
        assert!(lines.iter().any(|l| l.starts_with("Tasks") && l.ends_with("4 (1-10:3)")));
        assert!(lines.iter().any(|l| l.ends_with("merged with stdout")));
    }

    #[test]
    fn test_info_lines_single_task() {
        let lines = text(&info_lines(&JobInfo::default()));
        assert!(lines.iter().any(|l| l.starts_with("Tasks") && l.ends_with(" 1")));
        assert!(!lines.iter().any(|l| l.starts_with("Resources")));
    }

    #[test]
    fn test_event_lines() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap();
        let event = JobLog {
            job_number: 42,
            task_number: 1,
            pe_task_id: String::new(),
            job_name: "render".to_string(),
            user: "alice".to_string(),
            account: String::new(),
            project: String::new(),
            department: String::new(),
            time,
            event: "finished".to_string(),
            state: "r".to_string(),
            initiator: "execd".to_string(),
            host: "node01".to_string(),
            message: "exit 0".to_string(),
        };
        let lines = text(&event_lines(&[event]));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("2024-03-01 12:30:00 finished"));
        assert!(lines[0].ends_with("node01 (exit 0)"));
    }
}
