use std::path::PathBuf;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Tabs},
    Frame,
};
use tracing::debug;

use crate::gridengine::{JobInfo, OutputStream};
use crate::utils::fw::{FileContent, FileWatcherError, FileWatcherHandle};

/// Lines of output kept in memory
const MAX_LINES: usize = 1000;

const TRUNCATED_MARKER: &str = "--- File was truncated or rotated ---";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogTab {
    StdOut,
    StdErr,
}

impl LogTab {
    fn stream(self) -> OutputStream {
        match self {
            LogTab::StdOut => OutputStream::Stdout,
            LogTab::StdErr => OutputStream::Stderr,
        }
    }
}

/// Popup following the output files of a job task
pub struct LogView {
    pub visible: bool,
    pub job_number: Option<i64>,
    pub task_id: Option<i64>,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
    pub merged: bool,
    pub current_tab: LogTab,
    pub scroll_position: usize,
    pub log_content: Vec<String>,
    pub auto_scroll: bool,
    pub page_size: usize,
    file_watcher: FileWatcherHandle,
    file_watcher_rx: Receiver<Result<FileContent, FileWatcherError>>,
    pub notification: Option<String>,
    pub truncated: bool,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new()
    }
}

impl LogView {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let file_watcher = FileWatcherHandle::new(sender, Duration::from_millis(500));

        Self {
            visible: false,
            job_number: None,
            task_id: None,
            stdout_path: None,
            stderr_path: None,
            merged: false,
            current_tab: LogTab::StdOut,
            scroll_position: 0,
            log_content: Vec::new(),
            auto_scroll: true,
            page_size: 10,
            file_watcher,
            file_watcher_rx: receiver,
            notification: None,
            truncated: false,
        }
    }

    pub fn show(&mut self, job_number: i64, task_id: Option<i64>, info: &JobInfo) {
        self.visible = true;
        self.change_job(job_number, task_id, info);
    }

    pub fn change_job(&mut self, job_number: i64, task_id: Option<i64>, info: &JobInfo) {
        self.job_number = Some(job_number);
        self.task_id = task_id;
        self.stdout_path = Some(info.output_file(OutputStream::Stdout, task_id));
        self.stderr_path = Some(info.output_file(OutputStream::Stderr, task_id));
        self.merged = info.merge_stderr;
        self.current_tab = LogTab::StdOut;
        self.auto_scroll = true;
        debug!(
            job_number,
            ?task_id,
            stdout = ?self.stdout_path,
            stderr = ?self.stderr_path,
            "following job output"
        );

        self.watch_current_path();
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.file_watcher.set_file_path(None);
    }

    pub fn toggle_tab(&mut self) {
        self.current_tab = match self.current_tab {
            LogTab::StdOut => LogTab::StdErr,
            LogTab::StdErr => LogTab::StdOut,
        };
        self.watch_current_path();
    }

    pub fn scroll_up(&mut self) {
        if self.scroll_position > 0 {
            self.scroll_position -= 1;
            self.auto_scroll = false;
        }
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self.log_content.len().saturating_sub(1);
        if self.scroll_position < max_scroll {
            self.scroll_position += 1;
            if self.scroll_position >= max_scroll {
                self.auto_scroll = true;
            }
        }
    }

    pub fn page_up(&mut self) {
        self.scroll_position = self.scroll_position.saturating_sub(self.page_size);
        self.auto_scroll = false;
    }

    pub fn page_down(&mut self) {
        let max_scroll = self.log_content.len().saturating_sub(1);
        self.scroll_position = (self.scroll_position + self.page_size).min(max_scroll);
        if self.scroll_position >= max_scroll {
            self.auto_scroll = true;
        }
    }

    pub fn toggle_auto_scroll(&mut self) {
        self.auto_scroll = !self.auto_scroll;
        if self.auto_scroll {
            self.scroll_position = self.log_content.len().saturating_sub(1);
        }
    }

    /// Drain content sent by the file watcher
    pub fn check_refresh(&mut self) {
        if !self.visible {
            return;
        }
        while let Ok(result) = self.file_watcher_rx.try_recv() {
            match result {
                Ok(file_content) => {
                    if file_content.is_truncated {
                        self.truncated = true;
                    }
                    push_content(&mut self.log_content, &file_content);
                    self.notification = None;
                    if self.auto_scroll {
                        self.scroll_position = self.log_content.len().saturating_sub(1);
                    }
                }
                Err(e) => {
                    self.notification = Some(format!("Error: {}", e));
                }
            }
        }
    }

    /// Path of the file shown in the current tab
    pub fn current_path(&self) -> Option<&PathBuf> {
        match self.current_tab {
            LogTab::StdOut => self.stdout_path.as_ref(),
            LogTab::StdErr => self.stderr_path.as_ref(),
        }
    }

    fn watch_current_path(&mut self) {
        self.scroll_position = 0;
        self.log_content.clear();
        self.notification = None;
        self.truncated = false;
        let path = self.current_path().cloned();
        self.file_watcher.set_file_path(path);
    }

    pub fn render(&self, f: &mut Frame, area: Rect) {
        if !self.visible {
            return;
        }

        f.render_widget(Clear, area);

        let job = match (self.job_number, self.task_id) {
            (Some(job), Some(task)) => format!("{}.{}", job, task),
            (Some(job), None) => job.to_string(),
            (None, _) => String::new(),
        };
        let auto = if self.auto_scroll { " [FOLLOW]" } else { "" };
        let title = match self.current_tab {
            LogTab::StdOut => format!("Job {} - Standard Output{}", job, auto),
            LogTab::StdErr => format!("Job {} - Standard Error{}", job, auto),
        };

        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::Black));

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(2), // Tabs
                Constraint::Length(1), // File path
                Constraint::Min(1),    // Content
                Constraint::Length(1), // Help text
            ])
            .split(area);

        let tabs = Tabs::new(vec![Line::from("StdOut"), Line::from("StdErr")])
            .select(match self.current_tab {
                LogTab::StdOut => 0,
                LogTab::StdErr => 1,
            })
            .block(Block::default().borders(Borders::BOTTOM))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD));

        f.render_widget(block, area);
        f.render_widget(tabs, chunks[0]);

        let mut path = self
            .current_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        if self.merged && self.current_tab.stream() == OutputStream::Stderr {
            path.push_str(" (merged with stdout)");
        }
        f.render_widget(
            Paragraph::new(path).style(Style::default().fg(Color::DarkGray)),
            chunks[1],
        );

        let content_text = if self.log_content.is_empty() {
            match &self.notification {
                Some(notification) => Text::from(Span::styled(
                    notification.clone(),
                    Style::default().fg(Color::Red),
                )),
                None => Text::from("No output yet, waiting for the file to appear..."),
            }
        } else {
            let mut content = self.log_content.clone();
            if let Some(notification) = &self.notification {
                content.push(format!("--- {} ---", notification));
            }
            let visible =
                get_visible_content(&content, self.scroll_position, chunks[2].height as usize);
            Text::from(visible.join("\n"))
        };

        f.render_widget(Paragraph::new(content_text), chunks[2]);

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let help_text = vec![
            Span::styled("[o] ", bold),
            Span::raw("Toggle Output/Error | "),
            Span::styled("[↑/↓] ", bold),
            Span::raw("Scroll | "),
            Span::styled("[Shift+↑/↓] ", bold),
            Span::raw("Switch job | "),
            Span::styled("[Ctrl+u/Ctrl+d] ", bold),
            Span::raw("Page scroll | "),
            Span::styled("[a] ", bold),
            Span::raw("Toggle auto-scroll | "),
            Span::styled("[Esc/q] ", bold),
            Span::raw("Close"),
        ];

        f.render_widget(Paragraph::new(Line::from(help_text)), chunks[3]);
    }
}

/// Append watcher output to the buffered lines, keeping the newest `MAX_LINES`
fn push_content(log: &mut Vec<String>, file_content: &FileContent) {
    if file_content.is_truncated {
        log.push(TRUNCATED_MARKER.to_string());
    }
    log.extend(file_content.content.lines().map(str::to_string));
    if log.len() > MAX_LINES {
        log.drain(..log.len() - MAX_LINES);
    }
}

/// The window of `content` that fits in `max_height` rows at `scroll_position`
fn get_visible_content(content: &[String], scroll_position: usize, max_height: usize) -> Vec<String> {
    if content.is_empty() {
        return vec![];
    }

    let start_pos = if content.len() <= max_height {
        0
    } else if scroll_position + max_height > content.len() {
        content.len() - max_height
    } else {
        scroll_position
    };

    content[start_pos..].iter().take(max_height).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {}", i)).collect()
    }

    #[test]
    fn test_visible_content_window() {
        let content = lines(10);
        assert_eq!(get_visible_content(&content, 0, 3), lines(3));
        assert_eq!(get_visible_content(&content, 4, 3)[0], "line 4");
        // Scrolling past the end pins the window to the last page
        assert_eq!(get_visible_content(&content, 9, 3)[0], "line 7");
        assert_eq!(get_visible_content(&content, 5, 20), content);
        assert!(get_visible_content(&[], 0, 5).is_empty());
    }

    #[test]
    fn test_push_content_caps_buffer() {
        let mut log = lines(MAX_LINES - 1);
        push_content(
            &mut log,
            &FileContent {
                content: "a\nb\nc\n".to_string(),
                is_truncated: false,
            },
        );
        assert_eq!(log.len(), MAX_LINES);
        assert_eq!(log.last().map(String::as_str), Some("c"));
        assert_eq!(log[0], "line 2");
    }

    #[test]
    fn test_push_content_marks_truncation() {
        let mut log = vec!["old".to_string()];
        push_content(
            &mut log,
            &FileContent {
                content: "new\n".to_string(),
                is_truncated: true,
            },
        );
        assert_eq!(log, vec!["old", TRUNCATED_MARKER, "new"]);
    }
}
