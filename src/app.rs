use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{layout::Rect, Frame};
use regex::Regex;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::{
    config::Cli,
    gridengine::{
        get_detailed_job_info, get_queue_info, ArcoDb, ArcoError, JobInfo, QstatError,
        QstatOptions, QueueJob,
    },
    ui::{
        jobdetail::JobDetail,
        jobslist::JobsList,
        layout::{centered_popup_area, draw_footer, draw_header, draw_main_layout, draw_tabs},
        logview::LogView,
        queues::QueuesView,
    },
    utils::event::{Event as AppEvent, EventConfig, EventHandler},
};

const TAB_TITLES: [&str; 2] = ["Jobs", "Queues"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Jobs,
    Queues,
}

impl Tab {
    fn index(self) -> usize {
        match self {
            Tab::Jobs => 0,
            Tab::Queues => 1,
        }
    }

    fn toggle(self) -> Self {
        match self {
            Tab::Jobs => Tab::Queues,
            Tab::Queues => Tab::Jobs,
        }
    }
}

/// Application state and logic
pub struct App {
    /// Is the application running?
    pub running: bool,
    /// Event handler for user input
    pub event_handler: EventHandler,
    /// Jobs list widget
    pub jobs_list: JobsList,
    /// Queue instances widget
    pub queues_view: QueuesView,
    /// Current qstat options
    pub qstat_options: QstatOptions,
    /// Only jobs whose name matches are listed
    pub name_filter: Option<Regex>,
    /// Tokio runtime for async operations
    pub runtime: Runtime,
    /// ARCo connection, when configured
    pub arco: Option<ArcoDb>,
    /// Last time jobs were refreshed
    pub last_refresh: Instant,
    /// Auto-refresh interval
    pub refresh_interval: Duration,
    /// Status message to display in the header
    pub status_message: String,
    /// Status message display timeout
    pub status_timeout: Option<Instant>,
    /// Active tab
    pub active_tab: Tab,
    /// Job detail popup, when open
    pub job_detail: Option<JobDetail>,
    /// Log view state
    pub log_view: LogView,
}

impl App {
    /// Create a new application instance from the command line
    pub fn new(cli: &Cli) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let mut app = Self {
            running: true,
            event_handler: EventHandler::new(EventConfig::default()),
            jobs_list: JobsList::new(),
            queues_view: QueuesView::default(),
            qstat_options: cli.qstat_options(),
            name_filter: cli.name_filter()?,
            runtime,
            arco: None,
            last_refresh: Instant::now(),
            refresh_interval: cli.refresh_interval(),
            status_message: String::new(),
            status_timeout: None,
            active_tab: Tab::Jobs,
            job_detail: None,
            log_view: LogView::new(),
        };

        if let Some(url) = &cli.arco_url {
            match app.runtime.block_on(ArcoDb::connect(url)) {
                Ok(db) => app.arco = Some(db),
                Err(e) => {
                    warn!("ARCo unavailable: {}", e);
                    app.set_status_message(format!("ARCo unavailable: {}", e), 5);
                }
            }
        }

        Ok(app)
    }

    /// Run the application's main loop
    pub fn run<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut ratatui::Terminal<B>,
    ) -> Result<()> {
        if let Err(e) = self.refresh_jobs() {
            self.set_status_message(format!("Failed to query qstat: {}", e), 5);
        }

        while self.running {
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;
        }

        info!("exiting");
        Ok(())
    }

    /// Refresh jobs and queues from qstat
    pub fn refresh_jobs(&mut self) -> Result<(), QstatError> {
        // Reset first so a failing qstat is not retried on every tick
        self.last_refresh = Instant::now();

        let options = self.qstat_options.clone();
        let info = self.runtime.block_on(get_queue_info(&options))?;

        let mut jobs: Vec<QueueJob> = info.all_jobs().cloned().collect();
        let initial_count = jobs.len();

        let mut filter_stats = None;
        if let Some(re) = &self.name_filter {
            jobs.retain(|job| re.is_match(&job.name));
            let final_count = jobs.len();
            if final_count != initial_count {
                filter_stats = Some(format!(
                    "Filtered: {}/{} ({:.1}%) [name={}]",
                    final_count,
                    initial_count,
                    (final_count as f64 / initial_count as f64) * 100.0,
                    re.as_str()
                ));
            }
        }
        if let Some(message) = filter_stats {
            self.set_status_message(message, 5);
        }

        debug!(jobs = jobs.len(), queues = info.queues.len(), "refreshed");
        self.jobs_list.update_jobs(jobs);
        self.queues_view.update_queues(info.queues);

        Ok(())
    }

    /// Render the application UI
    pub fn render(&mut self, frame: &mut Frame) {
        let areas = draw_main_layout(frame);

        self.render_header(frame, areas.header);
        draw_tabs(frame, areas.tabs, &TAB_TITLES, self.active_tab.index());

        // The jobs list keeps rendering under the log view so that switching
        // jobs with Shift+arrows is visible
        match self.active_tab {
            Tab::Jobs => self.jobs_list.render(frame, areas.content),
            Tab::Queues => self
                .queues_view
                .render(frame, areas.content, self.qstat_options.full),
        }

        draw_footer(frame, areas.footer, self.footer_hints());

        if let Some(detail) = &self.job_detail {
            detail.render(frame, centered_popup_area(frame.area(), 80, 70));
        }

        if self.log_view.visible {
            self.log_view
                .render(frame, centered_popup_area(frame.area(), 80, 80));
        }
    }

    fn footer_hints(&self) -> &'static [(&'static str, &'static str)] {
        if self.log_view.visible {
            &[("o", "Stdout/Stderr"), ("a", "Follow"), ("Esc", "Close")]
        } else if self.job_detail.is_some() {
            &[("↑/↓", "Scroll"), ("Esc/Enter", "Close")]
        } else {
            &[
                ("q", "Quit"),
                ("↑/↓", "Navigate"),
                ("Tab", "Switch view"),
                ("Enter", "Details"),
                ("v", "Output"),
                ("s", "Sort"),
                ("f", "Full"),
                ("r", "Refresh"),
            ]
        }
    }

    /// Render the header with status information
    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let show_status = self
            .status_timeout
            .is_some_and(|timeout| Instant::now() < timeout);

        let status_text = if show_status {
            self.status_message.clone()
        } else {
            self.get_filter_description()
        };

        draw_header(
            frame,
            area,
            &status_text,
            self.last_refresh.elapsed(),
            self.refresh_interval,
        );
    }

    /// Handle application events
    pub fn handle_events(&mut self) -> Result<()> {
        match self.event_handler.rx.recv()? {
            AppEvent::Key(key) if key.kind == KeyEventKind::Press => self.handle_key_event(key),
            AppEvent::Tick => self.handle_tick(),
            AppEvent::Key(_) | AppEvent::Resize(_, _) => {}
        }

        Ok(())
    }

    /// Handle key events
    fn handle_key_event(&mut self, key: KeyEvent) {
        let popup_open = self.job_detail.is_some() || self.log_view.visible;

        match (key.modifiers, key.code) {
            // Close popups, or quit
            (_, KeyCode::Char('q'))
            | (_, KeyCode::Esc)
            | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                if popup_open {
                    self.job_detail = None;
                    self.log_view.hide();
                } else {
                    self.quit();
                }
            }

            // Job detail popup
            (_, KeyCode::Enter) if self.job_detail.is_some() => self.job_detail = None,
            (_, KeyCode::Up) if self.job_detail.is_some() => {
                if let Some(detail) = &mut self.job_detail {
                    detail.scroll_up();
                }
            }
            (_, KeyCode::Down) if self.job_detail.is_some() => {
                if let Some(detail) = &mut self.job_detail {
                    detail.scroll_down();
                }
            }
            _ if self.job_detail.is_some() => {}

            // Log view
            (_, KeyCode::Char('o')) if self.log_view.visible => self.log_view.toggle_tab(),
            (_, KeyCode::Char('a')) if self.log_view.visible => self.log_view.toggle_auto_scroll(),
            (KeyModifiers::CONTROL, KeyCode::Char('u')) if self.log_view.visible => {
                self.log_view.page_up();
            }
            (KeyModifiers::CONTROL, KeyCode::Char('d')) if self.log_view.visible => {
                self.log_view.page_down();
            }
            (_, KeyCode::Up) if self.log_view.visible => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    if self.jobs_list.previous() {
                        self.follow_selected_job();
                    }
                } else {
                    self.log_view.scroll_up();
                }
            }
            (_, KeyCode::Down) if self.log_view.visible => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    if self.jobs_list.next() {
                        self.follow_selected_job();
                    }
                } else {
                    self.log_view.scroll_down();
                }
            }
            _ if self.log_view.visible => {}

            // Main view
            (_, KeyCode::Up) => match self.active_tab {
                Tab::Jobs => {
                    self.jobs_list.previous();
                }
                Tab::Queues => self.queues_view.previous(),
            },
            (_, KeyCode::Down) => match self.active_tab {
                Tab::Jobs => {
                    self.jobs_list.next();
                }
                Tab::Queues => self.queues_view.next(),
            },
            (_, KeyCode::Tab) => self.active_tab = self.active_tab.toggle(),
            (_, KeyCode::Enter) if self.active_tab == Tab::Jobs => self.open_job_detail(),
            (_, KeyCode::Char('v')) if self.active_tab == Tab::Jobs => {
                if self.follow_selected_job() {
                    self.log_view.visible = true;
                }
            }
            (_, KeyCode::Char('s')) => {
                self.jobs_list.cycle_sort();
                let column = self.jobs_list.sort_column.title();
                self.set_status_message(format!("Sorted by {}", column), 2);
            }
            (_, KeyCode::Char('f')) => {
                self.qstat_options.full = !self.qstat_options.full;
                self.refresh_or_report();
            }
            (_, KeyCode::Char('r')) => self.refresh_or_report(),

            _ => {}
        }
    }

    fn refresh_or_report(&mut self) {
        if let Err(e) = self.refresh_jobs() {
            warn!("refresh failed: {}", e);
            self.set_status_message(format!("Failed to refresh: {}", e), 3);
        }
    }

    /// Fetch `qstat -j` information for a job
    fn fetch_job_info(&mut self, job_number: i64) -> Result<JobInfo, QstatError> {
        let pattern = job_number.to_string();
        let detailed = self.runtime.block_on(get_detailed_job_info(&pattern))?;
        detailed
            .jobs
            .into_iter()
            .next()
            .ok_or(QstatError::UnknownJob(pattern))
    }

    /// Point the log view at the selected job, returns whether it succeeded
    fn follow_selected_job(&mut self) -> bool {
        let Some(job) = self.jobs_list.selected_job() else {
            return false;
        };
        let job_number = job.job_number;
        // Running array tasks are listed one per row; pending rows hold a range
        let task_id = job.tasks.parse::<i64>().ok();

        match self.fetch_job_info(job_number) {
            Ok(info) => {
                self.log_view.change_job(job_number, task_id, &info);
                true
            }
            Err(e) => {
                self.set_status_message(format!("Cannot locate output of {}: {}", job_number, e), 3);
                false
            }
        }
    }

    fn open_job_detail(&mut self) {
        let Some(job) = self.jobs_list.selected_job() else {
            return;
        };
        let job_number = job.job_number;
        let task_number = match job.tasks.parse::<i64>() {
            Ok(task) => task,
            Err(_) if job.tasks.is_empty() => 0,
            // Summary entries of array jobs
            Err(_) => -1,
        };

        let mut detail = JobDetail::new(job_number);
        match self.fetch_job_info(job_number) {
            Ok(info) => detail.info = Some(info),
            Err(QstatError::UnknownJob(_)) => {
                detail.error = Some(format!("Job {} is no longer known to qstat", job_number));
            }
            Err(e) => detail.error = Some(e.to_string()),
        }

        if let Some(arco) = &self.arco {
            let finished = detail.info.is_none();
            let result = self.runtime.block_on(async {
                let summary = if finished {
                    arco.query_job(job_number).await?
                } else {
                    None
                };
                let accounting = arco.query_accounting(job_number).await?;
                let events = arco.query_logs(job_number, task_number).await?;
                Ok::<_, ArcoError>((summary, accounting, events))
            });
            match result {
                Ok((summary, accounting, events)) => {
                    if summary.is_some() {
                        detail.error = None;
                    }
                    detail.summary = summary;
                    detail.accounting = accounting;
                    detail.events = events;
                }
                Err(e) => {
                    warn!(job_number, "ARCo query failed: {}", e);
                    self.set_status_message(format!("ARCo query failed: {}", e), 3);
                }
            }
        }

        self.job_detail = Some(detail);
    }

    /// Handle tick events (called periodically)
    fn handle_tick(&mut self) {
        if self.job_detail.is_none() && self.last_refresh.elapsed() >= self.refresh_interval {
            if let Err(e) = self.refresh_jobs() {
                warn!("auto-refresh failed: {}", e);
                self.set_status_message(format!("Auto-refresh failed: {}", e), 3);
            }
        }

        if self.log_view.visible {
            self.log_view.check_refresh();
        }
    }

    /// Set a temporary status message
    pub fn set_status_message(&mut self, message: String, duration_secs: u64) {
        self.status_message = message;
        self.status_timeout = Some(Instant::now() + Duration::from_secs(duration_secs));
    }

    /// Get a human-readable description of the current filters
    fn get_filter_description(&self) -> String {
        let mut parts = vec![format!("user={}", self.qstat_options.user_pattern())];
        if self.qstat_options.full {
            parts.push("full".to_string());
        }
        if let Some(re) = &self.name_filter {
            parts.push(format!("name_regex={}", re.as_str()));
        }
        if self.arco.is_some() {
            parts.push("arco".to_string());
        }
        parts.join(", ")
    }

    /// Set running to false to quit the application
    pub fn quit(&mut self) {
        self.running = false;
    }
}
