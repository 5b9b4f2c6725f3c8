//! Job and queue status from `qstat -xml`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_process::Output;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::error::QstatError;
use super::taskrange::{self, TaskRange};
use crate::utils::command::{execute_command, stderr_text};
use crate::utils::get_username;

/// Total number of tasks in a task list string as reported by qstat.
///
/// Unparseable task lists are counted as a single non-array task.
pub fn total_tasks(expr: &str) -> i64 {
    match taskrange::count_tasks(expr) {
        Ok(n) => n,
        Err(e) => {
            debug!(tasks = expr, error = %e, "treating unparseable task list as a single task");
            1
        }
    }
}

/// A single letter of a qstat job state string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStateFlag {
    Deletion,
    Error,
    Hold,
    Running,
    Restarted,
    Suspended,
    QueueSuspended,
    Transferring,
    Threshold,
    Waiting,
    Queued,
}

impl JobStateFlag {
    pub const ALL: [JobStateFlag; 11] = [
        JobStateFlag::Deletion,
        JobStateFlag::Error,
        JobStateFlag::Hold,
        JobStateFlag::Running,
        JobStateFlag::Restarted,
        JobStateFlag::Suspended,
        JobStateFlag::QueueSuspended,
        JobStateFlag::Transferring,
        JobStateFlag::Threshold,
        JobStateFlag::Waiting,
        JobStateFlag::Queued,
    ];

    /// The letter qstat uses for this state
    pub fn letter(self) -> char {
        match self {
            JobStateFlag::Deletion => 'd',
            JobStateFlag::Error => 'E',
            JobStateFlag::Hold => 'h',
            JobStateFlag::Running => 'r',
            JobStateFlag::Restarted => 'R',
            JobStateFlag::Suspended => 's',
            JobStateFlag::QueueSuspended => 'S',
            JobStateFlag::Transferring => 't',
            JobStateFlag::Threshold => 'T',
            JobStateFlag::Waiting => 'w',
            JobStateFlag::Queued => 'q',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.letter() == c)
    }
}

impl fmt::Display for JobStateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStateFlag::Deletion => "deletion",
            JobStateFlag::Error => "error",
            JobStateFlag::Hold => "hold",
            JobStateFlag::Running => "running",
            JobStateFlag::Restarted => "restarted",
            JobStateFlag::Suspended => "suspended",
            JobStateFlag::QueueSuspended => "queue suspended",
            JobStateFlag::Transferring => "transferring",
            JobStateFlag::Threshold => "threshold",
            JobStateFlag::Waiting => "waiting",
            JobStateFlag::Queued => "queued",
        };
        write!(f, "{}", name)
    }
}

/// One job in the queue overview
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueueJob {
    /// Unique job number
    #[serde(rename = "JB_job_number")]
    pub job_number: i64,
    /// POSIX priority
    #[serde(rename = "JB_priority")]
    pub posix_priority: i64,
    /// Relative importance due to static urgency, between 0.0 and 1.0
    #[serde(rename = "JB_nurg")]
    pub normalized_urgency: f64,
    /// Priority derived from weighted normalized tickets and static urgency
    #[serde(rename = "JAT_prio")]
    pub normalized_priority: f64,
    /// Relative importance due to tickets, between 0.0 and 1.0
    #[serde(rename = "JAT_ntix")]
    pub normalized_tickets: f64,
    /// Combined contribution to static urgency from all resources
    #[serde(rename = "JB_rrcontr")]
    pub resource_contribution: f64,
    /// Contribution to static urgency from the job deadline
    #[serde(rename = "JB_dlcontr")]
    pub deadline_contribution: f64,
    /// Contribution to static urgency from waiting time
    #[serde(rename = "JB_wtcontr")]
    pub wait_time_contribution: f64,
    #[serde(rename = "JB_name")]
    pub name: String,
    #[serde(rename = "JB_owner")]
    pub owner: String,
    #[serde(rename = "JB_project")]
    pub project: String,
    #[serde(rename = "JB_department")]
    pub department: String,
    /// State letters, see [`JobStateFlag`]
    pub state: String,
    #[serde(rename = "JAT_start_time")]
    pub start_time: String,
    #[serde(rename = "JB_submission_time")]
    pub submission_time: String,
    /// CPU usage in seconds
    pub cpu_usage: f64,
    /// Memory usage in MB * seconds
    pub mem_usage: f64,
    /// IO usage in MB
    pub io_usage: f64,
    pub tickets: i64,
    #[serde(rename = "otickets")]
    pub override_tickets: i64,
    #[serde(rename = "ftickets")]
    pub fairshare_tickets: i64,
    #[serde(rename = "stickets")]
    pub share_tree_tickets: i64,
    /// Queue instance the job is executing in, empty while pending
    pub queue_name: String,
    pub slots: i64,
    /// Task list of an array job, empty for a single job
    pub tasks: String,
}

impl QueueJob {
    /// Number of tasks this row stands for
    pub fn num_tasks(&self) -> i64 {
        total_tasks(&self.tasks)
    }

    pub fn has_state(&self, flag: JobStateFlag) -> bool {
        self.state.contains(flag.letter())
    }

    /// All state flags present in the state string
    pub fn states(&self) -> Vec<JobStateFlag> {
        JobStateFlag::ALL
            .into_iter()
            .filter(|flag| self.has_state(*flag))
            .collect()
    }

    pub fn started_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.start_time)
    }

    pub fn submitted_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.submission_time)
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    s.parse::<NaiveDateTime>().ok()
}

/// A cluster queue instance from `qstat -f`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Queue {
    pub name: String,
    #[serde(rename = "qtype")]
    pub qtype: String,
    pub slots_used: i64,
    #[serde(rename = "slots_resv")]
    pub slots_reserved: i64,
    pub slots_total: i64,
    pub load_avg: Option<f64>,
    pub arch: String,
    /// Queue state letters, empty when the queue is healthy
    pub state: String,
    #[serde(rename = "job_list")]
    pub jobs: Vec<QueueJob>,
}

impl Queue {
    pub fn slots_free(&self) -> i64 {
        (self.slots_total - self.slots_used - self.slots_reserved).max(0)
    }
}

/// Overview of the queue, as returned by `qstat -pri -ext -urg`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawQueueInfo")]
pub struct QueueInfo {
    /// Jobs currently assigned to queues, e.g. executing
    pub queued_jobs: Vec<QueueJob>,
    /// Jobs that are not yet executing in any queue
    pub pending_jobs: Vec<QueueJob>,
    /// Queue instances, only present with `-f`
    pub queues: Vec<Queue>,
}

impl QueueInfo {
    /// Every job in the overview, including the ones listed under queues
    pub fn all_jobs(&self) -> impl Iterator<Item = &QueueJob> {
        self.queued_jobs
            .iter()
            .chain(self.queues.iter().flat_map(|q| q.jobs.iter()))
            .chain(self.pending_jobs.iter())
    }
}

#[derive(Deserialize)]
struct RawQueueInfo {
    #[serde(default)]
    queue_info: RawQueueSection,
    #[serde(default)]
    job_info: RawJobSection,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawQueueSection {
    job_list: Vec<QueueJob>,
    #[serde(rename = "Queue-List")]
    queues: Vec<Queue>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawJobSection {
    job_list: Vec<QueueJob>,
}

impl From<RawQueueInfo> for QueueInfo {
    fn from(raw: RawQueueInfo) -> Self {
        Self {
            queued_jobs: raw.queue_info.job_list,
            pending_jobs: raw.job_info.job_list,
            queues: raw.queue_info.queues,
        }
    }
}

/// A resource request, see `man 5 sge_complex`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Resource {
    #[serde(rename = "CE_name")]
    pub name: String,
    #[serde(rename = "CE_valtype")]
    pub val_type: i64,
    #[serde(rename = "CE_stringval")]
    pub string_val: String,
    #[serde(rename = "CE_doubleval")]
    pub double_val: f64,
    #[serde(rename = "CE_relop")]
    pub rel_op: i64,
    #[serde(rename = "CE_consumable")]
    pub consumable: bool,
    #[serde(rename = "CE_dominant")]
    pub dominant: bool,
    #[serde(rename = "CE_pj_doubleval")]
    pub pj_double_val: f64,
    #[serde(rename = "CE_pj_dominant")]
    pub pj_dominant: bool,
    #[serde(rename = "CE_requestable")]
    pub requestable: bool,
    #[serde(rename = "CE_tagged")]
    pub tagged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailAddress {
    #[serde(rename = "MR_user")]
    pub user: String,
    #[serde(rename = "MR_host")]
    pub host: String,
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnvVar {
    #[serde(rename = "VA_variable")]
    pub variable: String,
    #[serde(rename = "VA_value")]
    pub value: String,
}

/// An output path request (`-o`, `-e`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathList {
    #[serde(rename = "PN_path")]
    pub path: String,
    #[serde(rename = "PN_host")]
    pub host: String,
    #[serde(rename = "PN_file_host")]
    pub file_host: String,
    #[serde(rename = "PN_file_staging")]
    pub file_staging: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JatMessage {
    #[serde(rename = "QIM_type")]
    pub message_type: i64,
    #[serde(rename = "QIM_message")]
    pub message: String,
}

/// A task of an array job that has been scheduled at least once
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Task {
    #[serde(rename = "JAT_status")]
    pub status: i64,
    #[serde(rename = "JAT_task_number")]
    pub task_number: i64,
    #[serde(rename = "JAT_message_list", deserialize_with = "ulong_sublist")]
    pub messages: Vec<JatMessage>,
}

/// Scheduler messages attached to `qstat -j` output
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Messages {
    #[serde(rename = "SME_message_list", deserialize_with = "elements")]
    pub messages: Vec<SmeMessage>,
    #[serde(rename = "SME_global_message_list", deserialize_with = "elements")]
    pub global_messages: Vec<SmeMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmeMessage {
    #[serde(rename = "MES_job_number_list", deserialize_with = "ulng_values")]
    pub job_numbers: Vec<i64>,
    #[serde(rename = "MES_message_number")]
    pub number: i64,
    #[serde(rename = "MES_message")]
    pub message: String,
}

/// Which output stream of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn suffix(self) -> char {
        match self {
            OutputStream::Stdout => 'o',
            OutputStream::Stderr => 'e',
        }
    }
}

/// Detailed information about one job, as returned by `qstat -j`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobInfo {
    #[serde(rename = "JB_job_number")]
    pub job_number: i64,
    /// Advance reservation the job is bound to
    #[serde(rename = "JB_ar")]
    pub advance_reservation: i64,
    #[serde(rename = "JB_exec_file")]
    pub exec_file: String,
    #[serde(rename = "JB_submission_time")]
    pub submission_time: i64,
    #[serde(rename = "JB_owner")]
    pub owner: String,
    #[serde(rename = "JB_uid")]
    pub uid: i64,
    #[serde(rename = "JB_group")]
    pub group: String,
    #[serde(rename = "JB_gid")]
    pub gid: i64,
    #[serde(rename = "JB_account")]
    pub account: String,
    #[serde(rename = "JB_merge_stderr")]
    pub merge_stderr: bool,
    #[serde(rename = "JB_mail_list", deserialize_with = "elements")]
    pub mail_list: Vec<MailAddress>,
    #[serde(rename = "JB_project")]
    pub project: String,
    #[serde(rename = "JB_notify")]
    pub notify: bool,
    #[serde(rename = "JB_job_name")]
    pub job_name: String,
    /// Requested stdout paths: `path_list` entries, then alternate
    /// `stdout_path_list` entries
    #[serde(rename = "JB_stdout_path_list", deserialize_with = "path_lists")]
    pub stdout_path_list: Vec<PathList>,
    #[serde(rename = "JB_jobshare")]
    pub job_share: i64,
    /// Hard resource requests, from either list shape qstat emits
    #[serde(rename = "JB_hard_resource_list", deserialize_with = "resource_lists")]
    pub hard_resource_list: Vec<Resource>,
    #[serde(rename = "JB_env_list", deserialize_with = "job_sublist")]
    pub env_list: Vec<EnvVar>,
    #[serde(rename = "JB_job_args", deserialize_with = "st_names")]
    pub job_args: Vec<String>,
    #[serde(rename = "JB_script_file")]
    pub script_file: String,
    #[serde(rename = "JB_ja_tasks", deserialize_with = "ulong_sublist")]
    pub job_array_tasks: Vec<Task>,
    #[serde(rename = "JB_cwd")]
    pub cwd: String,
    /// Requested stderr paths: `path_list` entries, then alternate
    /// `stderr_path_list` entries
    #[serde(rename = "JB_stderr_path_list", deserialize_with = "path_lists")]
    pub stderr_path_list: Vec<PathList>,
    /// Predecessor jobs requested with `-hold_jid`
    #[serde(rename = "JB_jid_request_list", deserialize_with = "jre_names")]
    pub jid_request_list: Vec<String>,
    #[serde(rename = "JB_jid_successor_list", deserialize_with = "jre_numbers")]
    pub jid_successor_list: Vec<i64>,
    #[serde(rename = "JB_deadline")]
    pub deadline: bool,
    #[serde(rename = "JB_execution_time")]
    pub execution_time: i64,
    #[serde(rename = "JB_checkpoint_attr")]
    pub checkpoint_attr: i64,
    #[serde(rename = "JB_checkpoint_interval")]
    pub checkpoint_interval: i64,
    #[serde(rename = "JB_reserve")]
    pub reserve: bool,
    #[serde(rename = "JB_mail_options")]
    pub mail_options: i64,
    #[serde(rename = "JB_priority")]
    pub priority: i64,
    #[serde(rename = "JB_restart")]
    pub restart: i64,
    #[serde(rename = "JB_verify")]
    pub verify: bool,
    #[serde(rename = "JB_script_size")]
    pub script_size: i64,
    #[serde(rename = "JB_verify_suitable_queues")]
    pub verify_suitable_queues: bool,
    #[serde(rename = "JB_soft_wallclock_gmt")]
    pub soft_wallclock_gmt: i64,
    #[serde(rename = "JB_hard_wallclock_gmt")]
    pub hard_wallclock_gmt: i64,
    #[serde(rename = "JB_override_tickets")]
    pub override_tickets: i64,
    #[serde(rename = "JB_version")]
    pub version: i64,
    /// Array task range, the single-task range for non-array jobs
    #[serde(rename = "JB_ja_structure", deserialize_with = "ja_structure")]
    pub job_array: TaskRange,
    #[serde(rename = "JB_type")]
    pub job_type: i64,
}

impl JobInfo {
    /// Number of tasks in the job array
    pub fn num_tasks(&self) -> i64 {
        self.job_array.cardinality()
    }

    pub fn hard_resource_requests(&self) -> &[Resource] {
        &self.hard_resource_list
    }

    /// Requested stdout paths, made absolute against the working directory
    pub fn stdout_paths(&self) -> Vec<PathList> {
        abs_paths(&self.cwd, &self.stdout_path_list)
    }

    /// Requested stderr paths, empty when stderr is merged into stdout
    pub fn stderr_paths(&self) -> Vec<PathList> {
        if self.merge_stderr {
            return Vec::new();
        }
        abs_paths(&self.cwd, &self.stderr_path_list)
    }

    /// The command line the job runs
    pub fn command(&self) -> String {
        let mut parts = vec![self.script_file.as_str()];
        parts.extend(self.job_args.iter().map(String::as_str));
        parts.join(" ")
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.submission_time, 0)
    }

    /// The file a task of this job writes the given stream to.
    ///
    /// Stderr resolves to the stdout file when the streams are merged.
    pub fn output_file(&self, stream: OutputStream, task_id: Option<i64>) -> PathBuf {
        let (stream, requested) = match stream {
            OutputStream::Stderr if self.merge_stderr => {
                (OutputStream::Stdout, self.stdout_paths())
            }
            OutputStream::Stdout => (OutputStream::Stdout, self.stdout_paths()),
            OutputStream::Stderr => (OutputStream::Stderr, self.stderr_paths()),
        };
        match requested.first() {
            Some(p) => self.resolve_output_path(&p.path, stream, task_id),
            None => {
                let dir = if self.cwd.is_empty() {
                    home_dir()
                } else {
                    PathBuf::from(&self.cwd)
                };
                dir.join(self.default_output_name(stream, task_id))
            }
        }
    }

    /// Expand the pseudo environment variables GridEngine allows in output
    /// paths. A path naming a directory gets the default file name appended.
    pub fn resolve_output_path(
        &self,
        path: &str,
        stream: OutputStream,
        task_id: Option<i64>,
    ) -> PathBuf {
        let task = task_id.map_or_else(|| "undefined".to_string(), |t| t.to_string());
        let expanded = path
            .replace("$JOB_NAME", &self.job_name)
            .replace("$JOB_ID", &self.job_number.to_string())
            .replace("$TASK_ID", &task)
            .replace("$USER", &self.owner)
            .replace("$HOME", &home_dir().to_string_lossy());
        let resolved = PathBuf::from(expanded);
        if resolved.is_dir() {
            resolved.join(self.default_output_name(stream, task_id))
        } else {
            resolved
        }
    }

    fn default_output_name(&self, stream: OutputStream, task_id: Option<i64>) -> String {
        let mut name = format!("{}.{}{}", self.job_name, stream.suffix(), self.job_number);
        if let Some(task) = task_id.filter(|_| !self.job_array.is_single()) {
            name.push_str(&format!(".{}", task));
        }
        name
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default()
}

fn abs_paths(root: &str, paths: &[PathList]) -> Vec<PathList> {
    paths
        .iter()
        .map(|p| {
            let mut p = p.clone();
            if !p.path.is_empty() && !Path::new(&p.path).is_absolute() {
                p.path = Path::new(root).join(&p.path).to_string_lossy().into_owned();
            }
            p
        })
        .collect()
}

/// Output of `qstat -j`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetailedJobInfo {
    #[serde(rename = "djob_info", deserialize_with = "elements")]
    pub jobs: Vec<JobInfo>,
    #[serde(rename = "messages", deserialize_with = "first_element")]
    pub messages: Messages,
}

// qstat nests lists in wrapper elements whose names vary by list.

#[derive(Deserialize)]
struct Elements<T> {
    #[serde(default = "Vec::new")]
    element: Vec<T>,
}

#[derive(Deserialize)]
struct UlongSublist<T> {
    #[serde(default = "Vec::new")]
    ulong_sublist: Vec<T>,
}

#[derive(Deserialize)]
struct JobSublist<T> {
    #[serde(default = "Vec::new")]
    job_sublist: Vec<T>,
}

#[derive(Deserialize)]
struct PathLists {
    #[serde(default)]
    path_list: Vec<PathList>,
    #[serde(default)]
    stdout_path_list: Vec<PathList>,
    #[serde(default)]
    stderr_path_list: Vec<PathList>,
}

#[derive(Deserialize)]
struct ResourceLists {
    #[serde(default)]
    qstat_l_requests: Vec<Resource>,
    #[serde(default)]
    element: Vec<Resource>,
}

#[derive(Deserialize)]
struct StName {
    #[serde(rename = "ST_name", default)]
    name: String,
}

#[derive(Deserialize)]
struct JreName {
    #[serde(rename = "JRE_job_name", default)]
    name: String,
}

#[derive(Deserialize)]
struct JreNumber {
    #[serde(rename = "JRE_job_number", default)]
    number: i64,
}

#[derive(Deserialize)]
struct UlngValue {
    #[serde(rename = "ULNG_value", default)]
    value: i64,
}

#[derive(Deserialize)]
struct JaStructure {
    task_id_range: Option<RawTaskRange>,
}

/// `task_id_range`, already split into its fields
#[derive(Deserialize)]
struct RawTaskRange {
    #[serde(rename = "RN_min", default)]
    min: i64,
    #[serde(rename = "RN_max", default)]
    max: i64,
    #[serde(rename = "RN_step", default)]
    step: i64,
}

fn elements<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Elements::deserialize(d)?.element)
}

fn first_element<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Elements::deserialize(d)?
        .element
        .into_iter()
        .next()
        .unwrap_or_default())
}

fn ulong_sublist<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(UlongSublist::deserialize(d)?.ulong_sublist)
}

fn job_sublist<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(JobSublist::deserialize(d)?.job_sublist)
}

/// Primary `path_list` entries first, then the alternate stdout/stderr ones
fn path_lists<'de, D>(d: D) -> Result<Vec<PathList>, D::Error>
where
    D: Deserializer<'de>,
{
    let lists = PathLists::deserialize(d)?;
    let mut paths = lists.path_list;
    paths.extend(lists.stdout_path_list);
    paths.extend(lists.stderr_path_list);
    Ok(paths)
}

fn resource_lists<'de, D>(d: D) -> Result<Vec<Resource>, D::Error>
where
    D: Deserializer<'de>,
{
    let lists = ResourceLists::deserialize(d)?;
    let mut resources = lists.qstat_l_requests;
    resources.extend(lists.element);
    Ok(resources)
}

fn st_names<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let names: Vec<StName> = elements(d)?;
    Ok(names.into_iter().map(|n| n.name).collect())
}

fn jre_names<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let names: Vec<JreName> = elements(d)?;
    Ok(names.into_iter().map(|n| n.name).collect())
}

fn jre_numbers<'de, D>(d: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let numbers: Vec<JreNumber> = ulong_sublist(d)?;
    Ok(numbers.into_iter().map(|n| n.number).collect())
}

fn ulng_values<'de, D>(d: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<UlngValue> = ulong_sublist(d)?;
    Ok(values.into_iter().map(|v| v.value).collect())
}

/// An invalid triple only affects its own job: it is read as a single task.
fn ja_structure<'de, D>(d: D) -> Result<TaskRange, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = JaStructure::deserialize(d)?.task_id_range else {
        return Ok(TaskRange::SINGLE);
    };
    match TaskRange::new(raw.min, raw.max, raw.step) {
        Ok(range) => Ok(range),
        Err(e) => {
            debug!(
                min = raw.min,
                max = raw.max,
                step = raw.step,
                error = %e,
                "treating invalid job array structure as a single task"
            );
            Ok(TaskRange::SINGLE)
        }
    }
}

/// Options for the queue overview
#[derive(Debug, Clone)]
pub struct QstatOptions {
    /// Restrict to one user; `None` or an empty name lists all users
    pub user: Option<String>,
    /// Full format, listing jobs under their queue instances
    pub full: bool,
}

impl Default for QstatOptions {
    fn default() -> Self {
        Self {
            user: Some(get_username()),
            full: false,
        }
    }
}

impl QstatOptions {
    pub fn all_users() -> Self {
        Self {
            user: None,
            full: false,
        }
    }

    /// The user pattern passed to `-u`
    pub fn user_pattern(&self) -> &str {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => user,
            _ => "*",
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-pri".to_string(), "-ext".to_string(), "-urg".to_string()];

        if self.full {
            args.push("-f".to_string());
        }

        args.push("-u".to_string());
        args.push(self.user_pattern().to_string());

        args
    }
}

static UNKNOWN_JOBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)<unknown_jobs\b|^\s*<>\s*$").expect("unknown jobs pattern is valid")
});

/// Whether raw qstat output is the malformed document qstat prints for
/// job patterns that match nothing
pub fn is_unknown_jobs_output(raw: &[u8]) -> bool {
    UNKNOWN_JOBS.is_match(&String::from_utf8_lossy(raw))
}

/// Decode qstat XML output, replacing invalid UTF-8 sequences
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, QstatError> {
    let text = String::from_utf8_lossy(raw);
    Ok(quick_xml::de::from_str(&text)?)
}

async fn qstat_output(args: &[String]) -> Result<Output, QstatError> {
    let mut full_args = vec!["-xml".to_string()];
    full_args.extend_from_slice(args);
    Ok(execute_command("qstat", &full_args).await?)
}

fn check_status(output: &Output) -> Result<(), QstatError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = stderr_text(output);
    warn!(status = %output.status, %stderr, "qstat returned an error");
    Err(QstatError::Failed {
        status: output.status,
        stderr,
    })
}

/// Run `qstat -xml` with the given arguments and decode its output
pub async fn run_qstat<T: DeserializeOwned>(args: &[String]) -> Result<T, QstatError> {
    let output = qstat_output(args).await?;
    check_status(&output)?;
    decode(&output.stdout)
}

/// Current state of the queue
pub async fn get_queue_info(options: &QstatOptions) -> Result<QueueInfo, QstatError> {
    let info: QueueInfo = run_qstat(&options.to_args()).await?;
    debug!(
        queued = info.queued_jobs.len(),
        pending = info.pending_jobs.len(),
        queues = info.queues.len(),
        "decoded queue info"
    );
    Ok(info)
}

/// Detailed information for all jobs matching `pattern`, a `wc_job_list`
/// as described in `man 1 sge_types`
pub async fn get_detailed_job_info(pattern: &str) -> Result<DetailedJobInfo, QstatError> {
    let output = qstat_output(&["-j".to_string(), pattern.to_string()]).await?;
    if is_unknown_jobs_output(&output.stdout) {
        return Err(QstatError::UnknownJob(pattern.to_string()));
    }
    check_status(&output)?;
    decode(&output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUEUE_INFO: &str = r#"<?xml version='1.0'?>
<job_info  xmlns:xsd="http://gridengine.sunsource.net/source/browse/*checkout*/gridengine/source/dist/util/resources/schemas/qstat/qstat.xsd?revision=1.11">
  <queue_info>
    <job_list state="running">
      <JB_job_number>3064076</JB_job_number>
      <JAT_prio>0.67712</JAT_prio>
      <JAT_ntix>1.00000</JAT_ntix>
      <JB_nurg>0.00064</JB_nurg>
      <JB_urg>527</JB_urg>
      <JB_rrcontr>512</JB_rrcontr>
      <JB_wtcontr>15</JB_wtcontr>
      <JB_dlcontr>0</JB_dlcontr>
      <JB_nppri>0.25586</JB_nppri>
      <JB_priority>-500</JB_priority>
      <JB_name>QRLOGIN</JB_name>
      <JB_owner>bob</JB_owner>
      <JB_project>some_project</JB_project>
      <JB_department>defaultdepartment</JB_department>
      <state>r</state>
      <JAT_start_time>2012-11-01T13:06:41</JAT_start_time>
      <cpu_usage>0.00000</cpu_usage>
      <mem_usage>0.00000</mem_usage>
      <io_usage>0.00000</io_usage>
      <tickets>666</tickets>
      <JB_override_tickets>0</JB_override_tickets>
      <JB_jobshare>0</JB_jobshare>
      <otickets>0</otickets>
      <ftickets>666</ftickets>
      <stickets>0</stickets>
      <JAT_share>0.16667</JAT_share>
      <queue_name>interactive.q@cluster</queue_name>
      <slots>1</slots>
    </job_list>
  </queue_info>
  <job_info>
    <job_list state="pending">
      <JB_job_number>3050948</JB_job_number>
      <JAT_prio>0.70234</JAT_prio>
      <JAT_ntix>1.00000</JAT_ntix>
      <JB_nurg>0.00064</JB_nurg>
      <JB_urg>527</JB_urg>
      <JB_rrcontr>512</JB_rrcontr>
      <JB_wtcontr>15</JB_wtcontr>
      <JB_dlcontr>0</JB_dlcontr>
      <JB_nppri>0.00000</JB_nppri>
      <JB_priority>-500</JB_priority>
      <JB_name>Something</JB_name>
      <JB_owner>john</JB_owner>
      <JB_project>some_other_project</JB_project>
      <JB_department>defaultdepartment</JB_department>
      <state>Eqw</state>
      <JB_submission_time>2012-10-28T09:47:07</JB_submission_time>
      <tickets>500</tickets>
      <JB_override_tickets>0</JB_override_tickets>
      <JB_jobshare>0</JB_jobshare>
      <otickets>0</otickets>
      <ftickets>500</ftickets>
      <stickets>0</stickets>
      <JAT_share>0.12500</JAT_share>
      <queue_name></queue_name>
      <slots>1</slots>
      <tasks>6-8,1-3</tasks>
    </job_list>
  </job_info>
</job_info>
"#;

    const QUEUE_LIST: &str = r#"<?xml version='1.0'?>
<job_info>
  <queue_info>
    <Queue-List>
      <name>all.q@node01</name>
      <qtype>BIP</qtype>
      <slots_used>2</slots_used>
      <slots_resv>1</slots_resv>
      <slots_total>8</slots_total>
      <load_avg>1.25000</load_avg>
      <arch>lx-amd64</arch>
      <job_list state="running">
        <JB_job_number>42</JB_job_number>
        <JB_name>sim</JB_name>
        <JB_owner>alice</JB_owner>
        <state>r</state>
        <slots>2</slots>
        <tasks>3</tasks>
      </job_list>
    </Queue-List>
    <Queue-List>
      <name>all.q@node02</name>
      <qtype>BIP</qtype>
      <slots_used>0</slots_used>
      <slots_resv>0</slots_resv>
      <slots_total>8</slots_total>
      <arch>lx-amd64</arch>
      <state>au</state>
    </Queue-List>
  </queue_info>
  <job_info>
  </job_info>
</job_info>
"#;

    const DETAILED_JOB_INFO: &str = r#"<?xml version='1.0'?>
<detailed_job_info  xmlns:xsd="http://arc.liv.ac.uk/repos/darcs/sge/source/dist/util/resources/schemas/qstat/detailed_job_info.xsd">
  <djob_info>
    <element>
      <JB_job_number>4242</JB_job_number>
      <JB_ar>0</JB_ar>
      <JB_exec_file>job_scripts/4242</JB_exec_file>
      <JB_submission_time>1351775201</JB_submission_time>
      <JB_owner>alice</JB_owner>
      <JB_uid>1001</JB_uid>
      <JB_group>users</JB_group>
      <JB_gid>100</JB_gid>
      <JB_account>sge</JB_account>
      <JB_merge_stderr>false</JB_merge_stderr>
      <JB_mail_list>
        <element>
          <MR_user>alice</MR_user>
          <MR_host>example.org</MR_host>
        </element>
      </JB_mail_list>
      <JB_notify>false</JB_notify>
      <JB_job_name>render</JB_job_name>
      <JB_stdout_path_list>
        <path_list>
          <PN_path>logs/render.out</PN_path>
          <PN_host></PN_host>
          <PN_file_host></PN_file_host>
          <PN_file_staging>false</PN_file_staging>
        </path_list>
      </JB_stdout_path_list>
      <JB_jobshare>0</JB_jobshare>
      <JB_hard_resource_list>
        <qstat_l_requests>
          <CE_name>h_vmem</CE_name>
          <CE_valtype>5</CE_valtype>
          <CE_stringval>4G</CE_stringval>
          <CE_doubleval>4294967296.000000</CE_doubleval>
          <CE_relop>0</CE_relop>
          <CE_consumable>true</CE_consumable>
          <CE_dominant>0</CE_dominant>
          <CE_pj_doubleval>0.000000</CE_pj_doubleval>
          <CE_pj_dominant>0</CE_pj_dominant>
          <CE_requestable>0</CE_requestable>
          <CE_tagged>0</CE_tagged>
        </qstat_l_requests>
        <element>
          <CE_name>h_rt</CE_name>
          <CE_stringval>3600</CE_stringval>
          <CE_doubleval>3600.000000</CE_doubleval>
        </element>
      </JB_hard_resource_list>
      <JB_env_list>
        <job_sublist>
          <VA_variable>__SGE_PREFIX__O_HOME</VA_variable>
          <VA_value>/home/alice</VA_value>
        </job_sublist>
      </JB_env_list>
      <JB_job_args>
        <element>
          <ST_name>--frames</ST_name>
        </element>
        <element>
          <ST_name>100</ST_name>
        </element>
      </JB_job_args>
      <JB_script_file>render.sh</JB_script_file>
      <JB_ja_tasks>
        <ulong_sublist>
          <JAT_status>128</JAT_status>
          <JAT_task_number>1</JAT_task_number>
        </ulong_sublist>
      </JB_ja_tasks>
      <JB_cwd>/home/alice/project</JB_cwd>
      <JB_stderr_path_list>
        <stderr_path_list>
          <PN_path>/scratch/render.err</PN_path>
          <PN_host></PN_host>
          <PN_file_host></PN_file_host>
          <PN_file_staging>false</PN_file_staging>
        </stderr_path_list>
      </JB_stderr_path_list>
      <JB_jid_successor_list>
        <ulong_sublist>
          <JRE_job_number>4243</JRE_job_number>
        </ulong_sublist>
      </JB_jid_successor_list>
      <JB_deadline>0</JB_deadline>
      <JB_execution_time>0</JB_execution_time>
      <JB_priority>1024</JB_priority>
      <JB_ja_structure>
        <task_id_range>
          <RN_min>1</RN_min>
          <RN_max>10</RN_max>
          <RN_step>3</RN_step>
        </task_id_range>
      </JB_ja_structure>
      <JB_type>0</JB_type>
    </element>
  </djob_info>
  <messages>
    <element>
      <SME_message_list>
        <element>
          <MES_job_number_list>
            <ulong_sublist>
              <ULNG_value>4242</ULNG_value>
            </ulong_sublist>
          </MES_job_number_list>
          <MES_message_number>1</MES_message_number>
          <MES_message>cannot run in queue "all.q" because it is full</MES_message>
        </element>
      </SME_message_list>
    </element>
  </messages>
</detailed_job_info>
"#;

    const UNKNOWN_JOB: &str = r#"<?xml version='1.0'?>
<unknown_jobs  xmlns:xsd="http://arc.liv.ac.uk/repos/darcs/sge/source/dist/util/resources/schemas/qstat/detailed_job_info.xsd">
  <>
   <ST_name>99999</ST_name>
  </>
</unknown_jobs>
"#;

    #[test]
    fn test_queue_info_decodes_queued_job() {
        let info: QueueInfo = decode(QUEUE_INFO.as_bytes()).unwrap();
        assert_eq!(info.queued_jobs.len(), 1);
        assert_eq!(info.pending_jobs.len(), 1);

        let expected = QueueJob {
            job_number: 3064076,
            normalized_priority: 0.67712,
            normalized_urgency: 0.00064,
            normalized_tickets: 1.0,
            resource_contribution: 512.0,
            wait_time_contribution: 15.0,
            deadline_contribution: 0.0,
            posix_priority: -500,
            name: "QRLOGIN".to_string(),
            owner: "bob".to_string(),
            project: "some_project".to_string(),
            department: "defaultdepartment".to_string(),
            state: "r".to_string(),
            start_time: "2012-11-01T13:06:41".to_string(),
            tickets: 666,
            fairshare_tickets: 666,
            queue_name: "interactive.q@cluster".to_string(),
            slots: 1,
            ..Default::default()
        };
        assert_eq!(info.queued_jobs[0], expected);
        assert_eq!(info.queued_jobs[0].num_tasks(), 1);
        assert_eq!(
            info.queued_jobs[0].states(),
            vec![JobStateFlag::Running]
        );
    }

    #[test]
    fn test_queue_info_decodes_pending_job() {
        let info: QueueInfo = decode(QUEUE_INFO.as_bytes()).unwrap();
        let job = &info.pending_jobs[0];

        assert_eq!(job.job_number, 3050948);
        assert_eq!(job.name, "Something");
        assert_eq!(job.submission_time, "2012-10-28T09:47:07");
        assert_eq!(job.queue_name, "");
        assert_eq!(job.tickets, 500);
        assert_eq!(job.num_tasks(), 6);
        assert_eq!(
            job.states(),
            vec![
                JobStateFlag::Error,
                JobStateFlag::Waiting,
                JobStateFlag::Queued
            ]
        );
        assert!(!job.has_state(JobStateFlag::Running));
        assert!(job.started_at().is_none());
        assert_eq!(
            job.submitted_at().map(|t| t.to_string()),
            Some("2012-10-28 09:47:07".to_string())
        );
    }

    #[test]
    fn test_queue_list_decodes_queues() {
        let info: QueueInfo = decode(QUEUE_LIST.as_bytes()).unwrap();
        assert_eq!(info.queues.len(), 2);
        assert!(info.pending_jobs.is_empty());

        let node01 = &info.queues[0];
        assert_eq!(node01.name, "all.q@node01");
        assert_eq!(node01.slots_free(), 5);
        assert_eq!(node01.load_avg, Some(1.25));
        assert_eq!(node01.jobs.len(), 1);
        assert_eq!(node01.jobs[0].num_tasks(), 1);

        assert_eq!(info.queues[1].state, "au");
        assert_eq!(info.queues[1].load_avg, None);
        assert_eq!(info.all_jobs().count(), 1);
    }

    #[test]
    fn test_detailed_job_info_decodes() {
        let info: DetailedJobInfo = decode(DETAILED_JOB_INFO.as_bytes()).unwrap();
        assert_eq!(info.jobs.len(), 1);
        let job = &info.jobs[0];

        assert_eq!(job.job_number, 4242);
        assert_eq!(job.owner, "alice");
        assert_eq!(job.mail_list[0].to_string(), "alice@example.org");
        assert_eq!(job.job_args, vec!["--frames", "100"]);
        assert_eq!(job.command(), "render.sh --frames 100");
        assert_eq!(job.env_list[0].value, "/home/alice");
        assert_eq!(job.job_array_tasks[0].task_number, 1);
        assert_eq!(job.jid_successor_list, vec![4243]);
        assert_eq!(job.priority, 1024);
        assert_eq!(job.job_array, TaskRange::new(1, 10, 3).unwrap());
        assert_eq!(job.num_tasks(), 4);

        let resources: Vec<&str> = job
            .hard_resource_requests()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(resources, vec!["h_vmem", "h_rt"]);
        assert!(job.hard_resource_requests()[0].consumable);

        assert_eq!(info.messages.messages[0].job_numbers, vec![4242]);
        assert!(info.messages.global_messages.is_empty());
    }

    #[test]
    fn test_job_info_paths() {
        let info: DetailedJobInfo = decode(DETAILED_JOB_INFO.as_bytes()).unwrap();
        let mut job = info.jobs[0].clone();

        let stdout: Vec<String> = job.stdout_paths().into_iter().map(|p| p.path).collect();
        assert_eq!(stdout, vec!["/home/alice/project/logs/render.out"]);
        let stderr: Vec<String> = job.stderr_paths().into_iter().map(|p| p.path).collect();
        assert_eq!(stderr, vec!["/scratch/render.err"]);

        job.merge_stderr = true;
        assert!(job.stderr_paths().is_empty());
        assert_eq!(
            job.output_file(OutputStream::Stderr, None),
            PathBuf::from("/home/alice/project/logs/render.out")
        );
    }

    #[test]
    fn test_invalid_array_structure_keeps_other_jobs() {
        let xml = r#"<?xml version='1.0'?>
<detailed_job_info>
  <djob_info>
    <element>
      <JB_job_number>100</JB_job_number>
      <JB_ja_structure>
        <task_id_range>
          <RN_min>1</RN_min>
          <RN_max>5</RN_max>
          <RN_step>1</RN_step>
        </task_id_range>
      </JB_ja_structure>
    </element>
    <element>
      <JB_job_number>101</JB_job_number>
      <JB_ja_structure>
        <task_id_range>
          <RN_min>1</RN_min>
          <RN_max>5</RN_max>
          <RN_step>0</RN_step>
        </task_id_range>
      </JB_ja_structure>
    </element>
  </djob_info>
</detailed_job_info>
"#;
        let info: DetailedJobInfo = decode(xml.as_bytes()).unwrap();
        let numbers: Vec<i64> = info.jobs.iter().map(|j| j.job_number).collect();
        assert_eq!(numbers, vec![100, 101]);
        assert_eq!(info.jobs[0].num_tasks(), 5);
        assert!(info.jobs[1].job_array.is_single());
        assert_eq!(info.jobs[1].num_tasks(), 1);
    }

    #[test]
    fn test_path_lists_keep_primary_before_alternate() {
        let xml = r#"<?xml version='1.0'?>
<detailed_job_info>
  <djob_info>
    <element>
      <JB_job_number>7</JB_job_number>
      <JB_cwd>/work</JB_cwd>
      <JB_stdout_path_list>
        <stdout_path_list>
          <PN_path>alt.out</PN_path>
        </stdout_path_list>
        <path_list>
          <PN_path>/logs/primary.out</PN_path>
        </path_list>
      </JB_stdout_path_list>
    </element>
  </djob_info>
</detailed_job_info>
"#;
        let info: DetailedJobInfo = decode(xml.as_bytes()).unwrap();
        let paths: Vec<String> = info.jobs[0].stdout_paths().into_iter().map(|p| p.path).collect();
        assert_eq!(paths, vec!["/logs/primary.out", "/work/alt.out"]);
    }

    #[test]
    fn test_job_without_array_structure_is_single_task() {
        let job = JobInfo::default();
        assert!(job.job_array.is_single());
        assert_eq!(job.num_tasks(), 1);
    }

    #[test]
    fn test_resolve_output_path_expands_pseudo_variables() {
        let job = JobInfo {
            job_number: 17,
            job_name: "align".to_string(),
            owner: "carol".to_string(),
            ..Default::default()
        };
        assert_eq!(
            job.resolve_output_path(
                "/data/$USER/$JOB_NAME.$JOB_ID.$TASK_ID.log",
                OutputStream::Stdout,
                Some(3)
            ),
            PathBuf::from("/data/carol/align.17.3.log")
        );
        assert_eq!(
            job.resolve_output_path("/data/$JOB_ID.$TASK_ID", OutputStream::Stdout, None),
            PathBuf::from("/data/17.undefined")
        );
    }

    #[test]
    fn test_resolve_output_path_into_directory() {
        let job = JobInfo {
            job_number: 17,
            job_name: "align".to_string(),
            job_array: TaskRange::new(1, 4, 1).unwrap(),
            ..Default::default()
        };
        let dir = std::env::temp_dir();
        assert_eq!(
            job.resolve_output_path(&dir.to_string_lossy(), OutputStream::Stderr, Some(2)),
            dir.join("align.e17.2")
        );
    }

    #[test]
    fn test_default_output_file_uses_cwd() {
        let job = JobInfo {
            job_number: 8,
            job_name: "job".to_string(),
            cwd: "/work".to_string(),
            ..Default::default()
        };
        assert_eq!(
            job.output_file(OutputStream::Stdout, Some(1)),
            PathBuf::from("/work/job.o8")
        );
        assert_eq!(
            job.output_file(OutputStream::Stderr, None),
            PathBuf::from("/work/job.e8")
        );
    }

    #[test]
    fn test_unknown_jobs_output_detected() {
        assert!(is_unknown_jobs_output(UNKNOWN_JOB.as_bytes()));
        assert!(!is_unknown_jobs_output(DETAILED_JOB_INFO.as_bytes()));
        assert!(!is_unknown_jobs_output(QUEUE_INFO.as_bytes()));
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let mut raw = b"<job_info><queue_info><job_list><JB_job_number>1</JB_job_number><JB_name>a".to_vec();
        raw.push(0xff);
        raw.extend_from_slice(b"b</JB_name></job_list></queue_info></job_info>");
        let info: QueueInfo = decode(&raw).unwrap();
        assert_eq!(info.queued_jobs[0].name, "a\u{fffd}b");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<QueueInfo>(b"<job_info><queue_info>").is_err());
    }

    #[test]
    fn test_total_tasks_falls_back_to_one() {
        assert_eq!(total_tasks("6-8,1-3"), 6);
        assert_eq!(total_tasks(&format!("1-{},1-{}", i64::MAX, i64::MAX)), 1);
        assert_eq!(total_tasks(""), 1);
        assert_eq!(total_tasks("not-a-range"), 1);
        assert_eq!(total_tasks("1-10:3:4"), 1);
    }

    #[test]
    fn test_state_flag_letters() {
        for flag in JobStateFlag::ALL {
            assert_eq!(JobStateFlag::from_letter(flag.letter()), Some(flag));
        }
        assert_eq!(JobStateFlag::from_letter('x'), None);
    }

    #[test]
    fn test_qstat_options_args() {
        let options = QstatOptions {
            user: Some("alice".to_string()),
            full: true,
        };
        assert_eq!(
            options.to_args(),
            vec!["-pri", "-ext", "-urg", "-f", "-u", "alice"]
        );

        let options = QstatOptions {
            user: Some(String::new()),
            full: false,
        };
        assert_eq!(options.to_args(), vec!["-pri", "-ext", "-urg", "-u", "*"]);
        assert_eq!(QstatOptions::all_users().user_pattern(), "*");
    }
}
