use std::process::ExitStatus;

use thiserror::Error;

/// Errors produced while parsing a task-array range expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskRangeError {
    #[error("could not parse task range: invalid min ({0})")]
    InvalidMin(String),

    #[error("could not parse task range: invalid max ({0})")]
    InvalidMax(String),

    #[error("could not parse task range: invalid step ({0})")]
    InvalidStep(String),

    #[error("could not parse task range: too many '-' separators in {0:?}")]
    MalformedRange(String),

    #[error("could not parse task range: too many ':' separators in {0:?}")]
    MalformedStep(String),

    #[error("task range step must be at least 1, got {0}")]
    NonPositiveStep(i64),

    #[error("task count of {0:?} exceeds the integer range")]
    CountOverflow(String),
}

/// Errors produced while running or decoding qstat
#[derive(Debug, Error)]
pub enum QstatError {
    #[error("qstat: could not start qstat: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("qstat: exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("qstat: could not decode output: {0}")]
    Decode(#[from] quick_xml::de::DeError),

    #[error("qstat: unknown job: {0}")]
    UnknownJob(String),
}

/// Errors produced by the ARCo accounting database
#[derive(Debug, Error)]
pub enum ArcoError {
    #[error("arco: could not connect: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("arco: query failed: {0}")]
    Query(#[from] sqlx::Error),
}
