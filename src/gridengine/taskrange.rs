//! Task-array range expressions.
//!
//! GridEngine describes the subtasks of an array job with a compact grammar:
//!
//! * an empty string (a non-array job, equivalent to `"1"`)
//! * `n`
//! * `n-m`
//! * `n-m:s`
//!
//! where `n` is the first task number, `m` the last (inclusive) and `s` the
//! step between task numbers. A comma-separated list of expressions denotes
//! the union of the ranges.

use std::fmt;
use std::str::FromStr;

use super::error::TaskRangeError;

/// A range of job array task identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskRange {
    min: i64,
    max: i64,
    step: i64,
}

impl TaskRange {
    /// The range of a non-array job
    pub const SINGLE: TaskRange = TaskRange {
        min: 1,
        max: 1,
        step: 1,
    };

    pub fn new(min: i64, max: i64, step: i64) -> Result<Self, TaskRangeError> {
        if step < 1 {
            return Err(TaskRangeError::NonPositiveStep(step));
        }
        Ok(Self { min, max, step })
    }

    /// The first task identifier
    pub fn min(&self) -> i64 {
        self.min
    }

    /// The last task identifier (inclusive)
    pub fn max(&self) -> i64 {
        self.max
    }

    /// The stride between consecutive task identifiers
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Number of task identifiers in the range.
    ///
    /// Computed as `ceil((max - min + 1) / step)` in floating point. A range
    /// with `max < min` is not rejected and yields a count of zero or less.
    pub fn cardinality(&self) -> i64 {
        let min = self.min as f64;
        let max = self.max as f64;
        let step = self.step as f64;
        ((max - min + 1.0) / step).ceil() as i64
    }

    /// Whether this is the single-task range of a non-array job
    pub fn is_single(&self) -> bool {
        *self == Self::SINGLE
    }
}

impl Default for TaskRange {
    fn default() -> Self {
        Self::SINGLE
    }
}

impl fmt::Display for TaskRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.step != 1 {
            write!(f, "{}-{}:{}", self.min, self.max, self.step)
        } else if self.min != self.max {
            write!(f, "{}-{}", self.min, self.max)
        } else {
            write!(f, "{}", self.min)
        }
    }
}

impl FromStr for TaskRange {
    type Err = TaskRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parse a single range expression.
pub fn parse(expr: &str) -> Result<TaskRange, TaskRangeError> {
    if expr.is_empty() {
        return Ok(TaskRange::SINGLE);
    }

    let parts: Vec<&str> = expr.split('-').collect();

    let min = parts[0]
        .parse::<i64>()
        .map_err(|_| TaskRangeError::InvalidMin(parts[0].to_string()))?;
    let mut max = min;
    let mut step = 1;

    match parts.len() {
        1 => {}
        2 => {
            let tail: Vec<&str> = parts[1].split(':').collect();
            if tail.len() > 2 {
                return Err(TaskRangeError::MalformedStep(expr.to_string()));
            }
            if let Some(raw_step) = tail.get(1) {
                step = raw_step
                    .parse::<i64>()
                    .map_err(|_| TaskRangeError::InvalidStep(raw_step.to_string()))?;
            }
            max = tail[0]
                .parse::<i64>()
                .map_err(|_| TaskRangeError::InvalidMax(tail[0].to_string()))?;
        }
        _ => return Err(TaskRangeError::MalformedRange(expr.to_string())),
    }

    TaskRange::new(min, max, step)
}

/// Parse a comma-separated union of range expressions.
///
/// Fails with the error of the first segment that does not parse.
pub fn parse_all(expr: &str) -> Result<Vec<TaskRange>, TaskRangeError> {
    expr.split(',').map(parse).collect()
}

/// Total number of tasks denoted by a comma-separated union of ranges.
///
/// Overlapping segments are not deduplicated.
pub fn count_tasks(expr: &str) -> Result<i64, TaskRangeError> {
    parse_all(expr)?
        .iter()
        .try_fold(0i64, |total, range| total.checked_add(range.cardinality()))
        .ok_or_else(|| TaskRangeError::CountOverflow(expr.to_string()))
}
