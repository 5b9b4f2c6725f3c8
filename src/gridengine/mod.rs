//! GridEngine data access: task-array ranges, `qstat` status and ARCo
//! accounting.

pub mod arco;
pub mod error;
pub mod qstat;
pub mod taskrange;

pub use arco::{Accounting, ArcoDb, ArcoJob, JobLog};
pub use error::{ArcoError, QstatError, TaskRangeError};
pub use qstat::{
    get_detailed_job_info, get_queue_info, total_tasks, DetailedJobInfo, JobInfo, JobStateFlag,
    OutputStream, QstatOptions, Queue, QueueInfo, QueueJob,
};
pub use taskrange::{count_tasks, parse, parse_all, TaskRange};
