//! Tag-driven start/stop of compute instances.
//!
//! - [`InstanceSelector`] lists instances by tag and finds the ones owned by
//!   an autoscaling group
//! - [`AlarmCoordinator`] suspends and resumes the alarms watching a set of
//!   instances, collecting per-instance failures instead of aborting
//! - [`InstanceScheduler`] combines both: alarms are suspended before a stop
//!   and resumed after a start

pub mod alarms;
pub mod error;
pub mod scheduler;
pub mod selector;
pub mod types;

pub use alarms::{AlarmCoordinator, DEFAULT_ALARM_CONCURRENCY};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::InstanceScheduler;
pub use selector::InstanceSelector;
pub use types::{
    AlarmFailure, AlarmOutcome, AlarmPhase, InstanceSnapshot, SchedulePlan, ScheduleReport,
};
