//! adjoin lifecycle: the join state machine, the keytab refresh task and
//! the schedule that keeps running it.

mod error;
pub mod lock;
pub mod log;
mod machine;
pub mod refresh;
pub mod schedule;

pub use error::LifecycleError;
pub use lock::LifecycleLock;
pub use machine::{Lifecycle, LifecycleSnapshot, LifecycleState, StartOutcome, Step, STEP_COUNT};
pub use refresh::{run_refresh, RefreshReport, RefreshStage};
pub use schedule::{
    refresh_and_record, RefreshOutcome, RefreshRunner, RefreshSchedule, REFRESH_INTERVAL,
};
