mod coordinator;
mod snapshot;

pub use coordinator::{CoordinatorHandle, start, start_with};
pub use snapshot::{CycleError, PollStatus, Snapshot};
