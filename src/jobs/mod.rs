//! Tracking of long-running backend jobs.

mod poller;

pub use poller::{
    backoff_delay, poll_job, spawn_poll, JobPoller, PollHandle, PollState, PollerConfig,
    StatusSource, TerminalNotifier,
};
