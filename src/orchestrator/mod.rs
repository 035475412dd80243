//! Application-level orchestration.
//!
//! This module owns request dispatch, job polling and log streaming, plus the
//! post-submission processing that turns outcomes into UI events. UI/CLI layers call into
//! this module to keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, Services, UiCommand};
pub(crate) use post_process::process_outcome;
