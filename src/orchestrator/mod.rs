//! Application-level orchestration utilities.
//!
//! This module owns session lifecycle control (start/restart/quit) and post-session
//! processing such as report building, auto-save, exports, and history refresh. UI/CLI
//! layers call into this module to keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::process_session_completion;
