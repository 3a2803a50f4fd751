//! BDD step definitions for panel-sync

pub mod action_steps;
pub mod job_steps;
