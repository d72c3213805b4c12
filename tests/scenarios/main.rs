//! End-to-end scenarios driving the executor through its public API

mod helpers;

mod checkpointing;
mod failure_handling;
mod pause_resume;
