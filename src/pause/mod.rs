//! Human-in-the-loop pause and resume
//!
//! A step pauses by returning a pause signal. The executor turns the signal
//! into a [`PendingPause`], persists it with the run's checkpoint and hands
//! control back to the caller, who later resumes the run with human input.

pub mod pending;
pub mod signal;

pub use pending::{expiry_after, ttl_from_millis, PausePoint, PendingPause};
pub use signal::{detect_pause_signal, PauseMetadata, PauseSignal, PauseSignalKind, ResumeBehavior};
