//! Recording lifecycle
//!
//! - RecordingState enum and session tracking (`state`)
//! - RecordingStateMachine driving idle/recording/stopping/uploading (`machine`)

pub mod machine;
pub mod state;

pub use machine::{arm_auto_stop, RecordingEvent, RecordingStateMachine, AUTO_STOP_DELAY};
pub use state::{RecordingSession, RecordingState};
