pub mod error;
pub mod locks;
pub mod manager;
pub mod rules;

pub use error::CallError;
pub use locks::CallLocks;
pub use manager::{
    CallManager, CallWithParticipants, LeaveOutcome, MediaConstraints, MediaToggle, QualityReport,
    SettingsUpdate, StartCallInput,
};
