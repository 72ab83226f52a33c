pub mod event;
pub mod event_assignment;
pub mod milestone;
pub mod progress_report;
pub mod user;

pub use event::EventStatus;
pub use milestone::MilestoneStatus;
pub use user::Role;
