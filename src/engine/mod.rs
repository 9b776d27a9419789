pub mod dispatch;
pub mod queue;
pub mod ranking;
pub mod reaper;
