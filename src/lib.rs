//! Reconciles time records from different trackers into one trustworthy
//! timeline. Manual entries, automatically captured window usage, and
//! pomodoro sessions all cover the same hours from different angles, so the
//! interesting work is finding untracked gaps, spotting records that overlap
//! or duplicate each other, and merging them without losing tracked time.
//!

pub mod cli;
pub mod engine;
pub mod store;
pub mod utils;
