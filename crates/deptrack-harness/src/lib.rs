#![forbid(unsafe_code)]

//! Harness: reference subscribers and diagnostics capture for deptrack tests.

pub mod trace;
pub mod watcher;

pub use trace::{
    CapturedWarning, WARN_TARGET, WarningCapture, WarningLog, capture_warnings, init_test_logging,
};
pub use watcher::{WatchMode, Watcher};
