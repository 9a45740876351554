//! Progress of a running batch.
//!
//! Workers update the counters with atomic increments and never wait on each other. The
//! renderer reads a [`CopyMonitorSnapshot`](copy::CopyMonitorSnapshot) or
//! [`RemoveMonitorSnapshot`](remove::RemoveMonitorSnapshot) and formats one line from it.
//! Totals are only final after the statistic pass has called `set_scan_end`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub mod copy;
pub mod remove;

pub use copy::{CopyMonitor, CopyMonitorSnapshot};
pub use remove::{RemoveMonitor, RemoveMonitorSnapshot};

pub const PROGRESS_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// How the batch ended, as seen by the caller rendering the finish line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Normal,
    Error,
}

/// The monitor of the batch a pipeline runs.
#[derive(Debug, Clone)]
pub enum Monitor {
    Copy(Arc<CopyMonitor>),
    Remove(Arc<RemoveMonitor>),
}

impl Monitor {
    pub fn progress_line(&self) -> Option<String> {
        match self {
            Monitor::Copy(monitor) => monitor.progress_line(),
            Monitor::Remove(monitor) => {
                Some(monitor.progress_line()).filter(|line| !line.is_empty())
            }
        }
    }

    pub fn finish_line(&self, exit_status: ExitStatus) -> Option<String> {
        match self {
            Monitor::Copy(monitor) => monitor.finish_line(exit_status),
            Monitor::Remove(monitor) => monitor.finish_line(exit_status),
        }
    }
}

#[derive(Debug, Default)]
struct ScanState {
    end: AtomicBool,
    error: AtomicBool,
}

impl ScanState {
    fn set_error(&self) {
        self.error.store(true, Ordering::SeqCst);
        self.end.store(true, Ordering::SeqCst);
    }

    fn set_end(&self) {
        self.end.store(true, Ordering::SeqCst);
    }

    // Totals can be trusted only when the scan ran to the end without an error.
    fn is_complete(&self) -> bool {
        self.end.load(Ordering::SeqCst) && !self.error.load(Ordering::SeqCst)
    }
}

/// `1234567` is rendered as `1,234,567`.
pub fn format_size(size: i64) -> String {
    let digits = size.unsigned_abs().to_string();
    let head = digits.len() % 3;

    let mut groups = vec![];
    if head != 0 {
        groups.push(&digits[..head]);
    }
    let mut index = head;
    while index < digits.len() {
        groups.push(&digits[index..index + 3]);
        index += 3;
    }

    let sign = if size < 0 { "-" } else { "" };
    format!("{sign}{}", groups.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_groups_thousands() {
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(12), "12");
        assert_eq!(format_size(123), "123");
        assert_eq!(format_size(1234), "1,234");
        assert_eq!(format_size(123456), "123,456");
        assert_eq!(format_size(1234567), "1,234,567");
        assert_eq!(format_size(-1234567), "-1,234,567");
    }

    #[test]
    fn scan_state() {
        let state = ScanState::default();
        assert!(!state.is_complete());
        state.set_end();
        assert!(state.is_complete());
        state.set_error();
        assert!(!state.is_complete());
    }
}
