//! Test helpers shared by the workspace's test suites

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use parking_lot::Mutex;

use crate::diagnostics::{AssertHandler, ErrorCallback, Severity, SourceLocation};

/// A diagnostic report captured by [`RecordingErrorCallback`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    pub message: String,
    pub location: SourceLocation,
}

/// Error callback that keeps every report for later inspection
#[derive(Debug, Default)]
pub struct RecordingErrorCallback {
    reports: Mutex<Vec<Report>>,
}

impl RecordingErrorCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|report| report.severity == severity)
            .count()
    }

    /// True if some report at `severity` mentions `needle`
    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.reports
            .lock()
            .iter()
            .any(|report| report.severity == severity && report.message.contains(needle))
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ErrorCallback for RecordingErrorCallback {
    fn report_error(&self, severity: Severity, message: &str, location: SourceLocation) {
        self.reports.lock().push(Report {
            severity,
            message: message.to_string(),
            location,
        });
    }
}

/// Assert handler that records failures instead of stopping the thread
#[derive(Debug, Default)]
pub struct RecordingAssertHandler {
    failures: Mutex<Vec<String>>,
}

impl RecordingAssertHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }
}

impl AssertHandler for RecordingAssertHandler {
    fn on_assert(&self, expression: &str, _location: SourceLocation) {
        self.failures.lock().push(expression.to_string());
    }
}
