//! Diagnostic channel - error, warning and assertion reporting
//!
//! Every component reports problems through the single [`DiagnosticChannel`]
//! owned by the foundation. Reports are fire-and-forget: nothing the host
//! callback does flows back into the reporting code.
//!
//! Assertion failures take a separate route. They are first reported on the
//! channel at [`Severity::InternalError`] and then handed to the installed
//! [`AssertHandler`], which can be swapped at runtime independently of the
//! error callback.

use core::fmt;
use core::panic::Location;
use std::sync::Arc;

use parking_lot::RwLock;

/// Severity of a diagnostic report, ordered from least to most severe
///
/// Variants that the taxonomy treats as peers (`Debug`/`Info`,
/// `InvalidParameter`/`InvalidOperation`) are ordered by declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Developer-facing trace output
    Debug,
    /// Informational message
    Info,
    /// Something suspicious that does not affect correctness
    Warning,
    /// A usage pattern that is correct but slow
    PerfWarning,
    /// A caller passed an argument the kernel cannot accept
    InvalidParameter,
    /// A caller asked for an operation that is illegal in the current state
    InvalidOperation,
    /// A kernel invariant was violated
    InternalError,
    /// The allocation gateway could not satisfy a request
    OutOfMemory,
    /// The process cannot reasonably continue
    Abort,
}

impl Severity {
    /// All severities in ascending order
    pub const ALL: [Severity; 9] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::PerfWarning,
        Severity::InvalidParameter,
        Severity::InvalidOperation,
        Severity::InternalError,
        Severity::OutOfMemory,
        Severity::Abort,
    ];

    /// Whether a debugger hook should fire for this severity
    #[inline]
    pub fn is_breakable(self) -> bool {
        self >= Severity::InvalidParameter
    }

    /// Stable display name
    pub const fn name(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::PerfWarning => "performance warning",
            Severity::InvalidParameter => "invalid parameter",
            Severity::InvalidOperation => "invalid operation",
            Severity::InternalError => "internal error",
            Severity::OutOfMemory => "out of memory",
            Severity::Abort => "abort",
        }
    }

    /// The `log` level this severity is forwarded at
    pub fn log_level(self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning | Severity::PerfWarning => log::Level::Warn,
            _ => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file/line pair identifying where a report or allocation originated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// Location of the caller of the enclosing `#[track_caller]` function
    #[track_caller]
    #[inline]
    pub fn caller() -> Self {
        Location::caller().into()
    }
}

impl From<&'static Location<'static>> for SourceLocation {
    fn from(location: &'static Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Host-supplied sink for diagnostic reports
///
/// Implementations must not call back into the kernel.
pub trait ErrorCallback: Send + Sync {
    fn report_error(&self, severity: Severity, message: &str, location: SourceLocation);
}

/// Default callback: forwards every report to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorCallback;

impl ErrorCallback for LogErrorCallback {
    fn report_error(&self, severity: Severity, message: &str, location: SourceLocation) {
        log::log!(severity.log_level(), "[{}] {} ({})", severity, message, location);
    }
}

/// Handler invoked when a kernel invariant check fails
pub trait AssertHandler: Send + Sync {
    fn on_assert(&self, expression: &str, location: SourceLocation);
}

/// Default assert handler: stops the current thread, like a debug breakpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicAssertHandler;

impl AssertHandler for PanicAssertHandler {
    fn on_assert(&self, expression: &str, location: SourceLocation) {
        panic!("keel assertion failed: {} at {}", expression, location);
    }
}

/// Hook fired for breakable severities, the attach point for a debugger
pub trait BreakHook: Send + Sync {
    fn on_break(&self, severity: Severity, message: &str, location: SourceLocation);
}

/// The single reporting channel shared by all kernel components
pub struct DiagnosticChannel {
    callback: Arc<dyn ErrorCallback>,
    assert_handler: RwLock<Arc<dyn AssertHandler>>,
    break_hook: RwLock<Option<Arc<dyn BreakHook>>>,
}

impl DiagnosticChannel {
    /// Create a channel around the host's error callback
    pub fn new(callback: Arc<dyn ErrorCallback>) -> Self {
        Self {
            callback,
            assert_handler: RwLock::new(Arc::new(PanicAssertHandler)),
            break_hook: RwLock::new(None),
        }
    }

    /// Report a diagnostic at an explicit location
    pub fn report(&self, severity: Severity, message: &str, location: SourceLocation) {
        self.callback.report_error(severity, message, location);

        if severity.is_breakable() {
            let hook = self.break_hook.read().clone();
            if let Some(hook) = hook {
                hook.on_break(severity, message, location);
            }
        }
    }

    /// Report a diagnostic attributed to the caller
    #[track_caller]
    pub fn report_here(&self, severity: Severity, message: &str) {
        self.report(severity, message, SourceLocation::caller());
    }

    /// Report a failed invariant and hand it to the assert handler
    pub fn assert_failed(&self, expression: &str, location: SourceLocation) {
        self.report(
            Severity::InternalError,
            &format!("assertion failed: {}", expression),
            location,
        );
        let handler = self.assert_handler.read().clone();
        handler.on_assert(expression, location);
    }

    /// Replace the assert handler, returning the previous one
    pub fn set_assert_handler(&self, handler: Arc<dyn AssertHandler>) -> Arc<dyn AssertHandler> {
        core::mem::replace(&mut *self.assert_handler.write(), handler)
    }

    /// Install or clear the debugger hook
    pub fn set_break_hook(&self, hook: Option<Arc<dyn BreakHook>>) {
        *self.break_hook.write() = hook;
    }

    /// The host callback this channel forwards to
    pub fn callback(&self) -> &Arc<dyn ErrorCallback> {
        &self.callback
    }
}

impl Default for DiagnosticChannel {
    fn default() -> Self {
        Self::new(Arc::new(LogErrorCallback))
    }
}

impl fmt::Debug for DiagnosticChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticChannel")
            .field("break_hook", &self.break_hook.read().is_some())
            .finish()
    }
}
