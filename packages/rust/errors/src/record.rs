//! Normalized in-memory representation of a captured error.

use std::fmt;

/// One captured call-stack frame. Every key is optional; missing values are
/// rendered as `<unknown>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub function: Option<String>,
    pub class: Option<String>,
    /// Call operator between class and function (`::`, `->`, `.`).
    pub call_type: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl StackFrame {
    /// Frame for a free function.
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            function: Some(name.into()),
            ..Self::default()
        }
    }

    /// Frame for a method call rendered as `{class}{call_type}{function}()`.
    pub fn method(
        class: impl Into<String>,
        call_type: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            function: Some(function.into()),
            class: Some(class.into()),
            call_type: Some(call_type.into()),
            ..Self::default()
        }
    }

    /// Attach a source location.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

/// The originating cause of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Cause {
    /// Another captured error.
    Record(Box<ErrorRecord>),
    /// An error from outside the notifier (e.g. a `source()` in a chain).
    External {
        class: String,
        message: String,
        cause: Option<Box<Cause>>,
    },
}

/// Data shared by every error severity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDetails {
    pub message: String,
    /// 0 when the runtime did not report a line.
    pub line: u32,
    /// May be empty.
    pub file: String,
    pub cause: Option<Box<Cause>>,
    pub backtrace: Vec<StackFrame>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    pub fn with_backtrace(mut self, backtrace: Vec<StackFrame>) -> Self {
        self.backtrace = backtrace;
        self
    }

    pub fn with_cause(mut self, cause: Cause) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// A captured error event.
///
/// The four runtime severities come from the classifier; `Exception` covers
/// everything else (any `std::error::Error`, panics) and carries its own
/// type name.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorRecord {
    Notice(ErrorDetails),
    Warning(ErrorDetails),
    Error(ErrorDetails),
    Fatal(ErrorDetails),
    Exception { class: String, details: ErrorDetails },
}

impl ErrorRecord {
    pub fn notice(message: impl Into<String>, line: u32, file: impl Into<String>) -> Self {
        Self::Notice(ErrorDetails::new(message).at(file, line))
    }

    pub fn warning(message: impl Into<String>, line: u32, file: impl Into<String>) -> Self {
        Self::Warning(ErrorDetails::new(message).at(file, line))
    }

    pub fn error(message: impl Into<String>, line: u32, file: impl Into<String>) -> Self {
        Self::Error(ErrorDetails::new(message).at(file, line))
    }

    /// Fatal errors never carry a backtrace.
    pub fn fatal(message: impl Into<String>, line: u32, file: impl Into<String>) -> Self {
        Self::Fatal(ErrorDetails::new(message).at(file, line))
    }

    pub fn exception(class: impl Into<String>, details: ErrorDetails) -> Self {
        Self::Exception {
            class: class.into(),
            details,
        }
    }

    /// Build an `Exception` record from any error value.
    ///
    /// The class is the Rust type name of `E`, or `Error` when the type is
    /// erased behind `dyn Error`; the `source()` chain becomes the cause chain.
    pub fn from_error<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized + 'static,
    {
        let mut details = ErrorDetails::new(err.to_string());
        if let Some(source) = err.source() {
            details.cause = Some(Box::new(external_cause(source)));
        }
        let type_name = std::any::type_name::<E>();
        let class = if type_name.starts_with("dyn ") {
            ERASED_CLASS
        } else {
            type_name
        };
        Self::exception(class, details)
    }

    pub fn details(&self) -> &ErrorDetails {
        match self {
            Self::Notice(d) | Self::Warning(d) | Self::Error(d) | Self::Fatal(d) => d,
            Self::Exception { details, .. } => details,
        }
    }

    /// Replace the backtrace. Ignored for `Fatal`, whose stack is unreliable.
    pub fn with_backtrace(mut self, backtrace: Vec<StackFrame>) -> Self {
        match &mut self {
            Self::Fatal(_) => {}
            Self::Notice(d) | Self::Warning(d) | Self::Error(d) => d.backtrace = backtrace,
            Self::Exception { details, .. } => details.backtrace = backtrace,
        }
        self
    }

    pub fn message(&self) -> &str {
        &self.details().message
    }

    pub fn line(&self) -> u32 {
        self.details().line
    }

    pub fn file(&self) -> &str {
        &self.details().file
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.details().cause.as_deref()
    }

    pub fn backtrace(&self) -> &[StackFrame] {
        &self.details().backtrace
    }

    /// Short type identifier used by skip rules (`Notice`, `Fatal`, or the
    /// last path segment of an exception's type).
    pub fn type_name(&self) -> &str {
        match self {
            Self::Notice(_) => "Notice",
            Self::Warning(_) => "Warning",
            Self::Error(_) => "Error",
            Self::Fatal(_) => "Fatal",
            Self::Exception { class, .. } => short_type_name(class),
        }
    }

    /// Full type path for exceptions, same as [`type_name`](Self::type_name)
    /// otherwise.
    pub fn full_type_name(&self) -> &str {
        match self {
            Self::Exception { class, .. } => class,
            _ => self.type_name(),
        }
    }

    /// Human-readable class shown in the notice.
    pub fn class_name(&self) -> &str {
        match self {
            Self::Fatal(_) => "Fatal Error",
            _ => self.type_name(),
        }
    }

    /// Whether this record matches a configured type identifier, either by
    /// short name or by full path.
    pub fn is_type(&self, identifier: &str) -> bool {
        identifier == self.type_name() || identifier == self.full_type_name()
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name(), self.message())
    }
}

/// Class for errors whose concrete type is erased behind `dyn Error`.
const ERASED_CLASS: &str = "Error";

fn external_cause(err: &(dyn std::error::Error + 'static)) -> Cause {
    // The concrete type is erased behind `dyn Error`; only messages survive.
    Cause::External {
        class: ERASED_CLASS.into(),
        message: err.to_string(),
        cause: err.source().map(|s| Box::new(external_cause(s))),
    }
}

/// `alloc::string::String` → `String`, `my::Wrapper<other::Inner>` → `Wrapper`.
pub fn short_type_name(name: &str) -> &str {
    let without_generics = name.split('<').next().unwrap_or(name);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
