//! Classifies raw runtime error codes into [`ErrorRecord`] severities.

use crate::record::{Cause, ErrorDetails, ErrorRecord, StackFrame};

/// A runtime error code. The associated constants are the documented bit
/// values of the code domain; any other value is accepted and classified as
/// a plain error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const ERROR: Self = Self(1);
    pub const WARNING: Self = Self(2);
    pub const PARSE: Self = Self(4);
    pub const NOTICE: Self = Self(8);
    pub const CORE_ERROR: Self = Self(16);
    pub const CORE_WARNING: Self = Self(32);
    pub const COMPILE_ERROR: Self = Self(64);
    pub const COMPILE_WARNING: Self = Self(128);
    pub const USER_ERROR: Self = Self(256);
    pub const USER_WARNING: Self = Self(512);
    pub const USER_NOTICE: Self = Self(1024);
    pub const STRICT: Self = Self(2048);
    pub const RECOVERABLE_ERROR: Self = Self(4096);
    pub const DEPRECATED: Self = Self(8192);
    pub const USER_DEPRECATED: Self = Self(16384);

    /// Every documented code, in ascending order.
    pub const ALL: [Self; 15] = [
        Self::ERROR,
        Self::WARNING,
        Self::PARSE,
        Self::NOTICE,
        Self::CORE_ERROR,
        Self::CORE_WARNING,
        Self::COMPILE_ERROR,
        Self::COMPILE_WARNING,
        Self::USER_ERROR,
        Self::USER_WARNING,
        Self::USER_NOTICE,
        Self::STRICT,
        Self::RECOVERABLE_ERROR,
        Self::DEPRECATED,
        Self::USER_DEPRECATED,
    ];
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

/// Map a runtime error code to an [`ErrorRecord`].
///
/// Fatal codes drop the backtrace: the stack may be unreliable at that point.
/// Unknown codes fall through to [`ErrorRecord::Error`].
pub fn convert(
    code: impl Into<ErrorCode>,
    message: impl Into<String>,
    cause: Option<Cause>,
    file: impl Into<String>,
    line: u32,
    backtrace: Vec<StackFrame>,
) -> ErrorRecord {
    let mut details = ErrorDetails::new(message).at(file, line);
    details.cause = cause.map(Box::new);

    match code.into() {
        ErrorCode::NOTICE | ErrorCode::USER_NOTICE => {
            ErrorRecord::Notice(details.with_backtrace(backtrace))
        }
        ErrorCode::WARNING | ErrorCode::USER_WARNING => {
            ErrorRecord::Warning(details.with_backtrace(backtrace))
        }
        ErrorCode::RECOVERABLE_ERROR | ErrorCode::ERROR | ErrorCode::CORE_ERROR => {
            ErrorRecord::Fatal(details)
        }
        _ => ErrorRecord::Error(details.with_backtrace(backtrace)),
    }
}
