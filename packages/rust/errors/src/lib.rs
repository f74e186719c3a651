//! Error model for the Errbit notifier.
//!
//! This crate provides:
//! - [`ErrorRecord`] — the captured error (Notice/Warning/Error/Fatal/Exception)
//! - [`convert`] — classification of raw runtime error codes
//! - [`capture_backtrace`] — `std::backtrace` to [`StackFrame`] conversion

mod backtrace;
mod convert;
mod record;

pub use backtrace::{capture_backtrace, frames_from_backtrace, parse_backtrace};
pub use convert::{ErrorCode, convert};
pub use record::{Cause, ErrorDetails, ErrorRecord, StackFrame, short_type_name};
