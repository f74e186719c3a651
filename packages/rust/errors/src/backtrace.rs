//! Turns `std::backtrace::Backtrace` output into [`StackFrame`]s.
//!
//! The textual format of `Backtrace` is not a stable API, so parsing is
//! best-effort: anything that does not look like a frame line or an `at`
//! location line is ignored.

use std::backtrace::Backtrace;
use std::sync::LazyLock;

use regex::Regex;

use crate::record::StackFrame;

/// Capture the current stack, skipping the capture machinery itself.
pub fn capture_backtrace() -> Vec<StackFrame> {
    frames_from_backtrace(&Backtrace::force_capture())
}

/// Convert an already captured backtrace.
pub fn frames_from_backtrace(backtrace: &Backtrace) -> Vec<StackFrame> {
    parse_backtrace(&backtrace.to_string())
        .into_iter()
        .filter(|frame| !is_capture_frame(frame))
        .collect()
}

/// Parse the `Display` output of a `Backtrace`.
pub fn parse_backtrace(text: &str) -> Vec<StackFrame> {
    static FRAME_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\s*\d+:\s+(.+?)\s*$").expect("valid regex"));
    static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s+at\s+(.+?):(\d+)(?::\d+)?\s*$").expect("valid regex")
    });

    let mut frames: Vec<StackFrame> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = LOCATION_RE.captures(line) {
            if let Some(frame) = frames.last_mut().filter(|f| f.file.is_none()) {
                frame.file = Some(caps[1].to_string());
                frame.line = caps[2].parse().ok();
            }
        } else if let Some(caps) = FRAME_RE.captures(line) {
            frames.push(split_symbol(&caps[1]));
        }
    }

    frames
}

/// `app::cart::Cart::checkout` → class `app::cart::Cart`, type `::`,
/// function `checkout`.
fn split_symbol(symbol: &str) -> StackFrame {
    if symbol == "<unknown>" {
        return StackFrame::default();
    }

    match symbol.rsplit_once("::") {
        Some((class, function)) if !class.is_empty() && !function.is_empty() => {
            StackFrame::method(class, "::", function)
        }
        _ => StackFrame::function(symbol),
    }
}

fn is_capture_frame(frame: &StackFrame) -> bool {
    let class = frame.class.as_deref().unwrap_or_default();
    class.starts_with("std::backtrace") || class.starts_with(module_path!())
}
