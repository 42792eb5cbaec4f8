//! Styled status lines.
//!
//! Outcome lines go to stdout, diagnostics to stderr. Colors follow the
//! terminal theme and are dropped when the stream is not a terminal or
//! `NO_COLOR` is set.

use std::io::{IsTerminal, Write};

/// Check if colors should be disabled based on NO_COLOR env var.
fn colors_disabled() -> bool {
    std::env::var("NO_COLOR")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

fn is_terminal_output(stderr: bool) -> bool {
    if stderr {
        std::io::stderr().is_terminal()
    } else {
        std::io::stdout().is_terminal()
    }
}

/// ANSI color codes for light terminal backgrounds.
mod light_theme {
    pub const SUCCESS: &str = "\x1b[38;2;0;150;125m";
    pub const ERROR: &str = "\x1b[38;2;217;61;61m";
    pub const WARNING: &str = "\x1b[38;2;201;154;46m";
    pub const DIM: &str = "\x1b[38;2;100;100;100m";
}

/// ANSI color codes for dark terminal backgrounds.
mod dark_theme {
    pub const SUCCESS: &str = "\x1b[38;2;0;245;212m";
    pub const ERROR: &str = "\x1b[38;2;255;107;107m";
    pub const WARNING: &str = "\x1b[38;2;255;200;87m";
    pub const DIM: &str = "\x1b[38;2;130;154;177m";
}

const RESET: &str = "\x1b[0m";

/// Detect a light background from COLORFGBG ("fg;bg"). Dark by default.
fn is_light_theme() -> bool {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|v| v.split(';').next_back().and_then(|bg| bg.parse::<u8>().ok()))
        .map(|bg| bg >= 7)
        .unwrap_or(false)
}

/// Message type for styled output.
#[derive(Debug, Clone, Copy)]
pub enum MessageType {
    Success,
    Error,
    Warning,
    Dim,
}

impl MessageType {
    fn icon(&self) -> &'static str {
        match self {
            MessageType::Success => "[OK]",
            MessageType::Error => "[ERROR]",
            MessageType::Warning => "[WARN]",
            MessageType::Dim => "-",
        }
    }

    fn color(&self) -> &'static str {
        let light = is_light_theme();
        match (self, light) {
            (MessageType::Success, true) => light_theme::SUCCESS,
            (MessageType::Success, false) => dark_theme::SUCCESS,
            (MessageType::Error, true) => light_theme::ERROR,
            (MessageType::Error, false) => dark_theme::ERROR,
            (MessageType::Warning, true) => light_theme::WARNING,
            (MessageType::Warning, false) => dark_theme::WARNING,
            (MessageType::Dim, true) => light_theme::DIM,
            (MessageType::Dim, false) => dark_theme::DIM,
        }
    }
}

fn format_styled(msg_type: MessageType, message: &str, to_stderr: bool) -> String {
    if !colors_disabled() && is_terminal_output(to_stderr) {
        format!("{}{} {}{}", msg_type.color(), msg_type.icon(), message, RESET)
    } else {
        format!("{} {}", msg_type.icon(), message)
    }
}

fn print_styled(msg_type: MessageType, message: &str, to_stderr: bool) {
    let line = format_styled(msg_type, message, to_stderr);
    if to_stderr {
        let _ = writeln!(std::io::stderr(), "{line}");
    } else {
        let _ = writeln!(std::io::stdout(), "{line}");
    }
}

/// Print an error message to stderr.
pub fn print_error(message: &str) {
    print_styled(MessageType::Error, message, true);
}

/// Print a warning message to stderr.
pub fn print_warning(message: &str) {
    print_styled(MessageType::Warning, message, true);
}

/// Print a success message to stdout.
pub fn println_success(message: &str) {
    print_styled(MessageType::Success, message, false);
}

/// Print a dimmed message to stdout.
pub fn println_dim(message: &str) {
    print_styled(MessageType::Dim, message, false);
}
