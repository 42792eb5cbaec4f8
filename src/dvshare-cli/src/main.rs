//! dvshare - main entry point.
//!
//! Parses arguments, installs logging, runs the command and turns a failure
//! into a diagnostic line and an exit status.

use clap::Parser;

use dvshare_cli::cli::{Cli, ColorMode, LogLevel, dispatch_command};
use dvshare_cli::styled_output::print_error;
use dvshare_share::ShareError;

/// Exit status for a failed command.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ShareError>()
        .map(ShareError::exit_code)
        .unwrap_or(1)
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.trace {
        LogLevel::Trace
    } else if cli.verbose {
        LogLevel::Debug
    } else if let Ok(env_level) = std::env::var("DVSHARE_LOG_LEVEL") {
        LogLevel::from_str_loose(&env_level).unwrap_or(cli.log_level)
    } else {
        cli.log_level
    };

    // RUST_LOG wins for everything outside our own crates.
    let filter = match std::env::var("RUST_LOG") {
        Ok(rust_log) if !rust_log.is_empty() => format!(
            "{},dvshare_cli={},dvshare_share={},dvshare_utils_git={}",
            rust_log,
            log_level.as_filter_str(),
            log_level.as_filter_str(),
            log_level.as_filter_str()
        ),
        _ => log_level.as_filter_str().to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // SAFETY: Environment variable mutations happen early before threads spawn
    match cli.color {
        ColorMode::Never => unsafe { std::env::set_var("NO_COLOR", "1") },
        ColorMode::Always => unsafe { std::env::remove_var("NO_COLOR") },
        ColorMode::Auto => {}
    }

    init_logging(&cli);

    if let Err(err) = dispatch_command(cli) {
        print_error(&format!("{err:#}"));
        std::process::exit(exit_code(&err));
    }
}
