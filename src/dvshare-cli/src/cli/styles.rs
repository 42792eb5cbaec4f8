//! CLI styling for the help output.

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Help theme: cyan headers, green literals.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Yellow.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Cyan.on_default())
        .invalid(AnsiColor::Yellow.on_default())
}

/// After-help section with a quick start and environment variables.
pub const AFTER_HELP: &str = r#"QUICK START
    dvshare create --ttl 2h --note "wip" src/lib.rs   Snapshot files into a share
    dvshare pack <ID>                                Write simlog/dvshare_<ID>.zip
    dvshare apply dvshare_<ID>.zip                   Three-way merge on the receiving side
    dvshare apply dvshare_<ID>.zip --mode copy       Copy files, keeping *.bak backups

ENVIRONMENT VARIABLES
    DVSHARE_LOG_LEVEL          Log verbosity (error, warn, info, debug, trace)
    DVSHARE_GIT_TIMEOUT_SECS   Timeout for each git call, 0 to disable
    NO_COLOR                   Disable colored output

PATHS
    Store       <repo>/.git/dv-share/<ID>/
    Config      <repo>/.dvshare.toml"#;
