//! CLI argument structures and parsing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use dvshare_share::ApplyMode;

use super::styles::{AFTER_HELP, get_styles};

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Color output mode for CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if output is a terminal
    #[default]
    Auto,
    /// Always output with colors
    Always,
    /// Never output with colors
    Never,
}

/// dvshare - ephemeral sharing of local changes.
#[derive(Parser, Debug)]
#[command(name = "dvshare")]
#[command(author, version)]
#[command(about = "Ephemeral sharing of local changes", long_about = None)]
#[command(styles = get_styles(), after_help = AFTER_HELP)]
pub struct Cli {
    /// Enable verbose output (same as --log-level debug)
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    /// Enable trace-level logging for debugging
    #[arg(long = "trace", global = true)]
    pub trace: bool,

    /// Set log verbosity level (error, warn, info, debug, trace)
    #[arg(long = "log-level", short = 'L', value_enum, global = true, default_value = "warn")]
    pub log_level: LogLevel,

    /// Control color output: auto (default), always, or never
    #[arg(long = "color", global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Run as if started in DIR
    #[arg(long = "cd", short = 'C', value_name = "DIR", global = true)]
    pub cwd: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a share with selected files
    #[command(display_order = 1)]
    Create(CreateArgs),

    /// Pack a share into a zip
    #[command(display_order = 2)]
    Pack(PackArgs),

    /// List shares
    #[command(visible_alias = "ls", display_order = 3)]
    List,

    /// Show the manifest of a share
    #[command(display_order = 4)]
    Info(ShareIdArgs),

    /// Remove a share
    #[command(visible_alias = "rm", display_order = 5)]
    Remove(ShareIdArgs),

    /// Delete expired and broken shares
    #[command(display_order = 6)]
    Prune,

    /// Apply a zip or extracted folder to the current repository
    #[command(display_order = 7)]
    Apply(ApplyArgs),
}

/// Arguments for `create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Time to live (e.g. 2h, 90m, 3d, 1h30m); defaults to the configured TTL
    #[arg(long)]
    pub ttl: Option<String>,

    /// Custom share id; a timestamp id is generated when absent
    #[arg(long)]
    pub id: Option<String>,

    /// Free-form note
    #[arg(long)]
    pub note: Option<String>,

    /// Files to include
    #[arg(required = true, value_name = "FILES")]
    pub files: Vec<PathBuf>,
}

/// Arguments for `pack`.
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Share id
    pub id: String,

    /// Output directory (default: the configured pack directory)
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

/// A single share id.
#[derive(Args, Debug)]
pub struct ShareIdArgs {
    /// Share id
    pub id: String,
}

/// How `apply` brings a share into the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ApplyModeArg {
    /// Three-way merge of the recorded diff (default)
    #[default]
    Patch,
    /// Copy files over the tree, backing up what they replace
    Copy,
}

impl From<ApplyModeArg> for ApplyMode {
    fn from(mode: ApplyModeArg) -> Self {
        match mode {
            ApplyModeArg::Patch => ApplyMode::Patch,
            ApplyModeArg::Copy => ApplyMode::Copy,
        }
    }
}

/// Arguments for `apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Zip file or extracted folder
    pub source: PathBuf,

    /// Apply mode
    #[arg(long, value_enum, default_value_t = ApplyModeArg::Patch)]
    pub mode: ApplyModeArg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Warn);
    }

    #[test]
    fn test_log_level_from_str_loose() {
        assert_eq!(LogLevel::from_str_loose("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str_loose("loud"), None);
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "dvshare", "create", "--ttl", "2h", "--id", "demo", "--note", "wip", "a.rs", "b.rs",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.ttl.as_deref(), Some("2h"));
        assert_eq!(args.id.as_deref(), Some("demo"));
        assert_eq!(args.files, vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]);
    }

    #[test]
    fn test_create_requires_files() {
        assert!(Cli::try_parse_from(["dvshare", "create"]).is_err());
    }

    #[test]
    fn test_apply_mode_defaults_to_patch() {
        let cli = Cli::try_parse_from(["dvshare", "apply", "x.zip"]).unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(ApplyMode::from(args.mode), ApplyMode::Patch);

        let cli = Cli::try_parse_from(["dvshare", "apply", "dir", "--mode", "copy"]).unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(ApplyMode::from(args.mode), ApplyMode::Copy);

        assert!(Cli::try_parse_from(["dvshare", "apply", "dir", "--mode", "merge"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["dvshare", "list", "-v", "-C", "/tmp"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.cwd, Some(PathBuf::from("/tmp")));
        assert!(matches!(cli.command, Commands::List));
    }
}
