//! Command dispatch.

use anyhow::Result;

use super::args::{Cli, Commands};
use crate::share_cmd::{self, ShareContext};

/// Dispatch a CLI command to its handler.
pub fn dispatch_command(cli: Cli) -> Result<()> {
    let cwd = match cli.cwd {
        Some(dir) => std::env::current_dir()?.join(dir),
        None => std::env::current_dir()?,
    };
    let ctx = ShareContext::open(&cwd)?;

    match cli.command {
        Commands::Create(args) => share_cmd::run_create(&ctx, args),
        Commands::Pack(args) => share_cmd::run_pack(&ctx, args),
        Commands::List => share_cmd::run_list(&ctx),
        Commands::Info(args) => share_cmd::run_info(&ctx, args),
        Commands::Remove(args) => share_cmd::run_remove(&ctx, args),
        Commands::Prune => share_cmd::run_prune(&ctx),
        Commands::Apply(args) => share_cmd::run_apply(&ctx, args),
    }
}
