//! dvshare CLI library.
//!
//! - `cli/` - argument parsing and dispatch
//! - `share_cmd` - the share commands and their output
//! - `styled_output` - status lines

pub mod cli;
pub mod share_cmd;
pub mod styled_output;
