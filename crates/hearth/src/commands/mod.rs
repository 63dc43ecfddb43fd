//! Command dispatch: bridges CLI args -> session operations -> output formatting.

pub mod auth;
pub mod config_cmd;
pub mod control;
pub mod status;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => auth::login(args, global).await,
        Command::Logout => auth::logout(global).await,
        Command::Status => status::status(global).await,
        Command::Watch(args) => status::watch(args, global).await,
        Command::Set(args) => control::set(args, global).await,
        Command::Away(args) => control::away(args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
