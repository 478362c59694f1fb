//! Command dispatch: bridges CLI args -> client sessions -> output formatting.

pub mod check;
pub mod config_cmd;
pub mod param;
pub mod send;
pub mod session;
pub mod status;
pub mod watch;

use hbee_config::ResolvedProfile;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a profile-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    profile: ResolvedProfile,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, profile, global).await,
        Command::Send(args) => send::handle(args, profile, global).await,
        // Handled before dispatch
        Command::Status(_)
        | Command::Config(_)
        | Command::Check(_)
        | Command::Param(_)
        | Command::Completions(_) => unreachable!(),
    }
}
