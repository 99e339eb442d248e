//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod diff;
pub mod snapshot;
pub mod watch;

use clap::CommandFactory;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::{CliError, exit_code};

/// Run one command, returning the process exit code on success.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<i32, CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(args, global).await.map(|()| exit_code::SUCCESS),
        Command::Snapshot(args) => snapshot::handle(args, global)
            .await
            .map(|()| exit_code::SUCCESS),
        Command::Diff(args) => diff::handle(&args, global),
        Command::Config(args) => config_cmd::handle(args, global).map(|()| exit_code::SUCCESS),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "worldsync", &mut std::io::stdout());
            Ok(exit_code::SUCCESS)
        }
    }
}
