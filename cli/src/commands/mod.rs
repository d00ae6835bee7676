// Copyright 2023-2025 The Scribe Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod commit;
mod init;
mod log;
mod status;
mod verify;
mod watch;

use std::process::ExitCode;

use clap::Parser as _;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;

use crate::cli_util::GlobalArgs;
use crate::cli_util::init_tracing;
use crate::command_error::CommandError;
use crate::ui::Ui;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().bold())
    .usage(AnsiColor::Yellow.on_default().bold())
    .literal(AnsiColor::Green.on_default().bold())
    .placeholder(AnsiColor::Green.on_default());

/// Scribe records verifiable data lineage over mutable datastores
#[derive(clap::Parser, Clone, Debug)]
#[command(name = "scribe", version)]
#[command(styles = STYLES)]
#[command(disable_help_subcommand = true)]
struct Args {
    #[command(flatten)]
    global_args: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Clone, Debug)]
enum Command {
    Init(init::InitArgs),
    Commit(commit::CommitArgs),
    Log(log::LogArgs),
    Status(status::StatusArgs),
    Verify(verify::VerifyArgs),
    Watch(watch::WatchArgs),
}

fn dispatch(ui: &Ui, args: &Args) -> Result<(), CommandError> {
    match &args.command {
        Command::Init(sub_args) => init::cmd_init(ui, &args.global_args, sub_args),
        Command::Commit(sub_args) => commit::cmd_commit(ui, &args.global_args, sub_args),
        Command::Log(sub_args) => log::cmd_log(ui, &args.global_args, sub_args),
        Command::Status(sub_args) => status::cmd_status(ui, &args.global_args, sub_args),
        Command::Verify(sub_args) => verify::cmd_verify(ui, &args.global_args, sub_args),
        Command::Watch(sub_args) => watch::cmd_watch(ui, &args.global_args, sub_args),
    }
}

pub(crate) fn run() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.global_args.verbose);
    let ui = Ui::new(args.global_args.quiet);
    match dispatch(&ui, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
