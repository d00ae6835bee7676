// Copyright 2024-2025 The Scribe Authors
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

use std::io::Write as _;
use std::time::Duration;

use scribe_lib::cdc::ChangeMonitor;
use scribe_lib::cdc::ChangeSource;
use scribe_lib::cdc::LogicalSource;
use scribe_lib::cdc::TriggerSource;
use tracing::instrument;

use crate::cli_util::GlobalArgs;
use crate::command_error::CommandError;
use crate::command_error::user_error;
use crate::ui::Ui;

/// How upstream changes are captured.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
enum WatchMode {
    /// Poll an audit table maintained by row-level triggers
    Trigger,
    /// Consume a logical-replication slot
    Logical,
}

/// Watch an upstream database and commit every row change
///
/// Runs until interrupted. Each captured row change becomes one commit
/// parented at HEAD.
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct WatchArgs {
    /// Upstream connection string (defaults to the configured one)
    #[arg(long, value_name = "CONNINFO")]
    connection: Option<String>,
    /// Tables to watch, comma separated (defaults to the configured list)
    #[arg(long, value_delimiter = ',', value_name = "TABLE")]
    tables: Vec<String>,
    /// Capture mechanism
    #[arg(long, value_enum, default_value_t = WatchMode::Trigger)]
    mode: WatchMode,
    /// Idle poll interval in milliseconds
    #[arg(long, default_value = "1000", value_name = "MS")]
    interval: u64,
    /// Replication slot name (logical mode)
    #[arg(long, default_value = scribe_lib::cdc::DEFAULT_SLOT_NAME, value_name = "SLOT")]
    slot: String,
    /// Create the upstream capture plumbing before watching
    #[arg(long)]
    setup: bool,
    /// Remove the upstream capture plumbing and exit
    #[arg(long, conflicts_with = "setup")]
    cleanup: bool,
}

#[instrument(skip_all)]
pub(crate) fn cmd_watch(
    ui: &Ui,
    global_args: &GlobalArgs,
    args: &WatchArgs,
) -> Result<(), CommandError> {
    let repo = global_args.load_repo()?;
    let config = repo.config();

    let connection = args
        .connection
        .clone()
        .or_else(|| config.pg_connection_string.clone())
        .ok_or_else(|| {
            user_error("no connection string; pass --connection or set pg_connection_string")
        })?;
    let tables = if args.tables.is_empty() {
        config.watched_tables.clone()
    } else {
        args.tables.clone()
    };

    let mut source: Box<dyn ChangeSource + Send> = match args.mode {
        WatchMode::Trigger => Box::new(TriggerSource::connect(&connection, tables)?),
        WatchMode::Logical => {
            Box::new(LogicalSource::connect(&connection, args.slot.clone(), tables)?)
        }
    };

    if args.cleanup {
        source.cleanup()?;
        writeln!(ui.status(), "Removed upstream capture plumbing")?;
        return Ok(());
    }
    if args.setup {
        source.setup()?;
        writeln!(ui.status(), "Upstream capture plumbing is in place")?;
    }

    let mut monitor = ChangeMonitor::new(repo, source);
    monitor.set_poll_interval(Duration::from_millis(args.interval.max(1)));
    writeln!(ui.status(), "Watching for changes (interrupt to stop)")?;

    let mut status = ui.status();
    monitor.run(|envelope| {
        let _ = writeln!(
            status,
            "Committed {} ({})",
            &envelope.commit_id.hex()[..12],
            envelope.message.as_deref().unwrap_or("")
        );
    })?;
    Ok(())
}
