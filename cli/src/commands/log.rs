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

use std::io::Write as _;

use chrono::TimeZone as _;
use scribe_lib::envelope::Envelope;
use scribe_lib::repo::Repository;
use tracing::instrument;

use crate::cli_util::GlobalArgs;
use crate::cli_util::parse_commit_id;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show commit history
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct LogArgs {
    /// Commit to start from (defaults to HEAD)
    commit: Option<String>,
    /// One line per commit
    #[arg(long)]
    oneline: bool,
    /// Maximum number of commits to show
    #[arg(long, short = 'n', default_value = "100", value_name = "N")]
    limit: usize,
    /// Only commits asserted to this author id
    #[arg(long, value_name = "AUTHOR")]
    author: Option<String>,
    /// Only commits produced by this process
    #[arg(long, value_name = "PROCESS")]
    process: Option<String>,
    /// Emit the canonical commit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[instrument(skip_all)]
pub(crate) fn cmd_log(
    ui: &Ui,
    global_args: &GlobalArgs,
    args: &LogArgs,
) -> Result<(), CommandError> {
    let repo = global_args.load_repo()?;

    let ids = match (&args.author, &args.process) {
        (Some(author), _) => repo.find_by_author(author)?,
        (None, Some(process)) => repo.find_by_process(process)?,
        (None, None) => {
            let from = args
                .commit
                .as_deref()
                .map(parse_commit_id)
                .transpose()?;
            repo.get_history(from.as_ref(), Some(args.limit))?
        }
    };

    let mut envelopes = vec![];
    for id in ids {
        let Some(envelope) = repo.load_commit(&id)? else {
            continue;
        };
        // With --author, --process is an additional filter on the result.
        if let Some(process) = &args.process
            && args.author.is_some()
            && &envelope.process.name != process
        {
            continue;
        }
        envelopes.push(envelope);
        if envelopes.len() == args.limit {
            break;
        }
    }

    if args.json {
        write_json(ui, &envelopes)
    } else if args.oneline {
        write_oneline(ui, &envelopes)
    } else {
        write_full(ui, &repo, &envelopes)
    }
}

fn write_json(ui: &Ui, envelopes: &[Envelope]) -> Result<(), CommandError> {
    let mut values = Vec::with_capacity(envelopes.len());
    for envelope in envelopes {
        let canonical = envelope.canonical_json()?;
        let value: serde_json::Value = serde_json::from_slice(&canonical)
            .map_err(|err| CommandError::new("json parse", err.to_string()))?;
        values.push(value);
    }
    let mut stdout = ui.stdout();
    writeln!(stdout, "{}", serde_json::Value::Array(values))?;
    Ok(())
}

fn write_oneline(ui: &Ui, envelopes: &[Envelope]) -> Result<(), CommandError> {
    let mut stdout = ui.stdout();
    for envelope in envelopes {
        writeln!(
            stdout,
            "{} {}",
            &envelope.commit_id.hex()[..12],
            envelope.message.as_deref().unwrap_or("(no message)")
        )?;
    }
    Ok(())
}

fn write_full(ui: &Ui, repo: &Repository, envelopes: &[Envelope]) -> Result<(), CommandError> {
    let head = repo.head()?;
    let mut stdout = ui.stdout();
    for envelope in envelopes {
        let head_marker = if envelope.commit_id == head {
            " (HEAD)"
        } else {
            ""
        };
        writeln!(stdout, "commit {}{}", envelope.commit_id, head_marker)?;
        write!(stdout, "Author:  {}", envelope.author.id)?;
        if !envelope.author.role.is_empty() {
            write!(stdout, " ({})", envelope.author.role)?;
        }
        writeln!(stdout)?;
        write!(stdout, "Process: {}", envelope.process.name)?;
        if let Some(version) = &envelope.process.version {
            write!(stdout, " {version}")?;
        }
        writeln!(stdout)?;
        writeln!(stdout, "Date:    {}", format_timestamp(envelope.timestamp))?;
        if let Some(message) = &envelope.message {
            writeln!(stdout)?;
            writeln!(stdout, "    {message}")?;
        }
        if !envelope.changes.is_empty() {
            writeln!(stdout)?;
            for change in &envelope.changes {
                writeln!(
                    stdout,
                    "    {} {} pk={}",
                    change.operation, change.table_name, change.primary_key
                )?;
            }
        }
        writeln!(stdout)?;
    }
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    match chrono::Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(datetime) => {
            datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
        }
        _ => format!("@{timestamp}"),
    }
}
