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

use scribe_lib::digest::Digest;
use scribe_lib::digest::hash_bytes;
use scribe_lib::envelope::Author;
use scribe_lib::envelope::Change;
use scribe_lib::envelope::Envelope;
use scribe_lib::envelope::ProcessInfo;
use scribe_lib::envelope::RowOperation;
use tracing::instrument;

use crate::cli_util::GlobalArgs;
use crate::command_error::CommandError;
use crate::command_error::user_error;
use crate::ui::Ui;

/// Record a commit by hand
///
/// Most commits are produced by `scribe watch`; this creates one from the
/// command line, optionally with a single row change described by `--table`,
/// `--operation` and the row images.
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct CommitArgs {
    /// Commit message
    #[arg(long, short = 'm')]
    message: Option<String>,
    /// Author id (defaults to the configured author)
    #[arg(long)]
    author: Option<String>,
    /// Author role (defaults to the configured role)
    #[arg(long)]
    role: Option<String>,
    /// Name of the process that made the change
    #[arg(long, default_value = "scribe-cli")]
    process: String,
    /// Version of the process that made the change
    #[arg(long, value_name = "VERSION")]
    version: Option<String>,
    /// Table the change applies to
    #[arg(long, requires = "operation")]
    table: Option<String>,
    /// Row operation: INSERT, UPDATE or DELETE
    #[arg(long, requires = "table")]
    operation: Option<String>,
    /// JSON of the row after the change (omit for DELETE)
    #[arg(long, value_name = "JSON")]
    data: Option<String>,
    /// JSON of the row before the change (required for UPDATE and DELETE)
    #[arg(long, value_name = "JSON")]
    before_data: Option<String>,
}

#[instrument(skip_all)]
pub(crate) fn cmd_commit(
    ui: &Ui,
    global_args: &GlobalArgs,
    args: &CommitArgs,
) -> Result<(), CommandError> {
    let mut repo = global_args.load_repo()?;

    let mut envelope = Envelope::new();
    envelope.set_parent(repo.head()?);
    envelope.set_author(Author::new(
        args.author
            .clone()
            .unwrap_or_else(|| repo.config().author_id.clone()),
        args.role
            .clone()
            .unwrap_or_else(|| repo.config().author_role.clone()),
    ));
    let mut process = ProcessInfo::new(&args.process);
    process.version = args.version.clone();
    envelope.set_process(process);
    if let Some(message) = &args.message {
        envelope.set_message(message);
    }

    if let Some(table) = &args.table {
        let operation: RowOperation = args
            .operation
            .as_ref()
            .unwrap()
            .to_uppercase()
            .parse()
            .map_err(CommandError::from)?;
        let before_digest = json_digest(args.before_data.as_deref());
        let after_digest = json_digest(args.data.as_deref());
        let primary_key = primary_key_of(args.data.as_deref(), args.before_data.as_deref());
        envelope.add_change(Change::new(
            table.clone(),
            operation,
            primary_key,
            before_digest,
            after_digest,
        )?);
    } else if args.data.is_some() || args.before_data.is_some() {
        return Err(user_error("--data requires --table and --operation"));
    }

    let commit_id = repo.store_commit(&mut envelope)?;
    writeln!(ui.stdout(), "{commit_id}")?;
    writeln!(
        ui.status(),
        "Created commit {} with {} change(s)",
        &commit_id.hex()[..12],
        envelope.changes.len()
    )?;
    Ok(())
}

fn json_digest(json: Option<&str>) -> Digest {
    match json {
        None | Some("") => Digest::ZERO,
        Some(json) => hash_bytes(json.as_bytes()),
    }
}

/// Derives the recorded primary key from the row images: the `id` field when
/// the image parses as an object that has one, otherwise the whole image.
fn primary_key_of(data: Option<&str>, before_data: Option<&str>) -> String {
    let image = data.or(before_data).unwrap_or("{}");
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(image)
        && let Some(id) = map.get("id")
    {
        return serde_json::json!({ "id": id }).to_string();
    }
    image.to_string()
}
