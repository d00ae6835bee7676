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

use tracing::instrument;

use crate::cli_util::GlobalArgs;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Show HEAD and repository configuration
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct StatusArgs {
    /// Stable machine-readable output
    #[arg(long)]
    porcelain: bool,
}

#[instrument(skip_all)]
pub(crate) fn cmd_status(
    ui: &Ui,
    global_args: &GlobalArgs,
    args: &StatusArgs,
) -> Result<(), CommandError> {
    let repo = global_args.load_repo()?;
    let head = repo.head()?;
    let commit_count = repo.commit_count()?;
    let config = repo.config();
    let mut stdout = ui.stdout();

    if args.porcelain {
        writeln!(stdout, "root {}", repo.workspace_root().display())?;
        writeln!(stdout, "head {}", if head.is_zero() { String::new() } else { head.hex() })?;
        writeln!(stdout, "commits {commit_count}")?;
        writeln!(stdout, "author {}", config.author_id)?;
        writeln!(stdout, "role {}", config.author_role)?;
        return Ok(());
    }

    writeln!(stdout, "Repository: {}", repo.workspace_root().display())?;
    if head.is_zero() {
        writeln!(stdout, "HEAD:       (no commits yet)")?;
    } else {
        writeln!(stdout, "HEAD:       {head}")?;
    }
    writeln!(stdout, "Commits:    {commit_count}")?;
    writeln!(stdout, "Author:     {} ({})", config.author_id, config.author_role)?;
    if let Some(connection) = &config.pg_connection_string {
        writeln!(stdout, "Upstream:   {connection}")?;
    }
    if !config.watched_tables.is_empty() {
        writeln!(stdout, "Watched:    {}", config.watched_tables.join(", "))?;
    }
    Ok(())
}
