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

use scribe_lib::repo::VerifyStatus;
use tracing::instrument;

use crate::cli_util::GlobalArgs;
use crate::cli_util::parse_commit_id;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Re-verify commit hashes and parent links
///
/// Walks the chain from the given commit (or HEAD) backwards and recomputes
/// every commit id from the stored fields.
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct VerifyArgs {
    /// Commit to start from (defaults to HEAD)
    commit: Option<String>,
    /// Verify every stored commit, not only the chain
    #[arg(long)]
    full: bool,
}

#[instrument(skip_all)]
pub(crate) fn cmd_verify(
    ui: &Ui,
    global_args: &GlobalArgs,
    args: &VerifyArgs,
) -> Result<(), CommandError> {
    let repo = global_args.load_repo()?;
    let report = if args.full {
        repo.verify_all()?
    } else {
        let from = args
            .commit
            .as_deref()
            .map(parse_commit_id)
            .transpose()?;
        repo.verify_chain(from.as_ref())?
    };

    let mut stdout = ui.stdout();
    let mut failed = 0usize;
    for verification in &report.commits {
        match verification.status.failure_reason() {
            None => writeln!(stdout, "{} OK", verification.commit_id)?,
            Some(reason) => {
                failed += 1;
                writeln!(stdout, "{} FAILED ({reason})", verification.commit_id)?;
            }
        }
        // The global --verbose flag adds parent and change details.
        if global_args.verbose
            && verification.status != VerifyStatus::Missing
            && let Some(envelope) = repo.load_commit(&verification.commit_id)?
        {
            writeln!(stdout, "    parent  {}", envelope.parent_id)?;
            writeln!(stdout, "    changes {}", envelope.changes.len())?;
        }
    }

    let verified = report.commits.len() - failed;
    if failed == 0 && report.parent_links_valid {
        writeln!(stdout, "{verified} commit(s) verified")?;
        writeln!(stdout, "All parent links valid")?;
        Ok(())
    } else {
        writeln!(stdout, "{verified} of {} commit(s) verified", report.commits.len())?;
        if !report.parent_links_valid {
            writeln!(stdout, "Broken parent links detected")?;
        }
        Err(CommandError::new(
            "hash mismatch",
            format!("{failed} commit(s) failed verification"),
        ))
    }
}
