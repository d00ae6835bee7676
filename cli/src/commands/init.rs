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
use std::path::PathBuf;

use scribe_lib::config::RepoConfig;
use scribe_lib::repo::Repository;
use tracing::instrument;

use crate::cli_util::GlobalArgs;
use crate::command_error::CommandError;
use crate::ui::Ui;

/// Create a new scribe repository
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct InitArgs {
    /// Directory to initialize (defaults to the working directory)
    path: Option<PathBuf>,
    /// Default author id recorded on commits
    #[arg(long)]
    author: Option<String>,
    /// Default author role recorded on commits
    #[arg(long)]
    role: Option<String>,
}

#[instrument(skip_all)]
pub(crate) fn cmd_init(
    ui: &Ui,
    global_args: &GlobalArgs,
    args: &InitArgs,
) -> Result<(), CommandError> {
    let mut workspace_root = global_args.working_dir();
    if let Some(path) = &args.path {
        workspace_root.push(path);
    }
    let mut config = RepoConfig::default();
    if let Some(author) = &args.author {
        config.author_id = author.clone();
    }
    if let Some(role) = &args.role {
        config.author_role = role.clone();
    }
    let repo = Repository::init(&workspace_root, config)?;
    writeln!(
        ui.status(),
        "Initialized scribe repository in {}",
        repo.workspace_root().display()
    )?;
    Ok(())
}
