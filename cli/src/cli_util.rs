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

use std::path::PathBuf;

use scribe_lib::digest::Digest;
use scribe_lib::repo::Repository;

use crate::command_error::CommandError;
use crate::command_error::user_error;

/// Arguments recognized by every subcommand.
#[derive(clap::Args, Clone, Debug)]
#[command(next_help_heading = "Global Options")]
pub(crate) struct GlobalArgs {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
    /// Silence status messages (errors are still printed)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
    /// Run as if scribe was started in PATH instead of the current working
    /// directory
    #[arg(long = "directory", short = 'C', global = true, value_name = "PATH")]
    pub directory: Option<PathBuf>,
}

impl GlobalArgs {
    /// The directory commands operate from.
    pub(crate) fn working_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Opens the repository containing the working directory.
    pub(crate) fn load_repo(&self) -> Result<Repository, CommandError> {
        Ok(Repository::open(&self.working_dir())?)
    }
}

/// Parses a full commit id given on the command line.
pub(crate) fn parse_commit_id(text: &str) -> Result<Digest, CommandError> {
    Digest::try_from_hex(text)
        .ok_or_else(|| user_error(format!("invalid commit id {text:?} (expected 64 hex digits)")))
}

/// Sets up the tracing subscriber; `--verbose` raises the default filter to
/// debug level.
pub(crate) fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
