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

//! Shared fixtures for scribe-lib tests.

use std::path::Path;

use scribe_lib::config::RepoConfig;
use scribe_lib::digest::Digest;
use scribe_lib::digest::hash_bytes;
use scribe_lib::envelope::Author;
use scribe_lib::envelope::Change;
use scribe_lib::envelope::Envelope;
use scribe_lib::envelope::ProcessInfo;
use scribe_lib::envelope::RowOperation;
use scribe_lib::repo::Repository;
use tempfile::TempDir;

/// Creates a temp directory removed on drop.
pub fn new_temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("scribe-test-")
        .tempdir()
        .unwrap()
}

/// The configuration used by test repositories.
pub fn test_config() -> RepoConfig {
    RepoConfig {
        author_id: "user:alice".to_string(),
        author_role: "data_engineer".to_string(),
        pg_connection_string: None,
        watched_tables: vec![],
    }
}

/// A repository initialized inside its own temp directory.
pub struct TestRepo {
    _temp_dir: TempDir,
    /// The opened repository.
    pub repo: Repository,
}

impl TestRepo {
    /// Initializes a fresh repository.
    pub fn init() -> Self {
        let temp_dir = new_temp_dir();
        let repo = Repository::init(temp_dir.path(), test_config()).unwrap();
        Self {
            _temp_dir: temp_dir,
            repo,
        }
    }

    /// The directory containing `.scribe`.
    pub fn workspace_root(&self) -> &Path {
        self.repo.workspace_root()
    }
}

/// An unfinalized single-change envelope with deterministic content derived
/// from `message`.
pub fn test_envelope(message: &str) -> Envelope {
    let mut envelope = Envelope::new();
    envelope.set_author(Author::new("user:alice", "data_engineer"));
    envelope.set_process(ProcessInfo::new("unit-test"));
    envelope.set_timestamp(1_700_000_000);
    envelope.set_message(message);
    envelope.add_change(
        Change::new(
            "orders",
            RowOperation::Insert,
            format!(r#"{{"id":{}}}"#, message.len()),
            Digest::ZERO,
            hash_bytes(message.as_bytes()),
        )
        .unwrap(),
    );
    envelope
}

/// Parents an envelope at the current `HEAD`, stores it, and returns its id.
pub fn write_test_commit(repo: &mut Repository, message: &str) -> Digest {
    let mut envelope = test_envelope(message);
    envelope.set_parent(repo.head().unwrap());
    repo.store_commit(&mut envelope).unwrap()
}
