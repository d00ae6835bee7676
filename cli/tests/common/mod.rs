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

use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;

/// An initialized repository in a temp directory, driven through the binary.
pub struct TestEnv {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestEnv {
    /// Creates the environment without initializing a repository.
    pub fn empty() -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("scribe-cli-test-")
            .tempdir()
            .unwrap();
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Creates the environment and runs `scribe init` in it.
    pub fn init() -> Self {
        let env = Self::empty();
        env.scribe(&["init", "--author", "user:alice", "--role", "data_engineer"])
            .assert()
            .success();
        env
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A `scribe` invocation running in the environment root.
    pub fn scribe(&self, args: &[&str]) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("scribe").unwrap();
        cmd.current_dir(&self.root);
        cmd.args(args);
        cmd
    }

    /// Runs a commit with a single INSERT change and returns the new id.
    pub fn commit_insert(&self, message: &str, data: &str) -> String {
        let assert = self
            .scribe(&[
                "commit",
                "--message",
                message,
                "--table",
                "orders",
                "--operation",
                "INSERT",
                "--data",
                data,
            ])
            .assert()
            .success();
        let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
        let id = stdout.trim().to_string();
        assert_eq!(id.len(), 64, "expected a commit id, got {stdout:?}");
        id
    }
}
