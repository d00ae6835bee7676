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

//! The repository facade: discovery, the on-disk layout, and the atomic
//! commit pipeline.
//!
//! A [`Repository`] owns the commit store, the object store, and the
//! configuration exclusively. It is a single-writer handle; sharing it across
//! threads requires external mutual exclusion. All owned resources are
//! released on drop.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::instrument;

use crate::commit_store::CommitStore;
use crate::commit_store::DEFAULT_HISTORY_LIMIT;
use crate::config::CONFIG_FILE_NAME;
use crate::config::RepoConfig;
use crate::digest::Digest;
use crate::envelope::Envelope;
use crate::error::ErrorKind;
use crate::error::ScribeError;
use crate::error::ScribeResult;
use crate::object_store::ObjectStore;
use crate::refs;

/// Name of the repository directory searched for by [`Repository::open`].
pub const REPO_DIR_NAME: &str = ".scribe";

/// Name of the commit-store database file inside the repository directory.
pub const DB_FILE_NAME: &str = "scribe.db";

/// Name of the object-store directory inside the repository directory.
pub const OBJECTS_DIR_NAME: &str = "objects";

/// Outcome of verifying a single commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyStatus {
    /// The commit hashes to its recorded id.
    Ok,
    /// The stored fields no longer match the recorded id.
    HashMismatch,
    /// The commit is referenced as a parent but absent from the store.
    Missing,
}

impl VerifyStatus {
    /// Failure reason for `FAILED (<reason>)` output, if any.
    pub fn failure_reason(self) -> Option<&'static str> {
        match self {
            Self::Ok => None,
            Self::HashMismatch => Some("hash mismatch"),
            Self::Missing => Some("missing commit"),
        }
    }
}

/// Per-commit verification result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommitVerification {
    /// Id of the verified commit.
    pub commit_id: Digest,
    /// Outcome.
    pub status: VerifyStatus,
}

/// Result of walking and verifying a chain (or the whole store).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VerifyReport {
    /// Per-commit outcomes in walk order (newest first).
    pub commits: Vec<CommitVerification>,
    /// True if every non-zero parent pointer resolved to a stored commit.
    pub parent_links_valid: bool,
}

impl VerifyReport {
    /// True if every commit verified and all parent links resolved.
    pub fn all_ok(&self) -> bool {
        self.parent_links_valid
            && self
                .commits
                .iter()
                .all(|commit| commit.status == VerifyStatus::Ok)
    }
}

/// An opened Scribe repository.
#[derive(Debug)]
pub struct Repository {
    workspace_root: PathBuf,
    repo_dir: PathBuf,
    store: CommitStore,
    objects: ObjectStore,
    config: RepoConfig,
}

impl Repository {
    /// Creates a repository at `workspace_root`: the `.scribe` directory, the
    /// schema-initialized commit store, the object store, the default
    /// configuration, and `HEAD` pointing at the zero sentinel.
    ///
    /// Fails with `RepoExists` if the directory already hosts a repository.
    pub fn init(workspace_root: &Path, config: RepoConfig) -> ScribeResult<Self> {
        let workspace_root = absolute_path(workspace_root)?;
        let repo_dir = workspace_root.join(REPO_DIR_NAME);
        if repo_dir.exists() {
            return Err(ScribeError::RepoExists { path: repo_dir });
        }
        fs::create_dir_all(&workspace_root)
            .map_err(|err| ScribeError::io(&workspace_root, err))?;
        fs::create_dir(&repo_dir).map_err(|err| ScribeError::io(&repo_dir, err))?;
        let objects = ObjectStore::init(&repo_dir.join(OBJECTS_DIR_NAME))?;
        let store = CommitStore::init(&repo_dir.join(DB_FILE_NAME))?;
        store.refs().set(refs::HEAD, Digest::ZERO)?;
        config.save(&repo_dir.join(CONFIG_FILE_NAME))?;
        debug!(repo_dir = %repo_dir.display(), "initialized repository");
        Ok(Self {
            workspace_root,
            repo_dir,
            store,
            objects,
            config,
        })
    }

    /// Opens the repository owning `path`, walking upward until a `.scribe`
    /// directory is found. Fails with `NotARepo` if there is none.
    pub fn open(path: &Path) -> ScribeResult<Self> {
        let start = absolute_path(path)?;
        let Some(workspace_root) = find_workspace_root(&start) else {
            return Err(ScribeError::NotARepo { path: start });
        };
        let repo_dir = workspace_root.join(REPO_DIR_NAME);
        let store = CommitStore::open(&repo_dir.join(DB_FILE_NAME))?;
        let objects = ObjectStore::load(&repo_dir.join(OBJECTS_DIR_NAME));
        let config = RepoConfig::load(&repo_dir.join(CONFIG_FILE_NAME))?;
        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            repo_dir,
            store,
            objects,
            config,
        })
    }

    /// The directory containing `.scribe`.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// The `.scribe` directory.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// The repository configuration as loaded at open time.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// The content-addressed object store.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// The underlying commit store, for read-only queries not wrapped here.
    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    /// Resolves `HEAD`. Zero iff the repository has no commits.
    pub fn head(&self) -> ScribeResult<Digest> {
        self.store.refs().get(refs::HEAD)
    }

    /// Moves `HEAD` without writing a commit.
    pub fn set_head(&mut self, target: Digest) -> ScribeResult<()> {
        self.store.refs().set(refs::HEAD, target)
    }

    /// The atomic writer pipeline: finalizes the envelope, inserts it, and
    /// advances `HEAD`, all in one store transaction. Any failure rolls the
    /// transaction back and surfaces the error; `HEAD` then still points at
    /// the previous tip.
    #[instrument(skip_all)]
    pub fn store_commit(&mut self, envelope: &mut Envelope) -> ScribeResult<Digest> {
        let commit_id = envelope.finalize()?;
        let tx = self.store.transaction()?;
        tx.store_commit(envelope)?;
        tx.refs().set(refs::HEAD, commit_id)?;
        tx.commit()?;
        debug!(commit_id = %commit_id, changes = envelope.changes.len(), "stored commit");
        Ok(commit_id)
    }

    /// Loads a commit with its ordered changes.
    pub fn load_commit(&self, id: &Digest) -> ScribeResult<Option<Envelope>> {
        self.store.load_commit(id)
    }

    /// Walks the parent chain from `from` (default `HEAD`), newest first.
    pub fn get_history(
        &self,
        from: Option<&Digest>,
        limit: Option<usize>,
    ) -> ScribeResult<Vec<Digest>> {
        self.store
            .get_history(from, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
    }

    /// Total number of stored commits.
    pub fn commit_count(&self) -> ScribeResult<u64> {
        self.store.commit_count()
    }

    /// Ids of commits asserted to the given author, newest first.
    pub fn find_by_author(&self, author_id: &str) -> ScribeResult<Vec<Digest>> {
        self.store.find_by_author(author_id)
    }

    /// Ids of commits produced by the given process, newest first.
    pub fn find_by_process(&self, process_name: &str) -> ScribeResult<Vec<Digest>> {
        self.store.find_by_process(process_name)
    }

    /// Verifies a single stored commit against its recorded id.
    pub fn verify_commit(&self, id: &Digest) -> ScribeResult<CommitVerification> {
        let Some(envelope) = self.store.load_commit(id)? else {
            return Err(ScribeError::NotFound(format!("commit {}", id.hex())));
        };
        Ok(CommitVerification {
            commit_id: *id,
            status: verify_status(&envelope),
        })
    }

    /// Walks the chain from `from` (default `HEAD`) and verifies every
    /// commit on it, including that each parent link resolves.
    #[instrument(skip_all)]
    pub fn verify_chain(&self, from: Option<&Digest>) -> ScribeResult<VerifyReport> {
        let start = match from {
            Some(id) => *id,
            None => self.head()?,
        };
        let mut report = VerifyReport {
            commits: vec![],
            parent_links_valid: true,
        };
        let mut current = start;
        while !current.is_zero() {
            let Some(envelope) = self.store.load_commit(&current)? else {
                if current == start {
                    return Err(ScribeError::NotFound(format!("commit {}", current.hex())));
                }
                report.parent_links_valid = false;
                report.commits.push(CommitVerification {
                    commit_id: current,
                    status: VerifyStatus::Missing,
                });
                break;
            };
            report.commits.push(CommitVerification {
                commit_id: current,
                status: verify_status(&envelope),
            });
            current = envelope.parent_id;
        }
        Ok(report)
    }

    /// Verifies every stored commit, reachable or not, and checks all parent
    /// links.
    #[instrument(skip_all)]
    pub fn verify_all(&self) -> ScribeResult<VerifyReport> {
        let mut report = VerifyReport {
            commits: vec![],
            parent_links_valid: true,
        };
        for id in self.store.all_commit_ids()? {
            let Some(envelope) = self.store.load_commit(&id)? else {
                continue;
            };
            report.commits.push(CommitVerification {
                commit_id: id,
                status: verify_status(&envelope),
            });
            if !envelope.parent_id.is_zero()
                && !self.store.commit_exists(&envelope.parent_id)?
            {
                report.parent_links_valid = false;
                report.commits.push(CommitVerification {
                    commit_id: envelope.parent_id,
                    status: VerifyStatus::Missing,
                });
            }
        }
        Ok(report)
    }
}

fn verify_status(envelope: &Envelope) -> VerifyStatus {
    match envelope.verify() {
        Ok(()) => VerifyStatus::Ok,
        Err(err) if err.kind() == ErrorKind::HashMismatch => VerifyStatus::HashMismatch,
        // Serialization failures also mean the stored form cannot reproduce
        // the recorded id.
        Err(_) => VerifyStatus::HashMismatch,
    }
}

fn absolute_path(path: &Path) -> ScribeResult<PathBuf> {
    std::path::absolute(path).map_err(|err| ScribeError::io(path, err))
}

fn find_workspace_root(start: &Path) -> Option<&Path> {
    start
        .ancestors()
        .find(|dir| dir.join(REPO_DIR_NAME).is_dir())
}
