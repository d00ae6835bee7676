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

use assert_matches::assert_matches;
use scribe_lib::error::ErrorKind;
use scribe_lib::repo::Repository;
use scribe_lib::repo::VerifyStatus;
use testutils::TestRepo;
use testutils::write_test_commit;

/// Rewrites a column of a stored commit behind the repository's back.
fn tamper_with_commit(repo: &Repository, commit_hex: &str, column: &str, value: &str) {
    let db_path = repo.repo_dir().join("scribe.db");
    let conn = rusqlite::Connection::open(db_path).unwrap();
    let updated = conn
        .execute(
            &format!("UPDATE commits SET {column} = ?1 WHERE commit_id = ?2"),
            rusqlite::params![value, commit_hex],
        )
        .unwrap();
    assert_eq!(updated, 1);
}

#[test]
fn test_intact_chain_verifies() {
    let mut test_repo = TestRepo::init();
    let repo = &mut test_repo.repo;
    let first = write_test_commit(repo, "first");
    let second = write_test_commit(repo, "second");

    let report = repo.verify_chain(None).unwrap();
    assert!(report.all_ok());
    assert!(report.parent_links_valid);
    assert_eq!(
        report
            .commits
            .iter()
            .map(|commit| commit.commit_id)
            .collect::<Vec<_>>(),
        [second, first]
    );
    assert!(
        report
            .commits
            .iter()
            .all(|commit| commit.status == VerifyStatus::Ok)
    );
}

#[test]
fn test_tampered_message_fails_verification() {
    let mut test_repo = TestRepo::init();
    let first = write_test_commit(&mut test_repo.repo, "first");
    let second = write_test_commit(&mut test_repo.repo, "second");
    tamper_with_commit(&test_repo.repo, &second.hex(), "message", "rewritten history");

    // Reopen so no cached state can mask the tamper.
    let repo = Repository::open(test_repo.workspace_root()).unwrap();
    let report = repo.verify_chain(None).unwrap();
    assert!(!report.all_ok());
    assert_eq!(report.commits.len(), 2);
    assert_eq!(report.commits[0].commit_id, second);
    assert_eq!(report.commits[0].status, VerifyStatus::HashMismatch);
    assert_eq!(report.commits[0].status.failure_reason(), Some("hash mismatch"));
    assert_eq!(report.commits[1].commit_id, first);
    assert_eq!(report.commits[1].status, VerifyStatus::Ok);
    // Parent links themselves are still intact.
    assert!(report.parent_links_valid);
}

#[test]
fn test_verify_single_commit() {
    let mut test_repo = TestRepo::init();
    let commit_id = write_test_commit(&mut test_repo.repo, "solo");

    let verification = test_repo.repo.verify_commit(&commit_id).unwrap();
    assert_eq!(verification.status, VerifyStatus::Ok);

    tamper_with_commit(&test_repo.repo, &commit_id.hex(), "author_id", "user:mallory");
    let repo = Repository::open(test_repo.workspace_root()).unwrap();
    let verification = repo.verify_commit(&commit_id).unwrap();
    assert_eq!(verification.status, VerifyStatus::HashMismatch);
}

#[test]
fn test_verify_unknown_commit_is_not_found() {
    let test_repo = TestRepo::init();
    let absent = scribe_lib::digest::hash_bytes(b"no such commit");
    assert_matches!(
        test_repo.repo.verify_commit(&absent),
        Err(err) if err.kind() == ErrorKind::NotFound
    );
}

#[test]
fn test_verify_all_covers_every_commit() {
    let mut test_repo = TestRepo::init();
    let repo = &mut test_repo.repo;
    for i in 0..4 {
        write_test_commit(repo, &format!("commit {i}"));
    }
    let report = repo.verify_all().unwrap();
    assert!(report.all_ok());
    assert_eq!(report.commits.len(), 4);
}
