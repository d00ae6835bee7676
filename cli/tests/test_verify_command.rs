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

use crate::common::TestEnv;

/// Rewrites a stored commit column directly in the database.
fn tamper(env: &TestEnv, commit_id: &str, column: &str, value: &str) {
    let conn = rusqlite_open(env);
    let updated = conn
        .execute(
            &format!("UPDATE commits SET {column} = ?1 WHERE commit_id = ?2"),
            rusqlite::params![value, commit_id],
        )
        .unwrap();
    assert_eq!(updated, 1);
}

fn rusqlite_open(env: &TestEnv) -> rusqlite::Connection {
    rusqlite::Connection::open(env.root().join(".scribe/scribe.db")).unwrap()
}

#[test]
fn test_verify_intact_chain() {
    let env = TestEnv::init();
    let first = env.commit_insert("first", r#"{"id": 1}"#);
    let second = env.commit_insert("second", r#"{"id": 2}"#);

    let assert = env.scribe(&["verify"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains(&format!("{second} OK")));
    assert!(stdout.contains(&format!("{first} OK")));
    assert!(stdout.contains("2 commit(s) verified"));
    assert!(stdout.contains("All parent links valid"));
}

#[test]
fn test_verify_reports_tampered_commit() {
    let env = TestEnv::init();
    let first = env.commit_insert("first", r#"{"id": 1}"#);
    let second = env.commit_insert("second", r#"{"id": 2}"#);
    tamper(&env, &second, "message", "rewritten");

    let assert = env.scribe(&["verify"]).assert().failure().code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stdout.contains(&format!("{second} FAILED (hash mismatch)")));
    assert!(stdout.contains(&format!("{first} OK")));
    assert!(stderr.contains("error: hash mismatch"));
}

#[test]
fn test_verify_from_given_commit() {
    let env = TestEnv::init();
    let first = env.commit_insert("first", r#"{"id": 1}"#);
    env.commit_insert("second", r#"{"id": 2}"#);

    let assert = env.scribe(&["verify", &first]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("1 commit(s) verified"));
}

#[test]
fn test_verify_full_covers_unreachable_commits() {
    let env = TestEnv::init();
    let first = env.commit_insert("first", r#"{"id": 1}"#);
    let second = env.commit_insert("second", r#"{"id": 2}"#);

    // Point HEAD back at the first commit; the second is now unreachable
    // from the chain but still in the store.
    let conn = rusqlite_open(&env);
    conn.execute(
        "UPDATE refs SET hash = ?1 WHERE name = 'HEAD'",
        rusqlite::params![first],
    )
    .unwrap();
    drop(conn);

    let assert = env.scribe(&["verify"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("1 commit(s) verified"));

    let assert = env.scribe(&["verify", "--full"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("2 commit(s) verified"));
    assert!(stdout.contains(&format!("{second} OK")));
}

#[test]
fn test_verify_rejects_malformed_commit_id() {
    let env = TestEnv::init();
    let assert = env.scribe(&["verify", "not-a-commit"]).assert().failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("error: invalid argument"));
}
