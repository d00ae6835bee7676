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

#[test]
fn test_commit_prints_id_and_advances_head() {
    let env = TestEnv::init();
    let first = env.commit_insert("first", r#"{"id": 1}"#);
    let second = env.commit_insert("second", r#"{"id": 2}"#);
    assert_ne!(first, second);

    let assert = env.scribe(&["status", "--porcelain"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(
        stdout.contains(&format!("head {second}")),
        "unexpected status: {stdout}"
    );
    assert!(stdout.contains("commits 2"));
}

#[test]
fn test_commit_outside_repo_fails() {
    let env = TestEnv::empty();
    let assert = env
        .scribe(&["commit", "--message", "nope"])
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(
        stderr.contains("error: not a repository"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_commit_update_requires_before_image() {
    let env = TestEnv::init();
    // UPDATE without a before image violates the change invariants.
    env.scribe(&[
        "commit",
        "--table",
        "orders",
        "--operation",
        "UPDATE",
        "--data",
        r#"{"id": 1, "total": 20}"#,
    ])
    .assert()
    .failure()
    .code(1);

    env.scribe(&[
        "commit",
        "--table",
        "orders",
        "--operation",
        "UPDATE",
        "--data",
        r#"{"id": 1, "total": 20}"#,
        "--before-data",
        r#"{"id": 1, "total": 10}"#,
    ])
    .assert()
    .success();
}

#[test]
fn test_commit_rejects_unknown_operation() {
    let env = TestEnv::init();
    let assert = env
        .scribe(&[
            "commit",
            "--table",
            "orders",
            "--operation",
            "UPSERT",
            "--data",
            "{}",
        ])
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(
        stderr.contains("error: invalid argument"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_commit_data_requires_table() {
    let env = TestEnv::init();
    env.scribe(&["commit", "--data", "{}"]).assert().failure();
}
