// Copyright 2024-2025 The Scribe Authors
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

use std::collections::VecDeque;
use std::time::Duration;

use scribe_lib::cdc::ChangeMonitor;
use scribe_lib::cdc::ChangeSource;
use scribe_lib::cdc::RowEvent;
use scribe_lib::digest::hash_bytes;
use scribe_lib::envelope::RowOperation;
use scribe_lib::error::ScribeError;
use scribe_lib::error::ScribeResult;
use testutils::TestRepo;

/// In-memory change source: batches are handed out in order, interleaved
/// with scripted errors.
#[derive(Default)]
struct FakeSource {
    batches: VecDeque<ScribeResult<Vec<RowEvent>>>,
}

impl FakeSource {
    fn push_events(&mut self, events: Vec<RowEvent>) {
        self.batches.push_back(Ok(events));
    }

    fn push_error(&mut self, err: ScribeError) {
        self.batches.push_back(Err(err));
    }
}

impl ChangeSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn setup(&mut self) -> ScribeResult<()> {
        Ok(())
    }

    fn cleanup(&mut self) -> ScribeResult<()> {
        Ok(())
    }

    fn poll(&mut self, _max_events: usize) -> ScribeResult<Vec<RowEvent>> {
        self.batches.pop_front().unwrap_or_else(|| Ok(vec![]))
    }

    fn reconnect(&mut self) -> ScribeResult<()> {
        Ok(())
    }
}

fn insert_event(id: i64) -> RowEvent {
    RowEvent {
        table_name: "orders".to_string(),
        operation: RowOperation::Insert,
        primary_key_json: format!(r#"{{"id":{id}}}"#),
        before_json: None,
        after_json: Some(format!(r#"{{"id":{id},"total":10}}"#)),
        txid: 7000 + id,
        lsn: format!("0/16B{id:04X}"),
    }
}

fn update_event(id: i64) -> RowEvent {
    RowEvent {
        table_name: "orders".to_string(),
        operation: RowOperation::Update,
        primary_key_json: format!(r#"{{"id":{id}}}"#),
        before_json: Some(format!(r#"{{"id":{id},"total":10}}"#)),
        after_json: Some(format!(r#"{{"id":{id},"total":20}}"#)),
        txid: 8000 + id,
        lsn: String::new(),
    }
}

#[test]
fn test_events_become_chained_commits() {
    let test_repo = TestRepo::init();
    let mut source = FakeSource::default();
    source.push_events(vec![insert_event(1), update_event(1)]);

    let mut monitor = ChangeMonitor::new(test_repo.repo, Box::new(source));
    monitor.set_poll_interval(Duration::from_millis(1));
    let handle = monitor.handle();

    let mut seen = vec![];
    monitor
        .run(|envelope| {
            seen.push(envelope.clone());
            if seen.len() == 2 {
                handle.stop();
            }
        })
        .unwrap();

    let repo = monitor.into_repo();
    assert_eq!(repo.commit_count().unwrap(), 2);
    assert_eq!(seen.len(), 2);

    // The insert commit is the root; the update commit is parented on it.
    let insert_commit = &seen[0];
    let update_commit = &seen[1];
    assert!(insert_commit.parent_id.is_zero());
    assert_eq!(update_commit.parent_id, insert_commit.commit_id);
    assert_eq!(repo.head().unwrap(), update_commit.commit_id);

    // Author comes from the repository configuration, the process token
    // carries the upstream transaction id.
    assert_eq!(insert_commit.author.id, "user:alice");
    assert_eq!(insert_commit.process.name, "cdc:txid:7001");
    assert_eq!(insert_commit.process.source.as_deref(), Some("fake"));

    // The change digests are the hashes of the row images.
    let change = &insert_commit.changes[0];
    assert_eq!(change.operation, RowOperation::Insert);
    assert!(change.before_digest.is_zero());
    assert_eq!(
        change.after_digest,
        hash_bytes(br#"{"id":1,"total":10}"#)
    );

    // Everything the monitor wrote verifies.
    assert!(repo.verify_chain(None).unwrap().all_ok());
}

#[test]
fn test_monitor_reconnects_after_connection_error() {
    let test_repo = TestRepo::init();
    let mut source = FakeSource::default();
    source.push_error(ScribeError::PgConnect("simulated outage".to_string()));
    source.push_events(vec![insert_event(2)]);

    let mut monitor = ChangeMonitor::new(test_repo.repo, Box::new(source));
    monitor.set_poll_interval(Duration::from_millis(1));
    let handle = monitor.handle();

    let mut commits = 0;
    monitor
        .run(|_envelope| {
            commits += 1;
            handle.stop();
        })
        .unwrap();

    // The loop survived the outage and processed the next batch.
    assert_eq!(commits, 1);
    assert_eq!(monitor.repo().commit_count().unwrap(), 1);
}

#[test]
fn test_monitor_surfaces_non_connection_errors() {
    let test_repo = TestRepo::init();
    let mut source = FakeSource::default();
    source.push_error(ScribeError::invalid_argument("poison batch"));

    let mut monitor = ChangeMonitor::new(test_repo.repo, Box::new(source));
    monitor.set_poll_interval(Duration::from_millis(1));
    assert!(monitor.run(|_envelope| {}).is_err());
}

#[test]
fn test_stop_before_first_batch() {
    let test_repo = TestRepo::init();
    let mut monitor = ChangeMonitor::new(test_repo.repo, Box::new(FakeSource::default()));
    monitor.set_poll_interval(Duration::from_millis(1));
    monitor.handle().stop();
    monitor.run(|_envelope| {}).unwrap();
    assert_eq!(monitor.repo().commit_count().unwrap(), 0);
}
