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

//! The blocking monitor loop that turns upstream events into commits.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::cdc::ChangeSource;
use crate::cdc::RowEvent;
use crate::digest::Digest;
use crate::digest::hash_bytes;
use crate::envelope::Author;
use crate::envelope::Change;
use crate::envelope::Envelope;
use crate::envelope::ProcessInfo;
use crate::error::ScribeResult;
use crate::repo::Repository;

/// Default idle sleep between polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default maximum number of events fetched per poll.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Backoff applied after an upstream connection error before reconnecting.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Requests that a running [`ChangeMonitor`] stop after its current batch.
///
/// Handles are cheap to clone and safe to trigger from another thread.
#[derive(Clone, Debug)]
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
}

impl MonitorHandle {
    /// Asks the monitor loop to exit. The loop observes the flag between
    /// batches; the in-flight batch is finished first.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Drives a [`ChangeSource`] and commits every observed row event.
pub struct ChangeMonitor {
    repo: Repository,
    source: Box<dyn ChangeSource + Send>,
    poll_interval: Duration,
    batch_size: usize,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for ChangeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeMonitor")
            .field("poll_interval", &self.poll_interval)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl ChangeMonitor {
    /// Creates a monitor over the given repository and source.
    pub fn new(repo: Repository, source: Box<dyn ChangeSource + Send>) -> Self {
        Self {
            repo,
            source,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            batch_size: DEFAULT_BATCH_SIZE,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the idle sleep between polls.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    /// Overrides the per-poll batch size.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    /// A handle that can stop the loop from another thread.
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// The monitored repository.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Tears the monitor down, returning the repository.
    pub fn into_repo(self) -> Repository {
        self.repo
    }

    /// Runs the blocking poll loop until [`MonitorHandle::stop`] is called.
    ///
    /// `observer` is invoked with each committed envelope. Upstream
    /// connection failures are logged, backed off for one second, and the
    /// connection is re-established; every other error stops the loop and
    /// surfaces.
    #[instrument(skip_all)]
    pub fn run(&mut self, mut observer: impl FnMut(&Envelope)) -> ScribeResult<()> {
        while !self.stop.load(Ordering::Relaxed) {
            match self.source.poll(self.batch_size) {
                Ok(events) if events.is_empty() => {
                    std::thread::sleep(self.poll_interval);
                }
                Ok(events) => {
                    debug!(count = events.len(), "processing upstream batch");
                    for event in events {
                        let envelope = self.commit_event(event)?;
                        observer(&envelope);
                    }
                }
                Err(err) if err.is_upstream_connection_error() => {
                    warn!(error = %err, "upstream connection lost; reconnecting");
                    std::thread::sleep(RECONNECT_BACKOFF);
                    if let Err(err) = self.source.reconnect() {
                        warn!(error = %err, "reconnect failed; will retry");
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn commit_event(&mut self, event: RowEvent) -> ScribeResult<Envelope> {
        let RowEvent {
            table_name,
            operation,
            primary_key_json,
            before_json,
            after_json,
            txid,
            lsn,
        } = event;

        let change = Change::new(
            table_name.clone(),
            operation,
            primary_key_json,
            json_digest(before_json.as_deref()),
            json_digest(after_json.as_deref()),
        )?;

        let mut envelope = Envelope::new();
        envelope.set_parent(self.repo.head()?);
        envelope.set_author(self.author());
        envelope.set_process(ProcessInfo {
            name: format!("cdc:txid:{txid}"),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            params: (!lsn.is_empty()).then_some(lsn),
            source: Some(self.source.name().to_string()),
        });
        envelope.set_message(format!("{operation} on {table_name}"));
        envelope.add_change(change);
        self.repo.store_commit(&mut envelope)?;
        Ok(envelope)
    }

    fn author(&self) -> Author {
        let config = self.repo.config();
        if config.author_id.is_empty() {
            // Fall back to a service identity when the repository has no
            // configured author.
            Author::new("service:scribe-monitor", "service")
        } else {
            Author::new(&config.author_id, &config.author_role)
        }
    }
}

/// Digest of an upstream row image. Absent or empty JSON means "no image"
/// and maps to the zero digest.
fn json_digest(json: Option<&str>) -> Digest {
    match json {
        None | Some("") => Digest::ZERO,
        Some(json) => hash_bytes(json.as_bytes()),
    }
}
