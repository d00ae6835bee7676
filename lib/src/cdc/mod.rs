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

//! Change-data-capture ingestion.
//!
//! Two interchangeable upstream sources produce normalized [`RowEvent`]s: a
//! trigger-maintained audit table and a logical-replication slot. The
//! [`ChangeMonitor`] drives either source and turns every event into a
//! single-change commit parented at `HEAD`.

mod logical;
mod monitor;
mod trigger;

pub use self::logical::DEFAULT_SLOT_NAME;
pub use self::logical::LogicalSource;
pub use self::logical::PUBLICATION_NAME;
pub use self::monitor::ChangeMonitor;
pub use self::monitor::DEFAULT_BATCH_SIZE;
pub use self::monitor::DEFAULT_POLL_INTERVAL_MS;
pub use self::monitor::MonitorHandle;
pub use self::trigger::AUDIT_TABLE;
pub use self::trigger::TriggerSource;

use crate::envelope::RowOperation;
use crate::error::ScribeResult;

/// A normalized upstream row mutation, independent of which source observed
/// it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RowEvent {
    /// Unqualified name of the mutated table.
    pub table_name: String,
    /// Kind of mutation.
    pub operation: RowOperation,
    /// JSON representation of the row's primary key.
    pub primary_key_json: String,
    /// JSON of the row before the change, if the upstream exposed it.
    pub before_json: Option<String>,
    /// JSON of the row after the change, if the row still exists.
    pub after_json: Option<String>,
    /// Upstream transaction id.
    pub txid: i64,
    /// Upstream log position, empty if the source has none.
    pub lsn: String,
}

/// An upstream change feed.
///
/// Implementations own their database connection. `poll` returns at most
/// `max_events` events and must consume them from the upstream in the same
/// logical step, so that a crash between `poll` and commit loses at most one
/// batch and never reprocesses one.
pub trait ChangeSource {
    /// Short token identifying the source, recorded as the process source of
    /// generated commits.
    fn name(&self) -> &'static str;

    /// Creates upstream-side plumbing (audit table and triggers, or slot and
    /// publication). Idempotent.
    fn setup(&mut self) -> ScribeResult<()>;

    /// Removes the upstream-side plumbing created by `setup`.
    fn cleanup(&mut self) -> ScribeResult<()>;

    /// Fetches and consumes the next batch of events.
    fn poll(&mut self, max_events: usize) -> ScribeResult<Vec<RowEvent>>;

    /// Drops and re-establishes the upstream connection.
    fn reconnect(&mut self) -> ScribeResult<()>;
}

/// Quotes an identifier for interpolation into upstream SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
