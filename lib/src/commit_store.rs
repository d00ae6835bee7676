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

//! Persistent commit store backed by SQLite.
//!
//! Commits are keyed by the hex of their `commit_id`; every change of a
//! commit is a child row under a foreign key. Secondary indexes serve the
//! by-author, by-process and history queries. Writes happen inside a
//! [`StoreTransaction`] that rolls back on drop, so a failed pipeline never
//! leaves a half-written commit or an advanced `HEAD` behind.

use std::path::Path;

use rusqlite::Connection;
use rusqlite::OptionalExtension as _;
use rusqlite::params;

use crate::digest::Digest;
use crate::envelope::Author;
use crate::envelope::Change;
use crate::envelope::Envelope;
use crate::envelope::ProcessInfo;
use crate::envelope::RowOperation;
use crate::error::ScribeError;
use crate::error::ScribeResult;
use crate::object_store::Object;
use crate::object_store::ObjectType;
use crate::refs::RefStore;

/// Schema version written at init and checked at open.
pub const SCHEMA_VERSION: &str = "1";

/// Default number of ids returned by [`CommitStore::get_history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

const SCHEMA: &str = "
CREATE TABLE commits (
    commit_id TEXT PRIMARY KEY,
    parent_id TEXT,
    tree_hash TEXT NOT NULL,
    author_id TEXT NOT NULL,
    author_role TEXT,
    author_email TEXT,
    process_name TEXT NOT NULL,
    process_version TEXT,
    process_params TEXT,
    process_source TEXT,
    message TEXT,
    timestamp INTEGER NOT NULL
);
CREATE INDEX idx_commits_parent ON commits(parent_id);
CREATE INDEX idx_commits_author ON commits(author_id);
CREATE INDEX idx_commits_process ON commits(process_name);
CREATE INDEX idx_commits_timestamp ON commits(timestamp);

CREATE TABLE changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    commit_id TEXT NOT NULL REFERENCES commits(commit_id),
    table_name TEXT NOT NULL,
    operation TEXT NOT NULL CHECK (operation IN ('INSERT', 'UPDATE', 'DELETE')),
    primary_key TEXT NOT NULL,
    before_hash TEXT,
    after_hash TEXT
);
CREATE INDEX idx_changes_commit ON changes(commit_id);
CREATE INDEX idx_changes_table ON changes(table_name);

CREATE TABLE refs (
    name TEXT PRIMARY KEY,
    hash TEXT NOT NULL
);

CREATE TABLE config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE objects (
    hash TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK (type IN ('blob', 'tree', 'commit')),
    content BLOB NOT NULL,
    size INTEGER NOT NULL
);
";

/// Store of commits, changes, refs, config and auxiliary objects.
///
/// The store is a single-writer handle; sharing it across threads requires
/// external serialization.
#[derive(Debug)]
pub struct CommitStore {
    conn: Connection,
}

impl CommitStore {
    /// Creates the database file and its schema.
    pub fn init(db_path: &Path) -> ScribeResult<Self> {
        let conn = open_connection(db_path)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self { conn })
    }

    /// Opens an existing database, rejecting unknown schema versions.
    pub fn open(db_path: &Path) -> ScribeResult<Self> {
        let conn = open_connection(db_path)?;
        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM config WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            // A fresh or foreign file has no config table at all.
            .unwrap_or(None);
        match version.as_deref() {
            Some(SCHEMA_VERSION) => Ok(Self { conn }),
            Some(other) => Err(ScribeError::RepoCorrupt(format!(
                "unsupported schema version {other:?} (expected {SCHEMA_VERSION:?})"
            ))),
            None => Err(ScribeError::RepoCorrupt(
                "no schema version recorded; not a scribe database".to_string(),
            )),
        }
    }

    /// View over the `refs` table.
    pub fn refs(&self) -> RefStore<'_> {
        RefStore::new(&self.conn)
    }

    /// Begins a write transaction. Nested transactions are not supported.
    pub fn transaction(&mut self) -> ScribeResult<StoreTransaction<'_>> {
        Ok(StoreTransaction {
            tx: self.conn.transaction()?,
        })
    }

    /// Loads a commit with its ordered changes, or `None` if absent.
    pub fn load_commit(&self, id: &Digest) -> ScribeResult<Option<Envelope>> {
        load_commit(&self.conn, id)
    }

    /// True if a commit with the given id is stored.
    pub fn commit_exists(&self, id: &Digest) -> ScribeResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM commits WHERE commit_id = ?1",
                params![id.hex()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Walks the parent chain starting at `from` (or `HEAD` when omitted) and
    /// returns at most `limit` ids, newest first. The walk stops at a zero
    /// or missing parent.
    pub fn get_history(&self, from: Option<&Digest>, limit: usize) -> ScribeResult<Vec<Digest>> {
        let start = match from {
            Some(id) => *id,
            None => self.refs().get(crate::refs::HEAD)?,
        };
        let mut history = vec![];
        let mut current = start;
        while history.len() < limit && !current.is_zero() {
            let row: Option<Option<String>> = self
                .conn
                .query_row(
                    "SELECT parent_id FROM commits WHERE commit_id = ?1",
                    params![current.hex()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(parent) = row else {
                break;
            };
            history.push(current);
            current = match parent.as_deref() {
                None | Some("") => Digest::ZERO,
                Some(hex) => parse_digest(hex)?,
            };
        }
        Ok(history)
    }

    /// Ids of commits asserted to the given author, newest first.
    pub fn find_by_author(&self, author_id: &str) -> ScribeResult<Vec<Digest>> {
        self.find_by_column(
            "SELECT commit_id FROM commits WHERE author_id = ?1 ORDER BY timestamp DESC",
            author_id,
        )
    }

    /// Ids of commits produced by the given process, newest first.
    pub fn find_by_process(&self, process_name: &str) -> ScribeResult<Vec<Digest>> {
        self.find_by_column(
            "SELECT commit_id FROM commits WHERE process_name = ?1 ORDER BY timestamp DESC",
            process_name,
        )
    }

    fn find_by_column(&self, sql: &str, value: &str) -> ScribeResult<Vec<Digest>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![value], |row| row.get::<_, String>(0))?;
        rows.map(|row| parse_digest(&row?)).collect()
    }

    /// Total number of stored commits.
    pub fn commit_count(&self) -> ScribeResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Ids of every stored commit, newest first. Includes commits that are
    /// no longer reachable from `HEAD`.
    pub fn all_commit_ids(&self) -> ScribeResult<Vec<Digest>> {
        let mut stmt = self
            .conn
            .prepare("SELECT commit_id FROM commits ORDER BY timestamp DESC, commit_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|row| parse_digest(&row?)).collect()
    }

    /// Stores an auxiliary object in the `objects` table. Duplicate writes
    /// are a no-op success.
    pub fn put_object(&self, object: &Object) -> ScribeResult<Digest> {
        let id = object.id();
        self.conn.execute(
            "INSERT OR IGNORE INTO objects (hash, type, content, size) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.hex(),
                object.object_type.as_str(),
                object.data,
                object.data.len() as i64
            ],
        )?;
        Ok(id)
    }

    /// Loads an auxiliary object by digest.
    pub fn get_object(&self, id: &Digest) -> ScribeResult<Object> {
        let row: Option<(String, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT type, content FROM objects WHERE hash = ?1",
                params![id.hex()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((type_str, content)) = row else {
            return Err(ScribeError::ObjectMissing { hash: id.hex() });
        };
        let object_type: ObjectType = type_str
            .parse()
            .map_err(|_| ScribeError::RepoCorrupt(format!("object {id} has type {type_str:?}")))?;
        Ok(Object::new(object_type, content))
    }
}

fn open_connection(db_path: &Path) -> ScribeResult<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

fn parse_digest(hex: &str) -> ScribeResult<Digest> {
    Digest::try_from_hex(hex)
        .ok_or_else(|| ScribeError::Crypto(format!("invalid stored digest {hex:?}")))
}

fn load_commit(conn: &Connection, id: &Digest) -> ScribeResult<Option<Envelope>> {
    let row = conn
        .query_row(
            "SELECT parent_id, tree_hash, author_id, author_role, author_email,
                    process_name, process_version, process_params, process_source,
                    message, timestamp
             FROM commits WHERE commit_id = ?1",
            params![id.hex()],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            },
        )
        .optional()?;
    let Some((
        parent_hex,
        tree_hex,
        author_id,
        author_role,
        author_email,
        process_name,
        process_version,
        process_params,
        process_source,
        message,
        timestamp,
    )) = row
    else {
        return Ok(None);
    };

    let parent_id = match parent_hex.as_deref() {
        None | Some("") => Digest::ZERO,
        Some(hex) => parse_digest(hex)?,
    };
    let tree_hash = if tree_hex.is_empty() {
        Digest::ZERO
    } else {
        parse_digest(&tree_hex)?
    };

    let mut stmt = conn.prepare(
        "SELECT table_name, operation, primary_key, before_hash, after_hash
         FROM changes WHERE commit_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![id.hex()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;
    let mut changes = vec![];
    for row in rows {
        let (table_name, operation, primary_key, before_hex, after_hex) = row?;
        let operation: RowOperation = operation
            .parse()
            .map_err(|_| ScribeError::RepoCorrupt(format!("bad operation {operation:?}")))?;
        changes.push(Change {
            table_name,
            operation,
            primary_key,
            before_digest: optional_digest(before_hex.as_deref())?,
            after_digest: optional_digest(after_hex.as_deref())?,
        });
    }

    Ok(Some(Envelope {
        commit_id: *id,
        parent_id,
        tree_hash,
        author: Author {
            id: author_id,
            role: author_role.unwrap_or_default(),
            email: author_email,
        },
        process: ProcessInfo {
            name: process_name,
            version: process_version,
            params: process_params,
            source: process_source,
        },
        timestamp,
        message,
        changes,
    }))
}

fn optional_digest(hex: Option<&str>) -> ScribeResult<Digest> {
    match hex {
        None | Some("") => Ok(Digest::ZERO),
        Some(hex) => parse_digest(hex),
    }
}

/// An open write transaction. Dropping it without calling
/// [`StoreTransaction::commit`] rolls everything back.
#[derive(Debug)]
pub struct StoreTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl StoreTransaction<'_> {
    /// Inserts a finalized commit and its changes. A zero parent is stored
    /// as SQL NULL, never as 64 zero digits. Inserting an id twice fails on
    /// the primary key.
    pub fn store_commit(&self, envelope: &Envelope) -> ScribeResult<()> {
        if envelope.commit_id.is_zero() {
            return Err(ScribeError::invalid_argument(
                "cannot store an envelope that has not been finalized",
            ));
        }
        let parent = (!envelope.parent_id.is_zero()).then(|| envelope.parent_id.hex());
        self.tx.execute(
            "INSERT INTO commits (commit_id, parent_id, tree_hash, author_id, author_role,
                                  author_email, process_name, process_version, process_params,
                                  process_source, message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                envelope.commit_id.hex(),
                parent,
                envelope.tree_hash.hex(),
                envelope.author.id,
                (!envelope.author.role.is_empty()).then_some(&envelope.author.role),
                envelope.author.email,
                envelope.process.name,
                envelope.process.version,
                envelope.process.params,
                envelope.process.source,
                envelope.message,
                envelope.timestamp,
            ],
        )?;
        for change in &envelope.changes {
            self.tx.execute(
                "INSERT INTO changes (commit_id, table_name, operation, primary_key,
                                      before_hash, after_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    envelope.commit_id.hex(),
                    change.table_name,
                    change.operation.as_str(),
                    change.primary_key,
                    (!change.before_digest.is_zero()).then(|| change.before_digest.hex()),
                    (!change.after_digest.is_zero()).then(|| change.after_digest.hex()),
                ],
            )?;
        }
        Ok(())
    }

    /// View over the `refs` table within this transaction.
    pub fn refs(&self) -> RefStore<'_> {
        RefStore::new(&self.tx)
    }

    /// Commits all writes.
    pub fn commit(self) -> ScribeResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Explicitly rolls back. Equivalent to dropping the transaction.
    pub fn rollback(self) -> ScribeResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}
