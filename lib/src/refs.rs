// Copyright 2024 The Scribe Authors
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

//! Mutable named pointers into the commit DAG.
//!
//! References live in the commit store's `refs` table so that advancing
//! `HEAD` participates in the same transaction as the commit insert. A ref
//! pointing at the zero digest ("unborn") is stored as the empty string,
//! never as 64 zero digits.

use rusqlite::Connection;
use rusqlite::OptionalExtension as _;
use rusqlite::params;

use crate::digest::Digest;
use crate::error::ScribeError;
use crate::error::ScribeResult;

/// Name of the mutable reference to the tip of the commit chain.
pub const HEAD: &str = "HEAD";

/// View over the `refs` table. Obtainable from both a
/// [`CommitStore`](crate::commit_store::CommitStore) and an open
/// [`StoreTransaction`](crate::commit_store::StoreTransaction).
#[derive(Debug)]
pub struct RefStore<'a> {
    conn: &'a Connection,
}

impl<'a> RefStore<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Resolves a ref. Returns the zero digest for the unborn sentinel and
    /// `NotFound` for a name that was never created.
    pub fn get(&self, name: &str) -> ScribeResult<Digest> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT hash FROM refs WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        match value.as_deref() {
            None => Err(ScribeError::NotFound(format!("ref {name:?}"))),
            Some("") => Ok(Digest::ZERO),
            Some(hex) => Digest::try_from_hex(hex).ok_or_else(|| {
                ScribeError::Crypto(format!("ref {name:?} holds invalid digest {hex:?}"))
            }),
        }
    }

    /// Creates or moves a ref.
    pub fn set(&self, name: &str, target: Digest) -> ScribeResult<()> {
        if name.is_empty() {
            return Err(ScribeError::invalid_argument("ref name must not be empty"));
        }
        let value = if target.is_zero() {
            String::new()
        } else {
            target.hex()
        };
        self.conn.execute(
            "INSERT INTO refs (name, hash) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET hash = excluded.hash",
            params![name, value],
        )?;
        Ok(())
    }

    /// All refs with their targets, sorted by name.
    pub fn list(&self) -> ScribeResult<Vec<(String, Digest)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, hash FROM refs ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut refs = vec![];
        for row in rows {
            let (name, hex) = row?;
            let target = if hex.is_empty() {
                Digest::ZERO
            } else {
                Digest::try_from_hex(&hex).ok_or_else(|| {
                    ScribeError::Crypto(format!("ref {name:?} holds invalid digest {hex:?}"))
                })?
            };
            refs.push((name, target));
        }
        Ok(refs)
    }
}
