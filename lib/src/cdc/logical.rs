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

//! Logical-replication change capture.
//!
//! `setup` switches the watched tables to `REPLICA IDENTITY FULL` (so
//! updates and deletes expose their before-image), creates the publication,
//! and creates the logical slot with the stock `test_decoding` output
//! plugin. Polling drains the slot in bounded batches through
//! `pg_logical_slot_get_changes` and parses the plugin's text format; the
//! call itself advances the slot, so each event is consumed exactly once.

use postgres::Client;
use postgres::NoTls;
use serde_json::Map;
use serde_json::Value;

use crate::cdc::ChangeSource;
use crate::cdc::RowEvent;
use crate::cdc::quote_ident;
use crate::envelope::RowOperation;
use crate::error::ScribeError;
use crate::error::ScribeResult;

/// Slot name used when the caller does not pick one.
pub const DEFAULT_SLOT_NAME: &str = "scribe_slot";

/// Publication name created by `setup`.
pub const PUBLICATION_NAME: &str = "scribe_pub";

/// Change source backed by a logical-replication slot.
pub struct LogicalSource {
    connection_string: String,
    slot: String,
    tables: Vec<String>,
    client: Client,
}

impl std::fmt::Debug for LogicalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalSource")
            .field("slot", &self.slot)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl LogicalSource {
    /// Connects to the upstream database.
    pub fn connect(
        connection_string: &str,
        slot: impl Into<String>,
        tables: Vec<String>,
    ) -> ScribeResult<Self> {
        let client = Client::connect(connection_string, NoTls).map_err(ScribeError::pg_connect)?;
        Ok(Self {
            connection_string: connection_string.to_string(),
            slot: slot.into(),
            tables,
            client,
        })
    }

    fn slot_exists(&mut self) -> ScribeResult<bool> {
        let rows = self
            .client
            .query(
                "SELECT 1 FROM pg_replication_slots WHERE slot_name = $1",
                &[&self.slot],
            )
            .map_err(ScribeError::PgQuery)?;
        Ok(!rows.is_empty())
    }
}

impl ChangeSource for LogicalSource {
    fn name(&self) -> &'static str {
        "logical"
    }

    fn setup(&mut self) -> ScribeResult<()> {
        // Without a full replica identity the plugin only reveals key
        // columns on UPDATE/DELETE, and the before-image digest would be
        // incomplete.
        for table in &self.tables {
            let sql = format!("ALTER TABLE {} REPLICA IDENTITY FULL", quote_ident(table));
            self.client
                .batch_execute(&sql)
                .map_err(ScribeError::PgQuery)?;
        }

        let publication_exists = !self
            .client
            .query(
                "SELECT 1 FROM pg_publication WHERE pubname = $1",
                &[&PUBLICATION_NAME],
            )
            .map_err(ScribeError::PgQuery)?
            .is_empty();
        if !publication_exists {
            let sql = if self.tables.is_empty() {
                format!("CREATE PUBLICATION {} FOR ALL TABLES", quote_ident(PUBLICATION_NAME))
            } else {
                format!(
                    "CREATE PUBLICATION {} FOR TABLE {}",
                    quote_ident(PUBLICATION_NAME),
                    self.tables
                        .iter()
                        .map(|table| quote_ident(table))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            };
            self.client
                .batch_execute(&sql)
                .map_err(ScribeError::PgQuery)?;
        }

        if !self.slot_exists()? {
            self.client
                .query(
                    "SELECT pg_create_logical_replication_slot($1, 'test_decoding')",
                    &[&self.slot],
                )
                .map_err(|err| ScribeError::PgReplication(err.to_string()))?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> ScribeResult<()> {
        if self.slot_exists()? {
            self.client
                .query("SELECT pg_drop_replication_slot($1)", &[&self.slot])
                .map_err(|err| ScribeError::PgReplication(err.to_string()))?;
        }
        let sql = format!("DROP PUBLICATION IF EXISTS {}", quote_ident(PUBLICATION_NAME));
        self.client
            .batch_execute(&sql)
            .map_err(ScribeError::PgQuery)?;
        Ok(())
    }

    fn poll(&mut self, max_events: usize) -> ScribeResult<Vec<RowEvent>> {
        let rows = self
            .client
            .query(
                "SELECT lsn::text, xid::text, data
                 FROM pg_logical_slot_get_changes($1, NULL, $2)",
                &[&self.slot, &(max_events as i32)],
            )
            .map_err(|err| ScribeError::PgReplication(err.to_string()))?;

        let mut events = vec![];
        for row in &rows {
            let lsn: String = row.get(0);
            let xid: String = row.get(1);
            let data: String = row.get(2);
            let Some(decoded) = parse_test_decoding(&data)? else {
                continue;
            };
            if !self.tables.is_empty() && !self.tables.contains(&decoded.table) {
                continue;
            }
            let primary_key_json = primary_key_json(&decoded);
            events.push(RowEvent {
                table_name: decoded.table,
                operation: decoded.operation,
                primary_key_json,
                before_json: decoded.before.map(|map| Value::Object(map).to_string()),
                after_json: decoded.after.map(|map| Value::Object(map).to_string()),
                txid: xid.parse().unwrap_or(0),
                lsn,
            });
        }
        Ok(events)
    }

    fn reconnect(&mut self) -> ScribeResult<()> {
        self.client =
            Client::connect(&self.connection_string, NoTls).map_err(ScribeError::pg_connect)?;
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
struct DecodedRow {
    table: String,
    operation: RowOperation,
    before: Option<Map<String, Value>>,
    after: Option<Map<String, Value>>,
}

/// Parses one `test_decoding` output line. Returns `None` for transaction
/// markers (`BEGIN`/`COMMIT`) and for operations Scribe does not track.
fn parse_test_decoding(line: &str) -> ScribeResult<Option<DecodedRow>> {
    let Some(rest) = line.strip_prefix("table ") else {
        return Ok(None);
    };
    let malformed = || ScribeError::PgReplication(format!("malformed test_decoding line: {line}"));
    let (qualified, rest) = rest.split_once(": ").ok_or_else(malformed)?;
    let table = qualified
        .rsplit('.')
        .next()
        .unwrap()
        .trim_matches('"')
        .to_string();
    let (operation, columns) = rest.split_once(':').ok_or_else(malformed)?;
    let columns = columns.trim_start();

    let (before, after) = match operation {
        "INSERT" => (None, Some(parse_columns(columns)?)),
        "DELETE" => (Some(parse_columns(columns)?), None),
        "UPDATE" => match columns.strip_prefix("old-key:") {
            Some(rest) => {
                let (old, new) = rest.split_once("new-tuple:").ok_or_else(malformed)?;
                (
                    Some(parse_columns(old.trim())?),
                    Some(parse_columns(new.trim())?),
                )
            }
            // Replica identity is not FULL; only the new tuple is exposed.
            None => (None, Some(parse_columns(columns)?)),
        },
        // TRUNCATE and messages are not row changes.
        _ => return Ok(None),
    };
    let operation = operation.parse()?;
    Ok(Some(DecodedRow {
        table,
        operation,
        before,
        after,
    }))
}

/// Parses a `name[type]:value` column list into a JSON object.
fn parse_columns(input: &str) -> ScribeResult<Map<String, Value>> {
    let malformed =
        || ScribeError::PgReplication(format!("malformed test_decoding columns: {input}"));
    let mut map = Map::new();
    let bytes = input.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
        if pos == bytes.len() {
            break;
        }
        // Column name up to the type bracket.
        let name_start = pos;
        while pos < bytes.len() && bytes[pos] != b'[' {
            pos += 1;
        }
        if pos == bytes.len() {
            return Err(malformed());
        }
        let name = &input[name_start..pos];
        // Type, which may itself contain brackets (e.g. integer[]).
        let mut depth = 0usize;
        loop {
            if pos == bytes.len() {
                return Err(malformed());
            }
            match bytes[pos] {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        pos += 1;
                        break;
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        if pos == bytes.len() || bytes[pos] != b':' {
            return Err(malformed());
        }
        pos += 1;
        // Value: quoted string or bare token.
        let value = if pos < bytes.len() && bytes[pos] == b'\'' {
            pos += 1;
            let mut text = String::new();
            loop {
                if pos == bytes.len() {
                    return Err(malformed());
                }
                if bytes[pos] == b'\'' {
                    // Doubled quote is an escaped quote.
                    if bytes.get(pos + 1) == Some(&b'\'') {
                        text.push('\'');
                        pos += 2;
                    } else {
                        pos += 1;
                        break;
                    }
                } else {
                    let ch_start = pos;
                    while pos < bytes.len() && bytes[pos] != b'\'' {
                        pos += 1;
                    }
                    text.push_str(&input[ch_start..pos]);
                }
            }
            Value::String(text)
        } else {
            let token_start = pos;
            while pos < bytes.len() && bytes[pos] != b' ' {
                pos += 1;
            }
            bare_token_to_value(&input[token_start..pos])
        };
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

fn bare_token_to_value(token: &str) -> Value {
    match token {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(int) = token.parse::<i64>() {
                Value::Number(int.into())
            } else if let Some(number) = token
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                Value::Number(number)
            } else {
                Value::String(token.to_string())
            }
        }
    }
}

/// Derives the primary-key JSON for an event: the `id` column when there is
/// one, otherwise the full key image.
fn primary_key_json(decoded: &DecodedRow) -> String {
    let key_image = match decoded.operation {
        RowOperation::Insert => decoded.after.as_ref(),
        _ => decoded.before.as_ref().or(decoded.after.as_ref()),
    };
    let Some(image) = key_image else {
        return "{}".to_string();
    };
    if let Some(id) = image.get("id") {
        let mut pk = Map::new();
        pk.insert("id".to_string(), id.clone());
        Value::Object(pk).to_string()
    } else {
        Value::Object(image.clone()).to_string()
    }
}
