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

//! Trigger-based change capture.
//!
//! `setup` installs a row-level trigger on every watched table that appends
//! into the `scribe_audit` table. Polling selects unprocessed rows in id
//! order and flips their `processed` flag in the same upstream transaction,
//! so a row is handed out exactly once.

use postgres::Client;
use postgres::NoTls;

use crate::cdc::ChangeSource;
use crate::cdc::RowEvent;
use crate::cdc::quote_ident;
use crate::error::ScribeError;
use crate::error::ScribeResult;

/// Name of the audit table maintained on the upstream database.
pub const AUDIT_TABLE: &str = "scribe_audit";

const SETUP_SQL: &str = "
CREATE TABLE IF NOT EXISTS scribe_audit (
    id BIGSERIAL PRIMARY KEY,
    table_name TEXT NOT NULL,
    operation TEXT NOT NULL,
    primary_key TEXT NOT NULL,
    before_data TEXT,
    after_data TEXT,
    txid BIGINT NOT NULL,
    changed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS idx_scribe_audit_unprocessed
    ON scribe_audit (id) WHERE NOT processed;

CREATE OR REPLACE FUNCTION scribe_capture() RETURNS trigger
LANGUAGE plpgsql AS $scribe$
DECLARE
    before_row jsonb;
    after_row jsonb;
    pk jsonb;
BEGIN
    IF TG_OP <> 'INSERT' THEN
        before_row := to_jsonb(OLD);
    END IF;
    IF TG_OP <> 'DELETE' THEN
        after_row := to_jsonb(NEW);
    END IF;
    pk := COALESCE(after_row, before_row);
    IF pk ? 'id' THEN
        pk := jsonb_build_object('id', pk->'id');
    END IF;
    INSERT INTO scribe_audit (table_name, operation, primary_key, before_data, after_data, txid)
    VALUES (TG_TABLE_NAME, TG_OP, pk::text, before_row::text, after_row::text, txid_current());
    RETURN COALESCE(NEW, OLD);
END;
$scribe$;
";

/// Change source backed by the `scribe_audit` table.
pub struct TriggerSource {
    connection_string: String,
    tables: Vec<String>,
    client: Client,
}

impl std::fmt::Debug for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerSource")
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl TriggerSource {
    /// Connects to the upstream database.
    pub fn connect(connection_string: &str, tables: Vec<String>) -> ScribeResult<Self> {
        let client = Client::connect(connection_string, NoTls).map_err(ScribeError::pg_connect)?;
        Ok(Self {
            connection_string: connection_string.to_string(),
            tables,
            client,
        })
    }

    fn trigger_name(table: &str) -> String {
        format!("scribe_capture_{table}")
    }
}

impl ChangeSource for TriggerSource {
    fn name(&self) -> &'static str {
        "trigger"
    }

    fn setup(&mut self) -> ScribeResult<()> {
        self.client
            .batch_execute(SETUP_SQL)
            .map_err(ScribeError::PgQuery)?;
        for table in &self.tables {
            let sql = format!(
                "DROP TRIGGER IF EXISTS {trigger} ON {table};
                 CREATE TRIGGER {trigger}
                     AFTER INSERT OR UPDATE OR DELETE ON {table}
                     FOR EACH ROW EXECUTE FUNCTION scribe_capture()",
                trigger = quote_ident(&Self::trigger_name(table)),
                table = quote_ident(table),
            );
            self.client
                .batch_execute(&sql)
                .map_err(ScribeError::PgQuery)?;
        }
        Ok(())
    }

    fn cleanup(&mut self) -> ScribeResult<()> {
        for table in &self.tables {
            let sql = format!(
                "DROP TRIGGER IF EXISTS {trigger} ON {table}",
                trigger = quote_ident(&Self::trigger_name(table)),
                table = quote_ident(table),
            );
            self.client
                .batch_execute(&sql)
                .map_err(ScribeError::PgQuery)?;
        }
        self.client
            .batch_execute("DROP FUNCTION IF EXISTS scribe_capture(); DROP TABLE IF EXISTS scribe_audit")
            .map_err(ScribeError::PgQuery)?;
        Ok(())
    }

    fn poll(&mut self, max_events: usize) -> ScribeResult<Vec<RowEvent>> {
        let mut tx = self.client.transaction().map_err(ScribeError::PgQuery)?;
        let rows = tx
            .query(
                "SELECT id, table_name, operation, primary_key, before_data, after_data, txid
                 FROM scribe_audit WHERE NOT processed ORDER BY id LIMIT $1",
                &[&(max_events as i64)],
            )
            .map_err(ScribeError::PgQuery)?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get(0);
            let operation: String = row.get(2);
            ids.push(id);
            events.push(RowEvent {
                table_name: row.get(1),
                operation: operation.parse()?,
                primary_key_json: row.get(3),
                before_json: row.get(4),
                after_json: row.get(5),
                txid: row.get(6),
                lsn: String::new(),
            });
        }

        if !ids.is_empty() {
            // Marking in the same transaction as the select is what makes a
            // row visible to exactly one poll.
            tx.execute(
                "UPDATE scribe_audit SET processed = TRUE WHERE id = ANY($1)",
                &[&ids],
            )
            .map_err(ScribeError::PgQuery)?;
        }
        tx.commit().map_err(ScribeError::PgQuery)?;
        Ok(events)
    }

    fn reconnect(&mut self) -> ScribeResult<()> {
        self.client =
            Client::connect(&self.connection_string, NoTls).map_err(ScribeError::pg_connect)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_name() {
        assert_eq!(TriggerSource::trigger_name("orders"), "scribe_capture_orders");
    }
}
