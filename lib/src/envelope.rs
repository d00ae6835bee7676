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

//! The in-memory commit object and its canonical serialization.
//!
//! An [`Envelope`] is hashed over a canonical JSON form whose key order is
//! fixed by struct declaration order. Two rules make the hash reproducible
//! and stable across rewrites: the `commit_id` is excluded from its own
//! preimage, and digests are written as lowercase hex and omitted entirely
//! when zero. Do not reorder the canonical struct fields.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::digest::Digest;
use crate::digest::hash_bytes;
use crate::error::ScribeError;
use crate::error::ScribeResult;
use crate::merkle::MerkleTree;

/// Kind of row mutation captured by a [`Change`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RowOperation {
    /// A new row appeared; there is no before-image.
    Insert,
    /// An existing row changed; both images are present.
    Update,
    /// A row disappeared; there is no after-image.
    Delete,
}

impl RowOperation {
    /// Textual codec used in storage and in the canonical JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for RowOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowOperation {
    type Err = ScribeError;

    fn from_str(s: &str) -> ScribeResult<Self> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ScribeError::invalid_argument(format!(
                "unknown row operation {s:?} (expected INSERT, UPDATE or DELETE)"
            ))),
        }
    }
}

/// A single row-level mutation: table, operation, primary key, and digests of
/// the row images on either side of the change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Change {
    /// Name of the mutated table.
    pub table_name: String,
    /// Kind of mutation.
    pub operation: RowOperation,
    /// Opaque primary-key representation, typically JSON.
    pub primary_key: String,
    /// Digest of the row before the change; zero iff the row did not exist.
    pub before_digest: Digest,
    /// Digest of the row after the change; zero iff the row no longer exists.
    pub after_digest: Digest,
}

impl Change {
    /// Creates a change, enforcing the digest invariants of each operation:
    /// inserts have no before-image, deletes have no after-image, and updates
    /// have both.
    pub fn new(
        table_name: impl Into<String>,
        operation: RowOperation,
        primary_key: impl Into<String>,
        before_digest: Digest,
        after_digest: Digest,
    ) -> ScribeResult<Self> {
        let table_name = table_name.into();
        if table_name.is_empty() {
            return Err(ScribeError::invalid_argument("change has no table name"));
        }
        match operation {
            RowOperation::Insert if !before_digest.is_zero() => {
                return Err(ScribeError::invalid_argument(
                    "INSERT change must not carry a before digest",
                ));
            }
            RowOperation::Delete if !after_digest.is_zero() => {
                return Err(ScribeError::invalid_argument(
                    "DELETE change must not carry an after digest",
                ));
            }
            RowOperation::Update if before_digest.is_zero() || after_digest.is_zero() => {
                return Err(ScribeError::invalid_argument(
                    "UPDATE change must carry both before and after digests",
                ));
            }
            _ => {}
        }
        Ok(Self {
            table_name,
            operation,
            primary_key: primary_key.into(),
            before_digest,
            after_digest,
        })
    }
}

/// The human or automated actor asserted to have made a change.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Author {
    /// Stable identifier, e.g. `user:alice` or a service account.
    pub id: String,
    /// Free-form role, e.g. `data_engineer`.
    pub role: String,
    /// Contact address, if known.
    pub email: Option<String>,
}

impl Author {
    /// Creates an author with id and role set.
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            email: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.id.is_empty() && self.role.is_empty() && self.email.is_none()
    }
}

/// The process that executed a change.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessInfo {
    /// Process or program name, e.g. `etl.py`.
    pub name: String,
    /// Version token, if known.
    pub version: Option<String>,
    /// Invocation parameters, if known.
    pub params: Option<String>,
    /// Where the process ran or was triggered from.
    pub source: Option<String>,
}

impl ProcessInfo {
    /// Creates a process record with only the name set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            params: None,
            source: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.version.is_none()
            && self.params.is_none()
            && self.source.is_none()
    }
}

/// An immutable commit record: the primary unit of the lineage DAG.
///
/// An envelope is built up in memory, finalized exactly once (computing
/// `tree_hash` and then `commit_id`), persisted, and never mutated again.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    /// Content hash of the envelope; zero until [`Envelope::finalize`].
    pub commit_id: Digest,
    /// Id of the parent commit; zero for a root commit.
    pub parent_id: Digest,
    /// Merkle root over the per-change digests; zero if there are none.
    pub tree_hash: Digest,
    /// Asserted actor.
    pub author: Author,
    /// Executing process.
    pub process: ProcessInfo,
    /// Seconds since the epoch.
    pub timestamp: i64,
    /// Free-form commit message.
    pub message: Option<String>,
    /// Row changes in insertion order. The order is significant to hashing.
    pub changes: Vec<Change>,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    /// Creates an empty envelope timestamped now.
    pub fn new() -> Self {
        Self {
            commit_id: Digest::ZERO,
            parent_id: Digest::ZERO,
            tree_hash: Digest::ZERO,
            author: Author::default(),
            process: ProcessInfo::default(),
            timestamp: chrono::Utc::now().timestamp(),
            message: None,
            changes: vec![],
        }
    }

    /// Sets the parent commit id, replacing any prior value.
    pub fn set_parent(&mut self, parent_id: Digest) {
        self.parent_id = parent_id;
    }

    /// Sets the commit message, replacing any prior value.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Sets the author, replacing any prior value.
    pub fn set_author(&mut self, author: Author) {
        self.author = author;
    }

    /// Sets the process record, replacing any prior value.
    pub fn set_process(&mut self, process: ProcessInfo) {
        self.process = process;
    }

    /// Overrides the tree hash. [`Envelope::finalize`] will not recompute a
    /// non-zero tree hash.
    pub fn set_tree_hash(&mut self, tree_hash: Digest) {
        self.tree_hash = tree_hash;
    }

    /// Sets the timestamp (seconds since epoch), replacing the creation time.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// Appends a change. Insertion order is preserved and significant.
    pub fn add_change(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// The canonical JSON byte form used for hashing and export.
    pub fn canonical_json(&self) -> ScribeResult<Vec<u8>> {
        Ok(serde_json::to_vec(&CanonicalEnvelope::from(self))?)
    }

    /// Builds the Merkle tree over the per-change digests: for each change in
    /// order, the before digest (if non-zero) then the after digest (if
    /// non-zero).
    pub fn compute_tree_hash(&self) -> ScribeResult<Digest> {
        let mut tree = MerkleTree::new();
        for change in &self.changes {
            for digest in [&change.before_digest, &change.after_digest] {
                if !digest.is_zero() {
                    tree.add_leaf_digest(*digest)?;
                }
            }
        }
        tree.build()
    }

    /// Computes `tree_hash` (unless already set) and then `commit_id`.
    ///
    /// The commit id is the hash of the canonical serialization with
    /// `commit_id` zeroed, so the id is never part of its own preimage.
    pub fn finalize(&mut self) -> ScribeResult<Digest> {
        if self.author.id.is_empty() {
            return Err(ScribeError::invalid_argument(
                "cannot finalize an envelope without an author id",
            ));
        }
        if self.process.name.is_empty() {
            return Err(ScribeError::invalid_argument(
                "cannot finalize an envelope without a process name",
            ));
        }
        if self.tree_hash.is_zero() {
            self.tree_hash = self.compute_tree_hash()?;
        }
        self.commit_id = Digest::ZERO;
        let canonical = self.canonical_json()?;
        self.commit_id = hash_bytes(&canonical);
        Ok(self.commit_id)
    }

    /// Recomputes the commit id on a copy with `commit_id` zeroed and checks
    /// it against the stored id.
    pub fn verify(&self) -> ScribeResult<()> {
        let mut copy = self.clone();
        copy.commit_id = Digest::ZERO;
        let canonical = copy.canonical_json()?;
        if hash_bytes(&canonical) == self.commit_id {
            Ok(())
        } else {
            Err(ScribeError::HashMismatch {
                id: self.commit_id.hex(),
            })
        }
    }
}

fn non_zero_hex(digest: &Digest) -> Option<String> {
    (!digest.is_zero()).then(|| digest.hex())
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

// The canonical form. serde writes struct fields in declaration order, which
// is what pins the key order of the hashed JSON. Field names and order are
// part of the cryptographic contract.

#[derive(Serialize)]
struct CanonicalEnvelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<CanonicalAuthor<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    process: Option<CanonicalProcess<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    changes: Vec<CanonicalChange<'a>>,
}

#[derive(Serialize)]
struct CanonicalAuthor<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Serialize)]
struct CanonicalProcess<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

#[derive(Serialize)]
struct CanonicalChange<'a> {
    table: &'a str,
    operation: &'a str,
    pk: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    before_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after_hash: Option<String>,
}

impl<'a> From<&'a Envelope> for CanonicalEnvelope<'a> {
    fn from(envelope: &'a Envelope) -> Self {
        Self {
            commit_id: non_zero_hex(&envelope.commit_id),
            parent_id: non_zero_hex(&envelope.parent_id),
            tree_hash: non_zero_hex(&envelope.tree_hash),
            author: (!envelope.author.is_empty()).then(|| CanonicalAuthor {
                id: non_empty(&envelope.author.id),
                role: non_empty(&envelope.author.role),
                email: envelope.author.email.as_deref(),
            }),
            process: (!envelope.process.is_empty()).then(|| CanonicalProcess {
                name: non_empty(&envelope.process.name),
                version: envelope.process.version.as_deref(),
                params: envelope.process.params.as_deref(),
                source: envelope.process.source.as_deref(),
            }),
            timestamp: (envelope.timestamp != 0).then_some(envelope.timestamp),
            message: envelope.message.as_deref(),
            changes: envelope
                .changes
                .iter()
                .map(|change| CanonicalChange {
                    table: &change.table_name,
                    operation: change.operation.as_str(),
                    pk: &change.primary_key,
                    before_hash: non_zero_hex(&change.before_digest),
                    after_hash: non_zero_hex(&change.after_digest),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn seed_envelope() -> Envelope {
        let mut envelope = Envelope::new();
        envelope.set_author(Author::new("user:alice", "data_engineer"));
        let mut process = ProcessInfo::new("etl.py");
        process.version = Some("v1".to_string());
        process.params = Some("--dry-run".to_string());
        envelope.set_process(process);
        envelope.set_timestamp(1_700_000_000);
        envelope.set_message("seed");
        envelope.add_change(
            Change::new(
                "orders",
                RowOperation::Insert,
                r#"{"id":1}"#,
                Digest::ZERO,
                hash_bytes(b"{a:1}"),
            )
            .unwrap(),
        );
        envelope
    }

    #[test]
    fn test_operation_codec() {
        assert_eq!("INSERT".parse::<RowOperation>().unwrap(), RowOperation::Insert);
        assert_eq!("UPDATE".parse::<RowOperation>().unwrap(), RowOperation::Update);
        assert_eq!("DELETE".parse::<RowOperation>().unwrap(), RowOperation::Delete);
        assert_matches!(
            "insert".parse::<RowOperation>(),
            Err(err) if err.kind() == ErrorKind::InvalidArgument
        );
        assert_eq!(RowOperation::Delete.as_str(), "DELETE");
    }

    #[test]
    fn test_change_invariants() {
        let digest = hash_bytes(b"row");
        assert!(Change::new("t", RowOperation::Insert, "1", Digest::ZERO, digest).is_ok());
        assert!(Change::new("t", RowOperation::Insert, "1", digest, digest).is_err());
        assert!(Change::new("t", RowOperation::Delete, "1", digest, Digest::ZERO).is_ok());
        assert!(Change::new("t", RowOperation::Delete, "1", digest, digest).is_err());
        assert!(Change::new("t", RowOperation::Update, "1", digest, digest).is_ok());
        assert!(Change::new("t", RowOperation::Update, "1", Digest::ZERO, digest).is_err());
        assert!(Change::new("t", RowOperation::Update, "1", digest, Digest::ZERO).is_err());
        assert!(Change::new("", RowOperation::Insert, "1", Digest::ZERO, digest).is_err());
    }

    #[test]
    fn test_canonical_json_key_order() {
        let mut envelope = seed_envelope();
        envelope.finalize().unwrap();
        let after_hex = hash_bytes(b"{a:1}").hex();
        let expected = format!(
            concat!(
                "{{\"commit_id\":\"{commit}\",",
                "\"tree_hash\":\"{tree}\",",
                "\"author\":{{\"id\":\"user:alice\",\"role\":\"data_engineer\"}},",
                "\"process\":{{\"name\":\"etl.py\",\"version\":\"v1\",\"params\":\"--dry-run\"}},",
                "\"timestamp\":1700000000,",
                "\"message\":\"seed\",",
                "\"changes\":[{{\"table\":\"orders\",\"operation\":\"INSERT\",",
                "\"pk\":\"{{\\\"id\\\":1}}\",\"after_hash\":\"{after}\"}}]}}"
            ),
            commit = envelope.commit_id.hex(),
            tree = envelope.tree_hash.hex(),
            after = after_hex,
        );
        assert_eq!(
            String::from_utf8(envelope.canonical_json().unwrap()).unwrap(),
            expected
        );
    }

    #[test]
    fn test_commit_id_excluded_from_preimage() {
        let mut envelope = seed_envelope();
        envelope.finalize().unwrap();
        let mut copy = envelope.clone();
        copy.commit_id = Digest::ZERO;
        let preimage = String::from_utf8(copy.canonical_json().unwrap()).unwrap();
        assert!(!preimage.contains("commit_id"));
        assert_eq!(hash_bytes(preimage.as_bytes()), envelope.commit_id);
    }

    #[test]
    fn test_finalize_is_deterministic() {
        let mut a = seed_envelope();
        let mut b = seed_envelope();
        assert_eq!(a.finalize().unwrap(), b.finalize().unwrap());
        assert_eq!(a.commit_id.hex().len(), 64);
    }

    #[test]
    fn test_change_order_affects_commit_id() {
        let insert = Change::new(
            "orders",
            RowOperation::Insert,
            "1",
            Digest::ZERO,
            hash_bytes(b"one"),
        )
        .unwrap();
        let delete = Change::new(
            "orders",
            RowOperation::Delete,
            "2",
            hash_bytes(b"two"),
            Digest::ZERO,
        )
        .unwrap();

        let mut forward = seed_envelope();
        forward.changes.clear();
        forward.add_change(insert.clone());
        forward.add_change(delete.clone());

        let mut backward = seed_envelope();
        backward.changes.clear();
        backward.add_change(delete);
        backward.add_change(insert);

        assert_ne!(forward.finalize().unwrap(), backward.finalize().unwrap());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut envelope = seed_envelope();
        envelope.finalize().unwrap();
        envelope.verify().unwrap();

        let mut tampered = envelope.clone();
        tampered.message = Some("rewritten".to_string());
        assert_matches!(
            tampered.verify(),
            Err(err) if err.kind() == ErrorKind::HashMismatch
        );
    }

    #[test]
    fn test_finalize_requires_author_and_process() {
        let mut envelope = Envelope::new();
        assert_matches!(
            envelope.finalize(),
            Err(err) if err.kind() == ErrorKind::InvalidArgument
        );
        envelope.set_author(Author::new("user:alice", ""));
        assert_matches!(
            envelope.finalize(),
            Err(err) if err.kind() == ErrorKind::InvalidArgument
        );
        envelope.set_process(ProcessInfo::new("etl.py"));
        envelope.finalize().unwrap();
    }

    #[test]
    fn test_tree_hash_matches_merkle_over_change_digests() {
        let before = hash_bytes(b"before");
        let after = hash_bytes(b"after");
        let mut envelope = seed_envelope();
        envelope.changes.clear();
        envelope
            .add_change(Change::new("t", RowOperation::Update, "1", before, after).unwrap());
        envelope.finalize().unwrap();

        let mut tree = MerkleTree::new();
        tree.add_leaf_digest(before).unwrap();
        tree.add_leaf_digest(after).unwrap();
        assert_eq!(envelope.tree_hash, tree.build().unwrap());
    }

    #[test]
    fn test_empty_envelope_serialization_omits_defaults() {
        let mut envelope = Envelope::new();
        envelope.set_timestamp(0);
        let json = String::from_utf8(envelope.canonical_json().unwrap()).unwrap();
        assert_eq!(json, "{}");
    }
}
