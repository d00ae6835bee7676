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

//! The library-wide error type and its stable kind taxonomy.

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

/// Stable classification of a [`ScribeError`].
///
/// The kinds are part of the external contract: the CLI renders them in
/// `error: <kind>: <detail>` messages, and callers may match on them without
/// caring which variant produced the error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// A caller-supplied argument was rejected.
    InvalidArgument,
    /// A requested entity does not exist.
    NotFound,
    /// No repository was found at or above the given path.
    NotARepo,
    /// A repository already exists where one would be created.
    RepoExists,
    /// The on-disk repository state is inconsistent.
    RepoCorrupt,
    /// A filesystem operation failed.
    Io,
    /// The underlying SQLite store reported an error.
    Db,
    /// A content-addressed object is absent from the object store.
    ObjectMissing,
    /// A stored commit does not hash to its recorded id.
    HashMismatch,
    /// Cryptographic material (a stored digest) could not be decoded.
    Crypto,
    /// Connecting to the upstream database failed.
    PgConnect,
    /// An upstream query failed.
    PgQuery,
    /// Logical-replication setup or consumption failed.
    PgReplication,
    /// JSON could not be parsed or serialized.
    JsonParse,
    /// JSON parsed but did not match the expected shape.
    JsonSchema,
}

impl ErrorKind {
    /// The token rendered in user-visible `error: <kind>: <detail>` output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::NotARepo => "not a repository",
            Self::RepoExists => "repository exists",
            Self::RepoCorrupt => "repository corrupt",
            Self::Io => "io",
            Self::Db => "database",
            Self::ObjectMissing => "object missing",
            Self::HashMismatch => "hash mismatch",
            Self::Crypto => "crypto",
            Self::PgConnect => "upstream connection",
            Self::PgQuery => "upstream query",
            Self::PgReplication => "replication",
            Self::JsonParse => "json parse",
            Self::JsonSchema => "json schema",
        }
    }
}

/// Error type shared by all Scribe operations.
///
/// Detail travels inside the value (never in process-wide state), so an error
/// can be reported long after the failing call returned.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// A caller-supplied argument was rejected.
    #[error("{0}")]
    InvalidArgument(String),
    /// A requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// No repository was found at or above the given path.
    #[error("no .scribe repository found in {} or any parent directory", .path.display())]
    NotARepo {
        /// The directory the upward search started from.
        path: PathBuf,
    },
    /// A repository already exists where one would be created.
    #[error("repository already exists at {}", .path.display())]
    RepoExists {
        /// The existing repository directory.
        path: PathBuf,
    },
    /// The on-disk repository state is inconsistent.
    #[error("repository corrupt: {0}")]
    RepoCorrupt(String),
    /// A filesystem operation failed.
    #[error("io error at {}: {source}", .path.display())]
    Io {
        /// The path the failing operation was applied to.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The underlying SQLite store reported an error.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    /// A content-addressed object is absent from the object store.
    #[error("object {hash} missing from object store")]
    ObjectMissing {
        /// Hex digest of the missing object.
        hash: String,
    },
    /// A stored commit does not hash to its recorded id.
    #[error("commit {id} does not match its recorded hash")]
    HashMismatch {
        /// Hex id the store claims for the commit.
        id: String,
    },
    /// Stored digest material could not be decoded.
    #[error("{0}")]
    Crypto(String),
    /// Connecting to the upstream database failed.
    #[error("failed to connect to upstream database: {0}")]
    PgConnect(String),
    /// An upstream query failed.
    #[error("upstream query failed: {0}")]
    PgQuery(#[source] postgres::Error),
    /// Logical-replication setup or consumption failed.
    #[error("replication error: {0}")]
    PgReplication(String),
    /// JSON could not be parsed or serialized.
    #[error(transparent)]
    JsonParse(#[from] serde_json::Error),
    /// JSON parsed but did not match the expected shape.
    #[error("unexpected JSON shape: {0}")]
    JsonSchema(String),
}

/// Result alias used across the crate.
pub type ScribeResult<T> = Result<T, ScribeError>;

impl ScribeError {
    /// Classifies this error into the stable taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotARepo { .. } => ErrorKind::NotARepo,
            Self::RepoExists { .. } => ErrorKind::RepoExists,
            Self::RepoCorrupt(_) => ErrorKind::RepoCorrupt,
            Self::Io { .. } => ErrorKind::Io,
            Self::Db(_) => ErrorKind::Db,
            Self::ObjectMissing { .. } => ErrorKind::ObjectMissing,
            Self::HashMismatch { .. } => ErrorKind::HashMismatch,
            Self::Crypto(_) => ErrorKind::Crypto,
            Self::PgConnect(_) => ErrorKind::PgConnect,
            Self::PgQuery(_) => ErrorKind::PgQuery,
            Self::PgReplication(_) => ErrorKind::PgReplication,
            Self::JsonParse(_) => ErrorKind::JsonParse,
            Self::JsonSchema(_) => ErrorKind::JsonSchema,
        }
    }

    /// Shorthand for an [`ScribeError::InvalidArgument`] with a formatted
    /// message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Annotates an IO error with the path it happened at.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wraps an upstream connection failure.
    pub fn pg_connect(err: postgres::Error) -> Self {
        Self::PgConnect(err.to_string())
    }

    /// True if retrying after reconnecting to the upstream database could
    /// succeed. The CDC monitor loop uses this to decide between backoff and
    /// surfacing the error.
    pub fn is_upstream_connection_error(&self) -> bool {
        match self {
            Self::PgConnect(_) => true,
            // A query on a dropped connection reports the connection as
            // closed rather than failing the statement itself.
            Self::PgQuery(err) => err.is_closed(),
            _ => false,
        }
    }
}
