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

//! Scribe records verifiable data lineage over external mutable datastores.
//!
//! Every observed row mutation becomes an immutable commit in a
//! content-addressed, append-only DAG: the commit identifies the actor and the
//! process behind the change, points at its parent, and carries a Merkle root
//! over the per-row change digests. The chain can be walked, queried, and
//! independently re-verified at any time.
//!
//! The crate is organized around the commit engine:
//!
//! * [`digest`]: SHA-256 primitives and the domain-separated leaf/internal
//!   hashes.
//! * [`envelope`]: the in-memory commit object and its canonical
//!   serialization.
//! * [`merkle`]: the per-commit tree over change digests, with inclusion
//!   proofs.
//! * [`commit_store`]: the SQLite-backed commit store and its indexes.
//! * [`object_store`]: the content-addressed blob store on the filesystem.
//! * [`refs`]: mutable named pointers (`HEAD`) into the DAG.
//! * [`repo`]: the repository facade that composes the stores.
//! * [`cdc`]: change-data-capture ingestion from an upstream database.

#![warn(missing_docs)]

pub mod cdc;
pub mod commit_store;
pub mod config;
pub mod digest;
pub mod envelope;
pub mod error;
pub mod file_util;
pub mod hex_util;
pub mod merkle;
pub mod object_store;
pub mod refs;
pub mod repo;
