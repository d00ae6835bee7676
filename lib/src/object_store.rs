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

//! Content-addressed blob store on the filesystem.
//!
//! An object with digest `abcdef…` lives at `<root>/ab/cdef…`. The stored
//! payload is the Git-style framing `"<type> <size>\0"` followed by the raw
//! bytes, and the digest is computed over that whole framing, so the file
//! content is a pure function of its path.

use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use crate::digest::Digest;
use crate::digest::hash_bytes;
use crate::error::ScribeError;
use crate::error::ScribeResult;
use crate::file_util::ensure_dir;
use crate::file_util::write_atomic;

/// Kind of payload held by an [`Object`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ObjectType {
    /// Opaque bytes.
    Blob,
    /// A serialized tree.
    Tree,
    /// A serialized commit.
    Commit,
}

impl ObjectType {
    /// Textual codec used in the object framing and in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = ScribeError;

    fn from_str(s: &str) -> ScribeResult<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            _ => Err(ScribeError::invalid_argument(format!(
                "unknown object type {s:?}"
            ))),
        }
    }
}

/// A typed byte blob addressed by the digest of its framed form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Object {
    /// Payload kind.
    pub object_type: ObjectType,
    /// Raw payload bytes, without the framing header.
    pub data: Vec<u8>,
}

impl Object {
    /// Creates an object over the given payload.
    pub fn new(object_type: ObjectType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            object_type,
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The framed form: `"<type> <size>\0"` followed by the payload.
    pub fn framed(&self) -> Vec<u8> {
        let mut framed = format!("{} {}\0", self.object_type, self.data.len()).into_bytes();
        framed.extend_from_slice(&self.data);
        framed
    }

    /// Digest over the framed form.
    pub fn id(&self) -> Digest {
        hash_bytes(&self.framed())
    }

    fn from_framed(framed: &[u8], hash: &Digest) -> ScribeResult<Self> {
        let corrupt =
            || ScribeError::RepoCorrupt(format!("malformed object file for {}", hash.hex()));
        let header_end = framed.iter().position(|&b| b == 0).ok_or_else(corrupt)?;
        let header = std::str::from_utf8(&framed[..header_end]).map_err(|_| corrupt())?;
        let (type_str, size_str) = header.split_once(' ').ok_or_else(corrupt)?;
        let object_type: ObjectType = type_str.parse().map_err(|_| corrupt())?;
        let size: usize = size_str.parse().map_err(|_| corrupt())?;
        let data = &framed[header_end + 1..];
        if data.len() != size {
            return Err(corrupt());
        }
        Ok(Self::new(object_type, data))
    }
}

/// Filesystem-backed store of [`Object`]s under a single root directory.
#[derive(Debug)]
pub struct ObjectStore {
    path: PathBuf,
}

impl ObjectStore {
    /// Creates the store directory and returns a handle.
    pub fn init(store_path: &Path) -> ScribeResult<Self> {
        ensure_dir(store_path)?;
        Ok(Self::load(store_path))
    }

    /// Opens an existing store directory.
    pub fn load(store_path: &Path) -> Self {
        Self {
            path: store_path.to_path_buf(),
        }
    }

    /// Root directory of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, id: &Digest) -> PathBuf {
        let hex = id.hex();
        self.path.join(&hex[..2]).join(&hex[2..])
    }

    /// Writes an object and returns its digest. Writing an object that is
    /// already present is a no-op success.
    pub fn write(&self, object: &Object) -> ScribeResult<Digest> {
        let id = object.id();
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        ensure_dir(path.parent().unwrap())?;
        write_atomic(&self.path, &path, &object.framed())?;
        Ok(id)
    }

    /// Reads the object with the given digest.
    pub fn read(&self, id: &Digest) -> ScribeResult<Object> {
        let path = self.object_path(id);
        let framed = match fs::read(&path) {
            Ok(framed) => framed,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScribeError::ObjectMissing { hash: id.hex() });
            }
            Err(err) => return Err(ScribeError::io(path, err)),
        };
        Object::from_framed(&framed, id)
    }

    /// True if an object with the given digest is stored.
    pub fn contains(&self, id: &Digest) -> bool {
        self.object_path(id).exists()
    }
}
