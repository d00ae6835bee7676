// Copyright 2023 The Scribe Authors
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

//! Filesystem helpers for atomic, content-addressed writes.

use std::fs;
use std::io;
use std::io::Write as _;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::ScribeError;
use crate::error::ScribeResult;

/// Creates `dir` unless it already exists. Parent directories must exist.
pub fn ensure_dir(dir: &Path) -> ScribeResult<()> {
    match fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(err) => Err(ScribeError::io(dir, err)),
    }
}

/// Atomically materializes `bytes` at `target`.
///
/// The bytes are staged in a temporary file inside `staging_dir` (which must
/// be on the same filesystem as `target`), flushed to disk, and moved into
/// place with a rename, so a reader never observes a partial file. If
/// anything fails before the rename, the staging file is unlinked by its
/// guard.
///
/// `target` must be content-addressed: on platforms where the rename fails
/// because the destination is busy, an already-present target holds the same
/// bytes and counts as success.
pub fn write_atomic(staging_dir: &Path, target: &Path, bytes: &[u8]) -> ScribeResult<()> {
    let mut staged =
        NamedTempFile::new_in(staging_dir).map_err(|err| ScribeError::io(staging_dir, err))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_data())
        .map_err(|err| ScribeError::io(staged.path(), err))?;
    match staged.persist(target) {
        Ok(_file) => Ok(()),
        // Dropping the error unlinks the staging file; the target already
        // holds the same content.
        Err(_) if target.is_file() => Ok(()),
        Err(persist_err) => Err(ScribeError::io(target, persist_err.error)),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_ensure_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("sub");
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        // Reuse is not an error.
        ensure_dir(&dir).unwrap();
        // A missing parent is.
        assert!(ensure_dir(&temp_dir.path().join("a").join("b")).is_err());
    }

    #[test]
    fn test_write_atomic_creates_target() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("file");
        write_atomic(temp_dir.path(), &target, b"contents").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"contents");
        // No staging file is left behind.
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test_case(false ; "existing file open")]
    #[test_case(true ; "existing file closed")]
    fn test_write_atomic_over_existing_target(existing_file_closed: bool) {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("file");

        let mut file = fs::File::create(&target).unwrap();
        file.write_all(b"contents").unwrap();
        if existing_file_closed {
            drop(file);
        }

        write_atomic(temp_dir.path(), &target, b"contents").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"contents");
    }
}
