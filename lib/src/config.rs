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

//! Repository configuration (`.scribe/config.json`).

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ScribeError;
use crate::error::ScribeResult;

/// Name of the configuration file inside the repository directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Per-repository configuration.
///
/// Unknown keys in the file are ignored so that newer tools can add keys
/// without breaking older readers.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RepoConfig {
    /// Default author identifier recorded on commits.
    pub author_id: String,
    /// Default author role recorded on commits.
    pub author_role: String,
    /// Connection string of the watched upstream database, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_connection_string: Option<String>,
    /// Upstream tables observed by the CDC monitor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watched_tables: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            author_id: format!("user:{}", whoami::username()),
            author_role: "user".to_string(),
            pg_connection_string: None,
            watched_tables: vec![],
        }
    }
}

impl RepoConfig {
    /// Reads the configuration file at `path`.
    pub fn load(path: &Path) -> ScribeResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| ScribeError::io(path, err))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the configuration file at `path`.
    pub fn save(&self, path: &Path) -> ScribeResult<()> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        fs::write(path, text).map_err(|err| ScribeError::io(path, err))?;
        Ok(())
    }
}
