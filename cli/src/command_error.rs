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

use std::fmt;

use scribe_lib::error::ScribeError;

/// A command failure rendered as `error: <kind>: <detail>` on stderr.
#[derive(Debug)]
pub(crate) struct CommandError {
    kind: &'static str,
    message: String,
}

impl CommandError {
    pub(crate) fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// An error caused by the way the user invoked the command.
pub(crate) fn user_error(message: impl Into<String>) -> CommandError {
    CommandError::new("invalid argument", message)
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<ScribeError> for CommandError {
    fn from(err: ScribeError) -> Self {
        Self::new(err.kind().as_str(), err.to_string())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::new("io", err.to_string())
    }
}
