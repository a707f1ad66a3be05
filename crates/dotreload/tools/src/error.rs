// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use dotreload_core::CodecError;
use dotreload_core::vm::VmError;
use dotreload_runtime::ReloadError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid module image: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Vm(#[from] VmError),

    #[error("Reload error: {0}")]
    Reload(#[from] ReloadError),

    #[error("Module {name} given twice: {} and {}", first.display(), second.display())]
    DuplicateModule { name: String, first: PathBuf, second: PathBuf },

    #[error("Entry point must be written as Type::Method, got '{0}'")]
    InvalidEntry(String),

    #[error("Entry point {0} not found in any module")]
    EntryNotFound(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

impl ToolError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ToolError::Io { path: path.into(), source }
    }
}
