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

use dotreload_core::vm::VmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("Unload of module {module} failed: {source}")]
    Unload {
        module: String,
        #[source]
        source: VmError,
    },

    #[error("Load of module {module} failed: {source}")]
    Load {
        module: String,
        #[source]
        source: VmError,
    },

    #[error("Runtime error: {0}")]
    Runtime(#[from] VmError),
}

pub type ReloadResult<T> = Result<T, ReloadError>;

impl ReloadError {
    /// Name of the module whose entry point failed, if any
    pub fn module(&self) -> Option<&str> {
        match self {
            ReloadError::Unload { module, .. } | ReloadError::Load { module, .. } => Some(module),
            ReloadError::Runtime(_) => None,
        }
    }
}
