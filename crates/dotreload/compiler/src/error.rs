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

//! Error handling for the instrumentation engine

use dotreload_core::body::BodyError;
use dotreload_core::bytecode::CodecError;
use dotreload_core::module::ModuleError;
use dotreload_core::validate::ValidationError;
use thiserror::Error;

/// Errors raised while instrumenting a module
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // Structural failures
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // Graph editing failures
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("Body emission failed: {0}")]
    Body(#[from] BodyError),

    // Scan failures
    #[error("Invalid {property} on {method}: expected an i32 constant, found {found}")]
    InvalidOrderKey { method: String, property: String, found: String },

    // Synthesis failures
    #[error("Module already contains the dispatcher type {0}")]
    DispatcherExists(String),

    #[error("Routine {0} has no body")]
    MissingBody(String),

    // Configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Internal
    #[error("Engine panicked: {0}")]
    Panic(String),

    #[error("Internal engine error: {0}")]
    InternalError(String),
}

impl EngineError {
    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Whether the failure comes from unreadable or malformed input rather than the engine
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Codec(_) | Self::Validation(_))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine failure attributed to one module
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Internal compiler error for {processor} on {module}: {source}")]
pub struct PostProcessError {
    pub processor: &'static str,
    pub module: String,
    pub source: EngineError,
}

impl PostProcessError {
    pub fn new(processor: &'static str, module: impl Into<String>, source: EngineError) -> Self {
        Self {
            processor,
            module: module.into(),
            source,
        }
    }
}
