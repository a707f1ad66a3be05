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

use super::value::Value;
use crate::module::TypeSig;
use crate::validate::ValidationError;
use thiserror::Error;

/// Errors raised while loading or executing modules
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("unhandled exception: {0}")]
    Thrown(Value),

    #[error("stack underflow in {0}")]
    StackUnderflow(String),

    #[error("operand stack overflow (limit {0})")]
    StackOverflow(usize),

    #[error("{op}: unexpected {found} operand")]
    TypeMismatch { op: &'static str, found: &'static str },

    #[error("{0}: null reference")]
    NullReference(&'static str),

    #[error("maximum call depth {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("unknown module handle {0}")]
    UnknownModule(usize),

    #[error("unknown type {0}")]
    UnknownType(String),

    #[error("unknown routine {0}")]
    UnknownMethod(String),

    #[error("unknown field {0}")]
    UnknownField(String),

    #[error("{member} expects {expected} type argument(s), got {actual}")]
    TypeArity { member: String, expected: usize, actual: usize },

    #[error("type argument {0} is not closed")]
    OpenTypeArgument(TypeSig),

    #[error("{method} expects {expected} argument(s), got {actual}")]
    ArgumentCount { method: String, expected: usize, actual: usize },

    #[error("initializer of {ty} failed: {message}")]
    TypeInitializationFailed { ty: String, message: String },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("module rejected: {0}")]
    Validation(#[from] ValidationError),
}

pub type VmResult<T> = Result<T, VmError>;
