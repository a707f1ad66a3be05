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

//! DotReload core
//!
//! The module object graph consumed and produced by the instrumentation engine,
//! its instruction set, the structural validator, the binary codec and a small
//! runtime able to execute modules.

pub mod body;
pub mod bytecode;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod symbols;
pub mod validate;
pub mod vm;

pub use body::{BodyEmitter, BranchKind, ExceptionHandler, HandlerKind, Label, MethodBody};
pub use instruction::Instruction;
pub use module::*;
pub use opcode::Opcode;
pub use symbols::{DebugSymbols, SequencePoint, SourceLocation};
pub use bytecode::{CodecError, CodecResult, read_module, read_module_with_symbols, read_symbols, write_module, write_symbols};
pub use validate::{ValidationError, ValidationResult, check_nesting, validate_module};
