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

//! Opcode mnemonics of the instruction set

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opcodes of the stack machine. Each [`crate::Instruction`] maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Stack
    Nop,
    Ret,
    Pop,
    Dup,

    // Constants
    LdNull,
    LdcI4,
    LdcI8,
    LdcR8,
    LdStr,

    // Locals and arguments
    LdLoc,
    StLoc,
    LdArg,

    // Static storage
    LdsFld,
    StsFld,
    LdsFldA,
    InitObj,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Ceq,

    // Control flow
    Br,
    BrTrue,
    BrFalse,
    BneUn,
    Call,

    // Callbacks
    LdFtn,
    NewCallback,
    CombineCallbacks,
    InvokeCallback,
    CompareExchange,

    // Exceptions
    Throw,
    Leave,
    EndFinally,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Ret => "ret",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::LdNull => "ldnull",
            Opcode::LdcI4 => "ldc.i4",
            Opcode::LdcI8 => "ldc.i8",
            Opcode::LdcR8 => "ldc.r8",
            Opcode::LdStr => "ldstr",
            Opcode::LdLoc => "ldloc",
            Opcode::StLoc => "stloc",
            Opcode::LdArg => "ldarg",
            Opcode::LdsFld => "ldsfld",
            Opcode::StsFld => "stsfld",
            Opcode::LdsFldA => "ldsflda",
            Opcode::InitObj => "initobj",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Ceq => "ceq",
            Opcode::Br => "br",
            Opcode::BrTrue => "brtrue",
            Opcode::BrFalse => "brfalse",
            Opcode::BneUn => "bne.un",
            Opcode::Call => "call",
            Opcode::LdFtn => "ldftn",
            Opcode::NewCallback => "newcallback",
            Opcode::CombineCallbacks => "combine",
            Opcode::InvokeCallback => "invoke",
            Opcode::CompareExchange => "cmpxchg",
            Opcode::Throw => "throw",
            Opcode::Leave => "leave",
            Opcode::EndFinally => "endfinally",
        }
    }

    /// Opcodes that transfer control to an instruction index operand
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Br | Opcode::BrTrue | Opcode::BrFalse | Opcode::BneUn | Opcode::Leave
        )
    }

    /// Opcodes after which control never falls through to the next instruction
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Opcode::Ret | Opcode::Br | Opcode::Throw | Opcode::Leave | Opcode::EndFinally
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
