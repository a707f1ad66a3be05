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

//! Instructions with typed operands

use crate::module::{FieldRef, MethodRef, TypeSig};
use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One instruction. Branch operands are instruction indices within the same body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Nop,
    Ret,
    Pop,
    Dup,
    LdNull,
    LdcI4(i32),
    LdcI8(i64),
    LdcR8(f64),
    LdStr(String),
    LdLoc(u16),
    StLoc(u16),
    LdArg(u16),
    LdsFld(FieldRef),
    StsFld(FieldRef),
    LdsFldA(FieldRef),
    /// Store the default value of the type through the address on the stack
    InitObj(TypeSig),
    Add,
    Sub,
    Mul,
    Ceq,
    Br(u32),
    BrTrue(u32),
    BrFalse(u32),
    BneUn(u32),
    Call(MethodRef),
    LdFtn(MethodRef),
    NewCallback,
    CombineCallbacks,
    InvokeCallback,
    /// `address, value, comparand -> prior value`
    CompareExchange,
    Throw,
    Leave(u32),
    EndFinally,
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Nop => Opcode::Nop,
            Instruction::Ret => Opcode::Ret,
            Instruction::Pop => Opcode::Pop,
            Instruction::Dup => Opcode::Dup,
            Instruction::LdNull => Opcode::LdNull,
            Instruction::LdcI4(_) => Opcode::LdcI4,
            Instruction::LdcI8(_) => Opcode::LdcI8,
            Instruction::LdcR8(_) => Opcode::LdcR8,
            Instruction::LdStr(_) => Opcode::LdStr,
            Instruction::LdLoc(_) => Opcode::LdLoc,
            Instruction::StLoc(_) => Opcode::StLoc,
            Instruction::LdArg(_) => Opcode::LdArg,
            Instruction::LdsFld(_) => Opcode::LdsFld,
            Instruction::StsFld(_) => Opcode::StsFld,
            Instruction::LdsFldA(_) => Opcode::LdsFldA,
            Instruction::InitObj(_) => Opcode::InitObj,
            Instruction::Add => Opcode::Add,
            Instruction::Sub => Opcode::Sub,
            Instruction::Mul => Opcode::Mul,
            Instruction::Ceq => Opcode::Ceq,
            Instruction::Br(_) => Opcode::Br,
            Instruction::BrTrue(_) => Opcode::BrTrue,
            Instruction::BrFalse(_) => Opcode::BrFalse,
            Instruction::BneUn(_) => Opcode::BneUn,
            Instruction::Call(_) => Opcode::Call,
            Instruction::LdFtn(_) => Opcode::LdFtn,
            Instruction::NewCallback => Opcode::NewCallback,
            Instruction::CombineCallbacks => Opcode::CombineCallbacks,
            Instruction::InvokeCallback => Opcode::InvokeCallback,
            Instruction::CompareExchange => Opcode::CompareExchange,
            Instruction::Throw => Opcode::Throw,
            Instruction::Leave(_) => Opcode::Leave,
            Instruction::EndFinally => Opcode::EndFinally,
        }
    }

    /// Branch target, for branching instructions
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Instruction::Br(t)
            | Instruction::BrTrue(t)
            | Instruction::BrFalse(t)
            | Instruction::BneUn(t)
            | Instruction::Leave(t) => Some(*t),
            _ => None,
        }
    }

    /// Field operand, for static field instructions
    pub fn field_operand(&self) -> Option<&FieldRef> {
        match self {
            Instruction::LdsFld(f) | Instruction::StsFld(f) | Instruction::LdsFldA(f) => Some(f),
            _ => None,
        }
    }

    /// Routine operand, for calls and routine pointers
    pub fn method_operand(&self) -> Option<&MethodRef> {
        match self {
            Instruction::Call(m) | Instruction::LdFtn(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode().mnemonic();
        match self {
            Instruction::LdcI4(v) => write!(f, "{} {}", op, v),
            Instruction::LdcI8(v) => write!(f, "{} {}", op, v),
            Instruction::LdcR8(v) => write!(f, "{} {}", op, v),
            Instruction::LdStr(s) => write!(f, "{} {:?}", op, s),
            Instruction::LdLoc(n) | Instruction::StLoc(n) | Instruction::LdArg(n) => write!(f, "{} {}", op, n),
            Instruction::LdsFld(r) | Instruction::StsFld(r) | Instruction::LdsFldA(r) => write!(f, "{} {}", op, r),
            Instruction::InitObj(t) => write!(f, "{} {}", op, t),
            Instruction::Call(m) | Instruction::LdFtn(m) => write!(f, "{} {}", op, m),
            other => match other.branch_target() {
                Some(target) => write!(f, "{} IL_{:04}", op, target),
                None => f.write_str(op),
            },
        }
    }
}
