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

//! Operand stack of one frame

use super::errors::{VmError, VmResult};
use super::value::Value;

/// Maximum operand stack depth of a single frame
pub const MAX_STACK_SIZE: usize = 1024;

#[derive(Debug, Default)]
pub struct OperandStack {
    values: Vec<Value>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.values.len() >= MAX_STACK_SIZE {
            return Err(VmError::StackOverflow(MAX_STACK_SIZE));
        }
        self.values.push(value);
        Ok(())
    }

    /// Pop, naming the routine in the underflow error
    pub fn pop(&mut self, routine: &str) -> VmResult<Value> {
        self.values.pop().ok_or_else(|| VmError::StackUnderflow(routine.to_string()))
    }

    /// Pop the top `n` values, returned bottom first
    pub fn pop_n(&mut self, n: usize, routine: &str) -> VmResult<Vec<Value>> {
        if self.values.len() < n {
            return Err(VmError::StackUnderflow(routine.to_string()));
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
