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

//! Routine bodies and the body emitter

use crate::instruction::Instruction;
use crate::module::TypeSig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of an exception-handler clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerKind {
    /// Catches every raised value; the value is pushed on handler entry
    Catch,
    Finally,
}

/// Exception-handler clause. Ranges are half-open instruction index ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub kind: HandlerKind,
    pub try_start: u32,
    pub try_end: u32,
    pub handler_start: u32,
    pub handler_end: u32,
}

impl ExceptionHandler {
    pub fn covers(&self, index: u32) -> bool {
        (self.try_start..self.try_end).contains(&index)
    }

    pub fn in_handler(&self, index: u32) -> bool {
        (self.handler_start..self.handler_end).contains(&index)
    }
}

/// Body of a routine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodBody {
    /// Locals start zeroed
    pub init_locals: bool,
    pub locals: Vec<TypeSig>,
    pub instructions: Vec<Instruction>,
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Body made of `ret` only
    pub fn empty() -> Self {
        Self {
            init_locals: false,
            locals: Vec::new(),
            instructions: vec![Instruction::Ret],
            exception_handlers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BodyError {
    #[error("label {0} was never marked")]
    UnmarkedLabel(usize),

    #[error("label {0} was marked more than once")]
    LabelMarkedTwice(usize),

    #[error("label {0} does not belong to this emitter")]
    ForeignLabel(usize),

    #[error("too many locals (limit {limit})")]
    TooManyLocals { limit: usize },
}

pub type BodyResult<T> = Result<T, BodyError>;

/// Forward-referenceable position in a body under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Branch flavors the emitter can resolve against labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Br,
    BrTrue,
    BrFalse,
    BneUn,
    Leave,
}

impl BranchKind {
    fn instruction(self, target: u32) -> Instruction {
        match self {
            BranchKind::Br => Instruction::Br(target),
            BranchKind::BrTrue => Instruction::BrTrue(target),
            BranchKind::BrFalse => Instruction::BrFalse(target),
            BranchKind::BneUn => Instruction::BneUn(target),
            BranchKind::Leave => Instruction::Leave(target),
        }
    }
}

struct PendingHandler {
    kind: HandlerKind,
    labels: [Label; 4],
}

/// Builds a [`MethodBody`] instruction by instruction, resolving labels on [`BodyEmitter::finish`].
#[derive(Default)]
pub struct BodyEmitter {
    init_locals: bool,
    locals: Vec<TypeSig>,
    instructions: Vec<Instruction>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, BranchKind, Label)>,
    handlers: Vec<PendingHandler>,
}

impl BodyEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init_locals(mut self, init_locals: bool) -> Self {
        self.init_locals = init_locals;
        self
    }

    /// Declare a local and return its slot
    pub fn declare_local(&mut self, ty: TypeSig) -> BodyResult<u16> {
        let slot = u16::try_from(self.locals.len()).map_err(|_| BodyError::TooManyLocals {
            limit: u16::MAX as usize,
        })?;
        self.locals.push(ty);
        Ok(slot)
    }

    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    /// Index the next emitted instruction will get
    pub fn position(&self) -> u32 {
        self.instructions.len() as u32
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next emitted instruction
    pub fn mark(&mut self, label: Label) -> BodyResult<()> {
        let position = self.position();
        let slot = self.labels.get_mut(label.0).ok_or(BodyError::ForeignLabel(label.0))?;
        if slot.is_some() {
            return Err(BodyError::LabelMarkedTwice(label.0));
        }
        *slot = Some(position);
        Ok(())
    }

    /// Emit a branch whose target is resolved when the body is finished
    pub fn emit_branch(&mut self, kind: BranchKind, label: Label) -> &mut Self {
        self.fixups.push((self.instructions.len(), kind, label));
        self.instructions.push(kind.instruction(u32::MAX));
        self
    }

    /// Register a handler clause delimited by labels
    pub fn add_handler(&mut self, kind: HandlerKind, try_start: Label, try_end: Label, handler_start: Label, handler_end: Label) {
        self.handlers.push(PendingHandler {
            kind,
            labels: [try_start, try_end, handler_start, handler_end],
        });
    }

    fn resolve(&self, label: Label) -> BodyResult<u32> {
        self.labels
            .get(label.0)
            .ok_or(BodyError::ForeignLabel(label.0))?
            .ok_or(BodyError::UnmarkedLabel(label.0))
    }

    pub fn finish(mut self) -> BodyResult<MethodBody> {
        for (index, kind, label) in std::mem::take(&mut self.fixups) {
            let target = self.resolve(label)?;
            self.instructions[index] = kind.instruction(target);
        }

        let mut exception_handlers = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let [try_start, try_end, handler_start, handler_end] = handler.labels;
            exception_handlers.push(ExceptionHandler {
                kind: handler.kind,
                try_start: self.resolve(try_start)?,
                try_end: self.resolve(try_end)?,
                handler_start: self.resolve(handler_start)?,
                handler_end: self.resolve(handler_end)?,
            });
        }

        Ok(MethodBody {
            init_locals: self.init_locals,
            locals: self.locals,
            instructions: self.instructions,
            exception_handlers,
        })
    }
}
