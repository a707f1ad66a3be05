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

//! Load and unload routine synthesis

use super::{compiler_generated, open_call};
use crate::config::MarkerNames;
use crate::error::EngineResult;
use crate::passes::scanner::ReloadCandidate;
use dotreload_common::generated;
use dotreload_core::{BindingContext, BodyEmitter, Instruction, MethodDef, MethodId, Module, TypeSig, Visibility};
use tracing::debug;

/// Routines added to one hooked type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesizedRoutines {
    pub load: Option<MethodId>,
    pub unload: Option<MethodId>,
}

pub struct LoadUnloadSynthesizer<'a> {
    markers: &'a MarkerNames,
}

impl<'a> LoadUnloadSynthesizer<'a> {
    pub fn new(markers: &'a MarkerNames) -> Self {
        Self { markers }
    }

    /// Unload routine: calls every teardown callback in order, without isolation
    /// between them. `None` when the type has no callbacks.
    pub fn synthesize_unload(&self, module: &mut Module, candidate: &ReloadCandidate) -> EngineResult<Option<MethodId>> {
        if candidate.callbacks.is_empty() {
            return Ok(None);
        }
        let mut emitter = BodyEmitter::new();
        for callback in &candidate.callbacks {
            emitter.emit(open_call(module, callback.method)?);
        }
        emitter.emit(Instruction::Ret);

        let name = generated::unload_impl(&module.ty(candidate.ty).name);
        let method = self.add_routine(module, candidate, name, emitter)?;
        debug!(ty = %candidate.full_name, callbacks = candidate.callbacks.len(), "synthesized unload routine");
        Ok(Some(method))
    }

    /// Load routine: resets every candidate field to its default, then runs the
    /// initializer copy. `None` when there is neither a field nor a copy.
    pub fn synthesize_load(&self, module: &mut Module, candidate: &ReloadCandidate, initializer_copy: Option<MethodId>) -> EngineResult<Option<MethodId>> {
        if candidate.fields.is_empty() && initializer_copy.is_none() {
            return Ok(None);
        }
        let mut emitter = BodyEmitter::new();
        for field in &candidate.fields {
            let field_ref = module.bind_field(field.field, BindingContext::Open)?;
            let field_type = module.field(field.field).field_type.clone();
            emitter.emit(Instruction::LdsFldA(field_ref)).emit(Instruction::InitObj(field_type));
        }
        if let Some(copy) = initializer_copy {
            emitter.emit(open_call(module, copy)?);
        }
        emitter.emit(Instruction::Ret);

        let name = generated::load_impl(&module.ty(candidate.ty).name);
        let method = self.add_routine(module, candidate, name, emitter)?;
        debug!(ty = %candidate.full_name, fields = candidate.fields.len(), "synthesized load routine");
        Ok(Some(method))
    }

    fn add_routine(&self, module: &mut Module, candidate: &ReloadCandidate, name: String, emitter: BodyEmitter) -> EngineResult<MethodId> {
        let routine = MethodDef::new_static(name, TypeSig::Void)
            .with_visibility(Visibility::Private)
            .with_body(emitter.finish()?)
            .with_attribute(compiler_generated(self.markers));
        Ok(module.add_method(candidate.ty, routine)?)
    }
}
