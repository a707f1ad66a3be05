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

//! Dispatcher synthesis
//!
//! Every instrumented module gets one hidden type holding two multicast callback
//! fields. Type initializers register into them concurrently; the host invokes
//! them around a reload.

use super::compiler_generated;
use crate::config::MarkerNames;
use crate::error::{EngineError, EngineResult};
use dotreload_common::reloader;
use dotreload_core::{
    BindingContext, BodyEmitter, BranchKind, FieldDef, FieldId, Instruction, MethodDef, MethodId, Module, ParamDef, TypeDef, TypeId, TypeSig,
    Visibility,
};
use tracing::info;

/// Handles of the synthesized dispatcher members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherHandles {
    pub ty: TypeId,
    pub unload_actions: FieldId,
    pub load_actions: FieldId,
    pub register_unload: MethodId,
    pub register_load: MethodId,
    pub unload: MethodId,
    pub load: MethodId,
}

pub struct DispatcherSynthesizer<'a> {
    markers: &'a MarkerNames,
}

impl<'a> DispatcherSynthesizer<'a> {
    pub fn new(markers: &'a MarkerNames) -> Self {
        Self { markers }
    }

    /// Add the dispatcher type. Fails if the module already has one.
    pub fn synthesize(&self, module: &mut Module) -> EngineResult<DispatcherHandles> {
        if module.find_type(reloader::TYPE_NAME).is_some() {
            return Err(EngineError::DispatcherExists(reloader::TYPE_NAME.to_string()));
        }

        let ty = module.add_type(
            TypeDef::class("", reloader::TYPE_NAME)
                .with_visibility(Visibility::Internal)
                .static_class()
                .with_attribute(compiler_generated(self.markers)),
        );
        let unload_actions = self.add_slot(module, ty, reloader::UNLOAD_ACTIONS_FIELD)?;
        let load_actions = self.add_slot(module, ty, reloader::LOAD_ACTIONS_FIELD)?;

        let handles = DispatcherHandles {
            ty,
            unload_actions,
            load_actions,
            register_unload: self.add_register(module, ty, reloader::REGISTER_UNLOAD_METHOD, unload_actions)?,
            register_load: self.add_register(module, ty, reloader::REGISTER_LOAD_METHOD, load_actions)?,
            unload: self.add_invoke(module, ty, reloader::UNLOAD_METHOD, unload_actions)?,
            load: self.add_invoke(module, ty, reloader::LOAD_METHOD, load_actions)?,
        };
        info!(module = %module.name, ty = %ty, "synthesized dispatcher");
        Ok(handles)
    }

    fn add_slot(&self, module: &mut Module, ty: TypeId, name: &str) -> EngineResult<FieldId> {
        let field = FieldDef::new_static(name, TypeSig::Callback).with_visibility(Visibility::Private);
        Ok(module.add_field(ty, field)?)
    }

    /// Lock-free add:
    ///
    /// ```text
    /// current = slot
    /// loop:
    ///     observed = current
    ///     combined = combine(observed, callback)
    ///     current = cmpxchg(&slot, combined, observed)
    ///     if current != observed: goto loop
    /// ```
    fn add_register(&self, module: &mut Module, ty: TypeId, name: &str, slot: FieldId) -> EngineResult<MethodId> {
        let slot = module.bind_field(slot, BindingContext::Open)?;
        let mut emitter = BodyEmitter::new().with_init_locals(true);
        let current = emitter.declare_local(TypeSig::Callback)?;
        let observed = emitter.declare_local(TypeSig::Callback)?;
        let combined = emitter.declare_local(TypeSig::Callback)?;
        let retry = emitter.new_label();

        emitter.emit(Instruction::LdsFld(slot.clone())).emit(Instruction::StLoc(current));
        emitter.mark(retry)?;
        emitter
            .emit(Instruction::LdLoc(current))
            .emit(Instruction::StLoc(observed))
            .emit(Instruction::LdLoc(observed))
            .emit(Instruction::LdArg(0))
            .emit(Instruction::CombineCallbacks)
            .emit(Instruction::StLoc(combined))
            .emit(Instruction::LdsFldA(slot))
            .emit(Instruction::LdLoc(combined))
            .emit(Instruction::LdLoc(observed))
            .emit(Instruction::CompareExchange)
            .emit(Instruction::StLoc(current))
            .emit(Instruction::LdLoc(current))
            .emit(Instruction::LdLoc(observed))
            .emit_branch(BranchKind::BneUn, retry)
            .emit(Instruction::Ret);

        let method = MethodDef::new_static(name, TypeSig::Void)
            .with_params(vec![ParamDef::new("callback", TypeSig::Callback)])
            .with_body(emitter.finish()?)
            .with_attribute(compiler_generated(self.markers));
        Ok(module.add_method(ty, method)?)
    }

    /// Invoke the slot's last observed value, if any
    fn add_invoke(&self, module: &mut Module, ty: TypeId, name: &str, slot: FieldId) -> EngineResult<MethodId> {
        let slot = module.bind_field(slot, BindingContext::Open)?;
        let mut emitter = BodyEmitter::new();
        let present = emitter.new_label();

        emitter
            .emit(Instruction::LdsFld(slot))
            .emit(Instruction::Dup)
            .emit_branch(BranchKind::BrTrue, present)
            .emit(Instruction::Pop)
            .emit(Instruction::Ret);
        emitter.mark(present)?;
        emitter.emit(Instruction::InvokeCallback).emit(Instruction::Ret);

        let method = MethodDef::new_static(name, TypeSig::Void)
            .with_body(emitter.finish()?)
            .with_attribute(compiler_generated(self.markers));
        Ok(module.add_method(ty, method)?)
    }
}
