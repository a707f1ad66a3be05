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

//! Initializer rewriting

use super::dispatcher::DispatcherHandles;
use super::open_call;
use super::synthesizer::SynthesizedRoutines;
use crate::error::EngineResult;
use dotreload_core::{BindingContext, BodyEmitter, DebugSymbols, Instruction, MethodBody, MethodDef, MethodId, Module, TypeId};
use tracing::debug;

/// Replaces a hooked type's static initializer with one that registers the
/// type's load and unload routines with the dispatcher.
#[derive(Debug, Default)]
pub struct InitializerRewriter;

impl InitializerRewriter {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite (or create) the initializer of `ty` and return it.
    ///
    /// The new body runs the initializer copy first so a fresh load still
    /// observes the original values, then registers
    /// `callback(load)` and `callback(unload)`. Every reference is bound through
    /// the type's own generic parameters so each closed instantiation registers
    /// routines of that same instantiation.
    pub fn rewrite(
        &self,
        module: &mut Module,
        symbols: Option<&mut DebugSymbols>,
        ty: TypeId,
        initializer_copy: Option<MethodId>,
        routines: SynthesizedRoutines,
        dispatcher: &DispatcherHandles,
    ) -> EngineResult<MethodId> {
        let initializer = match module.type_initializer(ty) {
            Some(existing) => existing,
            None => module.add_method(ty, MethodDef::type_initializer(MethodBody::empty()))?,
        };

        let mut emitter = BodyEmitter::new();
        if let Some(copy) = initializer_copy {
            emitter.emit(open_call(module, copy)?);
        }
        for (routine, register) in [(routines.load, dispatcher.register_load), (routines.unload, dispatcher.register_unload)] {
            let Some(routine) = routine else {
                continue;
            };
            emitter
                .emit(Instruction::LdNull)
                .emit(Instruction::LdFtn(module.bind_method(routine, BindingContext::Open)?))
                .emit(Instruction::NewCallback)
                .emit(open_call(module, register)?);
        }
        emitter.emit(Instruction::Ret);

        module.method_mut(initializer).body = Some(emitter.finish()?);
        if let Some(symbols) = symbols {
            symbols.clear_method(initializer);
        }
        debug!(ty = %module.full_name(ty), %initializer, "rewrote type initializer");
        Ok(initializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerNames;
    use crate::passes::dispatcher::DispatcherSynthesizer;
    use dotreload_core::{Binding, MethodRef, SourceLocation, TypeDef, TypeSig};

    fn setup(generic: bool) -> (Module, TypeId, DispatcherHandles) {
        let markers = MarkerNames::default();
        let mut module = Module::new("Rewrite");
        let handles = DispatcherSynthesizer::new(&markers).synthesize(&mut module).unwrap();
        let mut def = TypeDef::class("Game", "Spawner");
        if generic {
            def = def.with_generic_params(["T", "U"]);
        }
        let ty = module.add_type(def);
        (module, ty, handles)
    }

    #[test]
    fn test_creates_initializer_when_missing() {
        let (mut module, ty, handles) = setup(false);
        let load = module.add_method(ty, MethodDef::new_static("load", TypeSig::Void)).unwrap();
        let routines = SynthesizedRoutines { load: Some(load), unload: None };

        let initializer = InitializerRewriter::new()
            .rewrite(&mut module, None, ty, None, routines, &handles)
            .unwrap();
        assert!(module.method(initializer).is_type_initializer());
        assert_eq!(
            module.method(initializer).body.as_ref().unwrap().instructions,
            vec![
                Instruction::LdNull,
                Instruction::LdFtn(MethodRef { method: load, binding: Binding::Direct }),
                Instruction::NewCallback,
                Instruction::Call(MethodRef { method: handles.register_load, binding: Binding::Direct }),
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_generic_registration_binds_open() {
        let (mut module, ty, handles) = setup(true);
        let copy = module.add_method(ty, MethodDef::new_static("copy", TypeSig::Void)).unwrap();
        let unload = module.add_method(ty, MethodDef::new_static("unload", TypeSig::Void)).unwrap();
        let original = module
            .add_method(ty, MethodDef::type_initializer(MethodBody { instructions: vec![Instruction::Nop, Instruction::Ret], ..Default::default() }))
            .unwrap();
        let mut symbols = DebugSymbols::new(module.uid);
        symbols.add_sequence_point(original, 0, SourceLocation::new("Spawner.src", 1, 1));

        let routines = SynthesizedRoutines { load: None, unload: Some(unload) };
        let initializer = InitializerRewriter::new()
            .rewrite(&mut module, Some(&mut symbols), ty, Some(copy), routines, &handles)
            .unwrap();

        let open = Binding::Instantiated(vec![TypeSig::TypeParam(0), TypeSig::TypeParam(1)]);
        assert_eq!(initializer, original);
        assert_eq!(
            module.method(initializer).body.as_ref().unwrap().instructions,
            vec![
                Instruction::Call(MethodRef { method: copy, binding: open.clone() }),
                Instruction::LdNull,
                Instruction::LdFtn(MethodRef { method: unload, binding: open }),
                Instruction::NewCallback,
                Instruction::Call(MethodRef { method: handles.register_unload, binding: Binding::Direct }),
                Instruction::Ret,
            ]
        );
        assert!(symbols.sequence_points(original).is_empty());
    }
}
