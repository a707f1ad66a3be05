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

//! Module builders and a small host shared by the integration tests

#![allow(dead_code)]

use dotreload_compiler::{CompiledModule, EngineConfig, Instrumentation, InstrumentedModule, MarkerNames, instrument_module};
use dotreload_core::vm::{ModuleHandle, Runtime, Value, VmResult};
use dotreload_core::{
    BindingContext, Constant, CustomAttribute, DebugSymbols, FieldDef, FieldId, FieldRef, Instruction, MethodBody, MethodDef, MethodId, Module, TypeDef, TypeId,
    TypeSig, write_module, write_symbols,
};
use dotreload_common::reloader;

pub fn markers() -> MarkerNames {
    MarkerNames::default()
}

pub fn game_module() -> Module {
    let mut module = Module::new("Game");
    module.add_reference("DotReload");
    module
}

/// Type carrying the opt-in marker
pub fn opt_in(name: &str) -> TypeDef {
    TypeDef::class("Game", name).with_attribute(CustomAttribute::new(markers().reload_on_enter))
}

pub fn body(instructions: Vec<Instruction>) -> MethodBody {
    MethodBody {
        instructions,
        ..MethodBody::default()
    }
}

pub fn open_field(module: &Module, field: FieldId) -> FieldRef {
    module.bind_field(field, BindingContext::Open).unwrap()
}

pub fn add_static(module: &mut Module, ty: TypeId, name: &str, sig: TypeSig) -> FieldId {
    module.add_field(ty, FieldDef::new_static(name, sig)).unwrap()
}

/// Teardown marker with an optional ordering key
pub fn teardown_marker(order: Option<i32>) -> CustomAttribute {
    let markers = markers();
    let marker = CustomAttribute::new(markers.run_before_reload);
    match order {
        Some(order) => marker.with_property(markers.order_property, Constant::I32(order)),
        None => marker,
    }
}

/// Adds `Game.Log` with a single `trace: i64` static and returns the field.
pub fn add_log(module: &mut Module) -> FieldId {
    let log = module.add_type(TypeDef::class("Game", "Log"));
    add_static(module, log, "trace", TypeSig::I64)
}

/// Teardown routine appending `digit` to the decimal trace kept in `log`
pub fn logging_teardown(module: &mut Module, ty: TypeId, log: FieldId, name: &str, order: Option<i32>, digit: i64) -> MethodId {
    let trace = open_field(module, log);
    let method = MethodDef::new_static(name, TypeSig::Void)
        .with_attribute(teardown_marker(order))
        .with_body(body(vec![
            Instruction::LdsFld(trace.clone()),
            Instruction::LdcI8(10),
            Instruction::Mul,
            Instruction::LdcI8(digit),
            Instruction::Add,
            Instruction::StsFld(trace),
            Instruction::Ret,
        ]));
    module.add_method(ty, method).unwrap()
}

/// Type initializer storing each constant into its field, in order
pub fn initializer_storing(module: &mut Module, ty: TypeId, stores: Vec<(FieldId, Instruction)>) -> MethodId {
    let mut instructions = Vec::new();
    for (field, load) in stores {
        instructions.push(load);
        instructions.push(Instruction::StsFld(open_field(module, field)));
    }
    instructions.push(Instruction::Ret);
    module.add_method(ty, MethodDef::type_initializer(body(instructions))).unwrap()
}

pub fn compiled(module: &Module, symbols: Option<&DebugSymbols>) -> CompiledModule {
    CompiledModule {
        name: module.name.clone(),
        references: vec!["System.Runtime".to_string(), "DotReload.drm".to_string()],
        defines: vec!["DEBUG".to_string(), "DOTRELOAD_HOST".to_string()],
        image: write_module(module).unwrap(),
        symbols: symbols.map(|s| write_symbols(s).unwrap()),
    }
}

pub fn instrument(module: Module) -> InstrumentedModule {
    match instrument_module(module, None, &EngineConfig::default()).unwrap() {
        Instrumentation::Instrumented(instrumented) => *instrumented,
        Instrumentation::Unchanged => panic!("module was expected to be instrumented"),
    }
}

/// Runtime with one loaded module and the dispatcher entry points resolved
pub struct Host {
    pub runtime: Runtime,
    pub handle: ModuleHandle,
    unload: MethodId,
    load: MethodId,
}

impl Host {
    pub fn start(module: Module) -> Self {
        let runtime = Runtime::default();
        let handle = runtime.load_module(module).unwrap();
        let unload = runtime.find_method(handle, reloader::TYPE_NAME, reloader::UNLOAD_METHOD).unwrap();
        let load = runtime.find_method(handle, reloader::TYPE_NAME, reloader::LOAD_METHOD).unwrap();
        Self { runtime, handle, unload, load }
    }

    pub fn unload(&self) -> VmResult<()> {
        self.runtime.invoke_static(self.handle, self.unload, &[], Vec::new()).map(|_| ())
    }

    pub fn load(&self) -> VmResult<()> {
        self.runtime.invoke_static(self.handle, self.load, &[], Vec::new()).map(|_| ())
    }

    /// Unload, garbage pass, load
    pub fn reload(&self) -> VmResult<()> {
        self.unload()?;
        self.runtime.collect_garbage();
        self.load()
    }

    pub fn read(&self, type_name: &str, field: &str, type_args: &[TypeSig]) -> Value {
        let field = self.runtime.find_field(self.handle, type_name, field).unwrap();
        self.runtime.read_static(self.handle, field, type_args).unwrap()
    }

    pub fn write(&self, type_name: &str, field: &str, type_args: &[TypeSig], value: Value) {
        let field = self.runtime.find_field(self.handle, type_name, field).unwrap();
        self.runtime.write_static(self.handle, field, type_args, value).unwrap();
    }
}
