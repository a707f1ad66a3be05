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

use dotreload_compiler::{EngineConfig, Instrumentation, MarkerNames, instrument_module};
use dotreload_core::vm::{Runtime, Value};
use dotreload_core::{BindingContext, CustomAttribute, FieldDef, FieldId, Instruction, MethodBody, MethodDef, Module, TypeDef, TypeSig};
use dotreload_runtime::{ReloadError, TypeReloader};
use std::sync::Arc;

/// Instrumented module with one opt-in type `<name>.State` whose `value` starts at `initial`
fn reloadable(name: &str, initial: i32) -> Module {
    let markers = MarkerNames::default();
    let mut module = Module::new(name);
    let ty = module.add_type(TypeDef::class(name, "State").with_attribute(CustomAttribute::new(markers.reload_on_enter)));
    let value = module.add_field(ty, FieldDef::new_static("value", TypeSig::I32)).unwrap();
    let value_ref = module.bind_field(value, BindingContext::Open).unwrap();
    let initializer = MethodBody {
        instructions: vec![Instruction::LdcI4(initial), Instruction::StsFld(value_ref), Instruction::Ret],
        ..MethodBody::default()
    };
    module.add_method(ty, MethodDef::type_initializer(initializer)).unwrap();

    match instrument_module(module, None, &EngineConfig::default()).unwrap() {
        Instrumentation::Instrumented(instrumented) => instrumented.module,
        Instrumentation::Unchanged => panic!("{name} should be instrumented"),
    }
}

fn state_field(runtime: &Runtime, handle: dotreload_core::vm::ModuleHandle, name: &str) -> FieldId {
    runtime.find_field(handle, &format!("{name}.State"), "value").unwrap()
}

#[test]
fn test_reload_resets_every_instrumented_module() {
    let runtime = Arc::new(Runtime::default());
    let game = runtime.load_module(reloadable("Game", 10)).unwrap();
    let ui = runtime.load_module(reloadable("Ui", 20)).unwrap();
    let plain = runtime.load_module(Module::new("Plain")).unwrap();

    let game_value = state_field(&runtime, game, "Game");
    let ui_value = state_field(&runtime, ui, "Ui");
    runtime.write_static(game, game_value, &[], Value::I32(1)).unwrap();
    runtime.write_static(ui, ui_value, &[], Value::I32(2)).unwrap();

    let reloader = TypeReloader::new(runtime.clone());
    let modules = reloader.reloadable_modules().unwrap();
    assert_eq!(modules.iter().map(|m| m.handle).collect::<Vec<_>>(), vec![game, ui]);
    assert!(modules.iter().all(|m| m.handle != plain));

    let report = reloader.reload_dirty_types().unwrap();
    assert_eq!(report.modules, 2);
    assert_eq!(report.gc_passes, 1);
    assert_eq!(runtime.read_static(game, game_value, &[]).unwrap(), Value::I32(10));
    assert_eq!(runtime.read_static(ui, ui_value, &[]).unwrap(), Value::I32(20));
}

#[test]
fn test_modules_loaded_later_need_refresh() {
    let runtime = Arc::new(Runtime::default());
    runtime.load_module(reloadable("Game", 1)).unwrap();
    let reloader = TypeReloader::new(runtime.clone());
    assert_eq!(reloader.reloadable_modules().unwrap().len(), 1);

    let late = runtime.load_module(reloadable("Late", 5)).unwrap();
    let late_value = state_field(&runtime, late, "Late");
    runtime.write_static(late, late_value, &[], Value::I32(0)).unwrap();

    assert_eq!(reloader.reload_dirty_types().unwrap().modules, 1);
    assert_eq!(runtime.read_static(late, late_value, &[]).unwrap(), Value::I32(0));

    assert_eq!(reloader.refresh().unwrap(), 2);
    reloader.reload_dirty_types().unwrap();
    assert_eq!(runtime.read_static(late, late_value, &[]).unwrap(), Value::I32(5));
}

#[test]
fn test_host_restart_with_full_reload_is_a_no_op() {
    let runtime = Arc::new(Runtime::default());
    let game = runtime.load_module(reloadable("Game", 3)).unwrap();
    let value = state_field(&runtime, game, "Game");
    runtime.write_static(game, value, &[], Value::I32(9)).unwrap();

    let reloader = TypeReloader::new(runtime.clone());
    assert_eq!(reloader.on_host_restart(true).unwrap(), None);
    assert_eq!(runtime.gc_passes(), 0);
    assert_eq!(runtime.read_static(game, value, &[]).unwrap(), Value::I32(9));

    assert!(reloader.on_host_restart(false).unwrap().is_some());
    assert_eq!(runtime.read_static(game, value, &[]).unwrap(), Value::I32(3));
}

#[test]
fn test_failing_unload_aborts_the_cycle() {
    let markers = MarkerNames::default();
    let mut module = Module::new("Fragile");
    let ty = module.add_type(TypeDef::class("Fragile", "State").with_attribute(CustomAttribute::new(markers.reload_on_enter)));
    let value = module.add_field(ty, FieldDef::new_static("value", TypeSig::I32)).unwrap();
    let teardown = MethodDef::new_static("Explode", TypeSig::Void)
        .with_attribute(CustomAttribute::new(markers.run_before_reload))
        .with_body(MethodBody {
            instructions: vec![Instruction::LdStr("teardown failed".to_string()), Instruction::Throw],
            ..MethodBody::default()
        });
    module.add_method(ty, teardown).unwrap();
    let module = match instrument_module(module, None, &EngineConfig::default()).unwrap() {
        Instrumentation::Instrumented(instrumented) => instrumented.module,
        Instrumentation::Unchanged => panic!("Fragile should be instrumented"),
    };

    let runtime = Arc::new(Runtime::default());
    let handle = runtime.load_module(module).unwrap();
    runtime.write_static(handle, value, &[], Value::I32(4)).unwrap();

    let reloader = TypeReloader::new(runtime.clone());
    let error = reloader.reload_dirty_types().unwrap_err();
    assert!(matches!(error, ReloadError::Unload { .. }));
    assert_eq!(error.module(), Some("Fragile"));
    assert_eq!(runtime.gc_passes(), 0);
    assert_eq!(runtime.read_static(handle, value, &[]).unwrap(), Value::I32(4));
}
