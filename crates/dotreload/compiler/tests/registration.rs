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

//! Registration with the dispatcher under contention

mod support;

use dotreload_compiler::passes::DispatcherSynthesizer;
use dotreload_core::vm::{BoundMethod, Callback, Runtime, Value};
use dotreload_core::{Instruction, MethodDef, Module, TypeDef, TypeSig};
use std::sync::{Arc, Barrier};
use std::thread;
use support::*;

const THREADS: usize = 256;

#[test]
fn test_concurrent_registration_keeps_every_callback() {
    let mut module = Module::new("Contention");
    let handles = DispatcherSynthesizer::new(&markers()).synthesize(&mut module).unwrap();
    let targets = module.add_type(TypeDef::class("Bench", "Targets"));

    let mut fields = Vec::with_capacity(THREADS);
    let mut methods = Vec::with_capacity(THREADS);
    for i in 0..THREADS {
        let field = add_static(&mut module, targets, &format!("hit{i}"), TypeSig::I32);
        let field_ref = open_field(&module, field);
        let method = MethodDef::new_static(format!("Hit{i}"), TypeSig::Void).with_body(body(vec![
            Instruction::LdsFld(field_ref.clone()),
            Instruction::LdcI4(1),
            Instruction::Add,
            Instruction::StsFld(field_ref),
            Instruction::Ret,
        ]));
        fields.push(field);
        methods.push(module.add_method(targets, method).unwrap());
    }

    let runtime = Arc::new(Runtime::default());
    let handle = runtime.load_module(module).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = methods
        .into_iter()
        .map(|method| {
            let runtime = runtime.clone();
            let barrier = barrier.clone();
            let register = handles.register_load;
            thread::spawn(move || {
                let callback = Value::Callback(Arc::new(Callback::single(BoundMethod {
                    module: handle,
                    method,
                    type_args: Arc::from(Vec::new()),
                })));
                barrier.wait();
                runtime.invoke_static(handle, register, &[], vec![callback]).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    match runtime.read_static(handle, handles.load_actions, &[]).unwrap() {
        Value::Callback(combined) => assert_eq!(combined.targets().len(), THREADS),
        other => panic!("expected a combined callback, got {}", other),
    }

    runtime.invoke_static(handle, handles.load, &[], Vec::new()).unwrap();
    for field in fields {
        assert_eq!(runtime.read_static(handle, field, &[]).unwrap(), Value::I32(1));
    }
}

#[test]
fn test_concurrent_type_initialization_registers_every_type() {
    const TYPES: usize = 64;

    let mut module = game_module();
    let mut names = Vec::with_capacity(TYPES);
    for i in 0..TYPES {
        let name = format!("Actor{i}");
        let ty = module.add_type(opt_in(&name));
        let field = add_static(&mut module, ty, "ready", TypeSig::I32);
        initializer_storing(&mut module, ty, vec![(field, Instruction::LdcI4(1))]);
        names.push(format!("Game.{name}"));
    }

    let host = Arc::new(Host::start(instrument(module).module));
    let barrier = Arc::new(Barrier::new(TYPES));
    let workers: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let host = host.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                assert_eq!(host.read(&name, "ready", &[]), Value::I32(1));
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for name in &names {
        host.write(name, "ready", &[], Value::I32(0));
    }
    host.reload().unwrap();
    for name in &names {
        assert_eq!(host.read(name, "ready", &[]), Value::I32(1));
    }
}
