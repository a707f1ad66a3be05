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

//! Execution runtime for DotReload modules

pub mod errors;
pub mod executor;
pub mod stack;
pub mod statics;
pub mod value;

pub use errors::{VmError, VmResult};
pub use executor::{LoadedModule, Runtime};
pub use statics::{InitState, InitWaits, StaticsKey, TypeStatics};
pub use value::{BoundMethod, Callback, ModuleHandle, StaticAddress, Value};

use serde::{Deserialize, Serialize};

/// Runtime limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum nesting of routine calls, type initializers included
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self { max_call_depth: 256 }
    }
}

impl VmConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_call_depth == 0 {
            return Err("max_call_depth must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyEmitter, BranchKind, HandlerKind};
    use crate::instruction::Instruction;
    use crate::module::{BindingContext, FieldDef, MethodDef, Module, ParamDef, TypeDef, TypeSig};

    fn static_body(instructions: Vec<Instruction>) -> crate::MethodBody {
        crate::MethodBody {
            instructions,
            ..Default::default()
        }
    }

    #[test]
    fn test_initializer_runs_once_per_instantiation() {
        let mut module = Module::new("Vm.Init");
        let ty = module.add_type(TypeDef::class("Vm", "Counter`1").with_generic_params(["T"]));
        let runs = module.add_field(ty, FieldDef::new_static("runs", TypeSig::I32)).unwrap();
        let runs_ref = module.bind_field(runs, BindingContext::Open).unwrap();
        module
            .add_method(
                ty,
                MethodDef::type_initializer(static_body(vec![
                    Instruction::LdsFld(runs_ref.clone()),
                    Instruction::LdcI4(1),
                    Instruction::Add,
                    Instruction::StsFld(runs_ref),
                    Instruction::Ret,
                ])),
            )
            .unwrap();

        let runtime = Runtime::default();
        let handle = runtime.load_module(module).unwrap();
        for _ in 0..3 {
            assert_eq!(runtime.read_static(handle, runs, &[TypeSig::I32]).unwrap(), Value::I32(1));
        }
        assert_eq!(runtime.read_static(handle, runs, &[TypeSig::String]).unwrap(), Value::I32(1));
        assert_eq!(runtime.instantiation_count(), 2);
        assert!(runtime.is_initialized(handle, ty, &[TypeSig::I32]));
    }

    #[test]
    fn test_catch_handler_recovers() {
        let mut module = Module::new("Vm.Catch");
        let ty = module.add_type(TypeDef::class("Vm", "Guard"));

        let mut emitter = BodyEmitter::new().with_init_locals(true);
        let result = emitter.declare_local(TypeSig::I32).unwrap();
        let [try_start, try_end, handler_end] = [emitter.new_label(), emitter.new_label(), emitter.new_label()];
        emitter.mark(try_start).unwrap();
        emitter.emit(Instruction::LdStr("boom".into())).emit(Instruction::Throw);
        emitter.mark(try_end).unwrap();
        emitter.emit(Instruction::Pop).emit(Instruction::LdcI4(7)).emit(Instruction::StLoc(result));
        emitter.emit_branch(BranchKind::Leave, handler_end);
        emitter.mark(handler_end).unwrap();
        emitter.emit(Instruction::LdLoc(result)).emit(Instruction::Ret);
        emitter.add_handler(HandlerKind::Catch, try_start, try_end, try_end, handler_end);
        let body = emitter.finish().unwrap();

        let method = module.add_method(ty, MethodDef::new_static("Run", TypeSig::I32).with_body(body)).unwrap();
        let runtime = Runtime::default();
        let handle = runtime.load_module(module).unwrap();
        assert_eq!(runtime.invoke_static(handle, method, &[], vec![]).unwrap(), Some(Value::I32(7)));
    }

    #[test]
    fn test_uncaught_throw_propagates() {
        let mut module = Module::new("Vm.Throw");
        let ty = module.add_type(TypeDef::class("Vm", "Thrower"));
        let method = module
            .add_method(
                ty,
                MethodDef::new_static("Run", TypeSig::Void).with_body(static_body(vec![Instruction::LdcI4(3), Instruction::Throw])),
            )
            .unwrap();
        let runtime = Runtime::default();
        let handle = runtime.load_module(module).unwrap();
        assert_eq!(runtime.invoke_static(handle, method, &[], vec![]), Err(VmError::Thrown(Value::I32(3))));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut module = Module::new("Vm.Depth");
        let ty = module.add_type(TypeDef::class("Vm", "Loop"));
        let method = module.add_method(ty, MethodDef::new_static("Spin", TypeSig::Void)).unwrap();
        let self_ref = module.bind_method(method, BindingContext::Open).unwrap();
        module.method_mut(method).body = Some(static_body(vec![Instruction::Call(self_ref), Instruction::Ret]));

        let runtime = Runtime::new(VmConfig { max_call_depth: 16 });
        let handle = runtime.load_module(module).unwrap();
        assert_eq!(runtime.invoke_static(handle, method, &[], vec![]), Err(VmError::CallDepthExceeded(16)));
    }

    #[test]
    fn test_arguments_and_arity_checks() {
        let mut module = Module::new("Vm.Args");
        let ty = module.add_type(TypeDef::class("Vm", "Math"));
        let method = module
            .add_method(
                ty,
                MethodDef::new_static("Square", TypeSig::I64)
                    .with_params(vec![ParamDef::new("x", TypeSig::I64)])
                    .with_body(static_body(vec![Instruction::LdArg(0), Instruction::LdArg(0), Instruction::Mul, Instruction::Ret])),
            )
            .unwrap();
        let runtime = Runtime::default();
        let handle = runtime.load_module(module).unwrap();
        assert_eq!(runtime.invoke_static(handle, method, &[], vec![Value::I64(9)]).unwrap(), Some(Value::I64(81)));
        assert!(matches!(
            runtime.invoke_static(handle, method, &[], vec![]),
            Err(VmError::ArgumentCount { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            runtime.invoke_static(handle, method, &[TypeSig::I32], vec![Value::I64(1)]),
            Err(VmError::TypeArity { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_module_rejected() {
        let mut module = Module::new("Vm.Invalid");
        let ty = module.add_type(TypeDef::class("Vm", "Bad"));
        module
            .add_method(ty, MethodDef::new_static("Run", TypeSig::Void).with_body(static_body(vec![Instruction::Pop, Instruction::Ret])))
            .unwrap();
        assert!(matches!(Runtime::default().load_module(module), Err(VmError::Validation(_))));
    }

    #[test]
    fn test_config_validation() {
        assert!(VmConfig::default().validate().is_ok());
        assert!(VmConfig { max_call_depth: 0 }.validate().is_err());
    }
}
