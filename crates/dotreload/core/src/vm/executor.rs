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

//! Interpreter and module registry

use super::VmConfig;
use super::errors::{VmError, VmResult};
use super::stack::OperandStack;
use super::statics::{InitState, InitTicket, InitWaits, StaticsKey, TypeStatics};
use super::value::{BoundMethod, Callback, ModuleHandle, StaticAddress, Value};
use crate::body::HandlerKind;
use crate::instruction::Instruction;
use crate::module::{FieldId, FieldRef, MethodId, MethodRef, Module, TypeId, TypeSig};
use crate::validate::validate_module;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

/// A module loaded into a [`Runtime`]. Immutable once loaded.
#[derive(Debug)]
pub struct LoadedModule {
    handle: ModuleHandle,
    module: Module,
    /// Slot of every field within its declaring type's storage, by field index
    field_slots: Vec<usize>,
}

impl LoadedModule {
    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    fn slot_of(&self, field: FieldId) -> VmResult<usize> {
        self.field_slots
            .get(field.index())
            .copied()
            .ok_or_else(|| VmError::UnknownField(field.to_string()))
    }
}

/// Execution runtime
///
/// Any number of threads may execute routines concurrently. Static storage is
/// kept per closed instantiation and every instantiation runs its type
/// initializer exactly once, before first use.
pub struct Runtime {
    config: VmConfig,
    modules: RwLock<Vec<Arc<LoadedModule>>>,
    statics: Mutex<HashMap<StaticsKey, Arc<TypeStatics>>>,
    init_waits: InitWaits,
    gc_passes: AtomicU64,
}

enum Flow {
    Next,
    Jump(u32),
    Return(Option<Value>),
}

struct Frame {
    loaded: Arc<LoadedModule>,
    method: MethodId,
    routine: String,
    type_args: Arc<[TypeSig]>,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: OperandStack,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Runtime {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            modules: RwLock::new(Vec::new()),
            statics: Mutex::new(HashMap::new()),
            init_waits: InitWaits::new(),
            gc_passes: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Validate and load a module
    pub fn load_module(&self, module: Module) -> VmResult<ModuleHandle> {
        validate_module(&module)?;

        let mut field_slots = vec![0; module.field_count()];
        for (_, ty) in module.types() {
            for (slot, field) in ty.fields.iter().enumerate() {
                field_slots[field.index()] = slot;
            }
        }

        let mut modules = self.modules.write();
        let handle = ModuleHandle(modules.len());
        info!(module = %module.name, %handle, types = module.type_count(), "module loaded");
        modules.push(Arc::new(LoadedModule {
            handle,
            module,
            field_slots,
        }));
        Ok(handle)
    }

    pub fn module(&self, handle: ModuleHandle) -> VmResult<Arc<LoadedModule>> {
        self.modules.read().get(handle.0).cloned().ok_or(VmError::UnknownModule(handle.0))
    }

    /// Handles of every loaded module, in load order
    pub fn module_handles(&self) -> Vec<ModuleHandle> {
        self.modules.read().iter().map(|m| m.handle).collect()
    }

    pub fn find_type(&self, handle: ModuleHandle, full_name: &str) -> VmResult<Option<TypeId>> {
        Ok(self.module(handle)?.module.find_type(full_name))
    }

    /// Resolve `Type::method` by names
    pub fn find_method(&self, handle: ModuleHandle, type_name: &str, method_name: &str) -> VmResult<MethodId> {
        let loaded = self.module(handle)?;
        let ty = loaded
            .module
            .find_type(type_name)
            .ok_or_else(|| VmError::UnknownType(type_name.to_string()))?;
        loaded
            .module
            .find_method(ty, method_name)
            .ok_or_else(|| VmError::UnknownMethod(format!("{}::{}", type_name, method_name)))
    }

    /// Resolve `Type::field` by names
    pub fn find_field(&self, handle: ModuleHandle, type_name: &str, field_name: &str) -> VmResult<FieldId> {
        let loaded = self.module(handle)?;
        let ty = loaded
            .module
            .find_type(type_name)
            .ok_or_else(|| VmError::UnknownType(type_name.to_string()))?;
        loaded
            .module
            .find_field(ty, field_name)
            .ok_or_else(|| VmError::UnknownField(format!("{}::{}", type_name, field_name)))
    }

    /// Call a static routine of a loaded module from the host
    pub fn invoke_static(&self, handle: ModuleHandle, method: MethodId, type_args: &[TypeSig], args: Vec<Value>) -> VmResult<Option<Value>> {
        let loaded = self.module(handle)?;
        let def = loaded
            .module
            .get_method(method)
            .ok_or_else(|| VmError::UnknownMethod(method.to_string()))?;
        let type_args = self.closed_args(&loaded, def.declaring_type, type_args, || loaded.module.method_name(method))?;
        let bound = BoundMethod {
            module: handle,
            method,
            type_args,
        };
        self.call_bound(&bound, args, 0)
    }

    /// Read a static field of a closed instantiation, running its initializer first
    pub fn read_static(&self, handle: ModuleHandle, field: FieldId, type_args: &[TypeSig]) -> VmResult<Value> {
        let (statics, slot) = self.host_slot(handle, field, type_args)?;
        let value = statics.slot(slot).map(|v| v.clone());
        value.ok_or_else(|| VmError::UnknownField(field.to_string()))
    }

    /// Write a static field of a closed instantiation, running its initializer first
    pub fn write_static(&self, handle: ModuleHandle, field: FieldId, type_args: &[TypeSig], value: Value) -> VmResult<()> {
        let (statics, slot) = self.host_slot(handle, field, type_args)?;
        let mut guard = statics.slot(slot).ok_or_else(|| VmError::UnknownField(field.to_string()))?;
        *guard = value;
        Ok(())
    }

    /// Whether the initializer of a closed instantiation has completed
    pub fn is_initialized(&self, handle: ModuleHandle, ty: TypeId, type_args: &[TypeSig]) -> bool {
        let key = StaticsKey {
            module: handle,
            ty,
            type_args: type_args.to_vec(),
        };
        self.statics
            .lock()
            .get(&key)
            .is_some_and(|s| s.state() == InitState::Done)
    }

    /// Number of closed instantiations that own static storage
    pub fn instantiation_count(&self) -> usize {
        self.statics.lock().len()
    }

    /// Garbage pass requested by the host between unload and load
    pub fn collect_garbage(&self) {
        let passes = self.gc_passes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(passes, "garbage pass");
    }

    pub fn gc_passes(&self) -> u64 {
        self.gc_passes.load(Ordering::SeqCst)
    }

    fn host_slot(&self, handle: ModuleHandle, field: FieldId, type_args: &[TypeSig]) -> VmResult<(Arc<TypeStatics>, usize)> {
        let loaded = self.module(handle)?;
        let def = loaded
            .module
            .get_field(field)
            .ok_or_else(|| VmError::UnknownField(field.to_string()))?;
        if !def.is_static || def.is_literal {
            return Err(VmError::UnknownField(format!("{} has no static storage", loaded.module.field_name(field))));
        }
        let type_args = self.closed_args(&loaded, def.declaring_type, type_args, || loaded.module.field_name(field))?;
        let statics = self.ensure_initialized(&loaded, def.declaring_type, &type_args, 0)?;
        Ok((statics, loaded.slot_of(field)?))
    }

    fn closed_args(&self, loaded: &LoadedModule, ty: TypeId, type_args: &[TypeSig], member: impl Fn() -> String) -> VmResult<Arc<[TypeSig]>> {
        let arity = loaded
            .module
            .get_type(ty)
            .ok_or_else(|| VmError::UnknownType(ty.to_string()))?
            .generic_arity();
        if arity != type_args.len() {
            return Err(VmError::TypeArity {
                member: member(),
                expected: arity,
                actual: type_args.len(),
            });
        }
        if let Some(open) = type_args.iter().find(|a| !a.is_closed()) {
            return Err(VmError::OpenTypeArgument(open.clone()));
        }
        Ok(Arc::from(type_args))
    }

    fn statics_for(&self, loaded: &LoadedModule, ty: TypeId, type_args: &[TypeSig]) -> VmResult<Arc<TypeStatics>> {
        let key = StaticsKey {
            module: loaded.handle,
            ty,
            type_args: type_args.to_vec(),
        };
        let mut table = self.statics.lock();
        if let Some(existing) = table.get(&key) {
            return Ok(existing.clone());
        }

        let def = loaded.module.get_type(ty).ok_or_else(|| VmError::UnknownType(ty.to_string()))?;
        let defaults = def
            .fields
            .iter()
            .map(|f| {
                let field = loaded.module.field(*f);
                if field.is_static && !field.is_literal {
                    Value::default_for(&field.field_type.substitute(type_args))
                } else {
                    Value::Null
                }
            })
            .collect();
        let statics = Arc::new(TypeStatics::new(key.clone(), defaults));
        table.insert(key, statics.clone());
        Ok(statics)
    }

    /// Storage of a closed instantiation, after its initializer has run
    fn ensure_initialized(&self, loaded: &Arc<LoadedModule>, ty: TypeId, type_args: &Arc<[TypeSig]>, depth: usize) -> VmResult<Arc<TypeStatics>> {
        let statics = self.statics_for(loaded, ty, type_args)?;
        match statics.begin_init(&self.init_waits) {
            InitTicket::Ready => Ok(statics),
            InitTicket::Failed(message) => Err(VmError::TypeInitializationFailed {
                ty: loaded.module.full_name(ty),
                message,
            }),
            InitTicket::Run => {
                let outcome = match loaded.module.type_initializer(ty) {
                    Some(initializer) => {
                        trace!(ty = %loaded.module.full_name(ty), args = type_args.len(), "running type initializer");
                        self.execute(loaded, initializer, type_args.clone(), Vec::new(), depth + 1).map(|_| ())
                    }
                    None => Ok(()),
                };
                match outcome {
                    Ok(()) => {
                        statics.finish_init(&self.init_waits, Ok(()));
                        Ok(statics)
                    }
                    Err(error) => {
                        let message = error.to_string();
                        statics.finish_init(&self.init_waits, Err(message.clone()));
                        Err(VmError::TypeInitializationFailed {
                            ty: loaded.module.full_name(ty),
                            message,
                        })
                    }
                }
            }
        }
    }

    /// Call a bound routine, running its declaring type's initializer first
    fn call_bound(&self, bound: &BoundMethod, args: Vec<Value>, depth: usize) -> VmResult<Option<Value>> {
        let loaded = self.module(bound.module)?;
        let declaring = loaded
            .module
            .get_method(bound.method)
            .ok_or_else(|| VmError::UnknownMethod(bound.method.to_string()))?
            .declaring_type;
        self.ensure_initialized(&loaded, declaring, &bound.type_args, depth)?;
        self.execute(&loaded, bound.method, bound.type_args.clone(), args, depth + 1)
    }

    fn execute(&self, loaded: &Arc<LoadedModule>, method: MethodId, type_args: Arc<[TypeSig]>, args: Vec<Value>, depth: usize) -> VmResult<Option<Value>> {
        if depth > self.config.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.config.max_call_depth));
        }
        let module = &loaded.module;
        let def = module.get_method(method).ok_or_else(|| VmError::UnknownMethod(method.to_string()))?;
        let routine = module.method_name(method);
        let body = def
            .body
            .as_ref()
            .ok_or_else(|| VmError::InvalidProgram(format!("{} has no body", routine)))?;
        if args.len() != def.params.len() {
            return Err(VmError::ArgumentCount {
                method: routine,
                expected: def.params.len(),
                actual: args.len(),
            });
        }

        let locals = body.locals.iter().map(|sig| Value::default_for(&sig.substitute(&type_args))).collect();
        let mut frame = Frame {
            loaded: loaded.clone(),
            method,
            routine,
            type_args,
            args,
            locals,
            stack: OperandStack::new(),
        };

        let mut pc = 0usize;
        loop {
            let instruction = body
                .instructions
                .get(pc)
                .ok_or_else(|| VmError::InvalidProgram(format!("{}: control left the body", frame.routine)))?;
            match self.step(&mut frame, instruction, pc as u32, depth) {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(target)) => pc = target as usize,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(VmError::Thrown(value)) => match body.exception_handlers.iter().find(|h| h.covers(pc as u32)) {
                    Some(handler) if handler.kind == HandlerKind::Catch => {
                        trace!(routine = %frame.routine, pc, handler = handler.handler_start, "exception caught");
                        frame.stack.clear();
                        frame.stack.push(value)?;
                        pc = handler.handler_start as usize;
                    }
                    Some(_) => return Err(VmError::Unsupported("finally handlers")),
                    None => return Err(VmError::Thrown(value)),
                },
                Err(other) => return Err(other),
            }
        }
    }

    fn bind(frame: &Frame, method_ref: &MethodRef) -> BoundMethod {
        BoundMethod {
            module: frame.loaded.handle,
            method: method_ref.method,
            type_args: close(method_ref.binding.args(), &frame.type_args),
        }
    }

    fn static_slot(&self, frame: &Frame, field_ref: &FieldRef, depth: usize) -> VmResult<StaticAddress> {
        let module = &frame.loaded.module;
        let def = module
            .get_field(field_ref.field)
            .ok_or_else(|| VmError::UnknownField(field_ref.field.to_string()))?;
        let type_args = close(field_ref.binding.args(), &frame.type_args);
        let statics = self.ensure_initialized(&frame.loaded, def.declaring_type, &type_args, depth)?;
        Ok(StaticAddress {
            statics,
            slot: frame.loaded.slot_of(field_ref.field)?,
        })
    }

    fn step(&self, frame: &mut Frame, instruction: &Instruction, pc: u32, depth: usize) -> VmResult<Flow> {
        let stack = &mut frame.stack;
        let routine = frame.routine.as_str();
        match instruction {
            Instruction::Nop => {}
            Instruction::Ret => {
                let returns = !frame.loaded.module.method(frame.method).return_type.is_void();
                let value = if returns { Some(stack.pop(routine)?) } else { None };
                return Ok(Flow::Return(value));
            }
            Instruction::Pop => {
                stack.pop(routine)?;
            }
            Instruction::Dup => {
                let value = stack.pop(routine)?;
                stack.push(value.clone())?;
                stack.push(value)?;
            }
            Instruction::LdNull => stack.push(Value::Null)?,
            Instruction::LdcI4(v) => stack.push(Value::I32(*v))?,
            Instruction::LdcI8(v) => stack.push(Value::I64(*v))?,
            Instruction::LdcR8(v) => stack.push(Value::F64(*v))?,
            Instruction::LdStr(s) => stack.push(Value::str(s))?,
            Instruction::LdLoc(n) => {
                let value = frame.locals.get(*n as usize).cloned().ok_or_else(|| invalid(routine, "local"))?;
                stack.push(value)?;
            }
            Instruction::StLoc(n) => {
                let value = stack.pop(routine)?;
                *frame.locals.get_mut(*n as usize).ok_or_else(|| invalid(routine, "local"))? = value;
            }
            Instruction::LdArg(n) => {
                let value = frame.args.get(*n as usize).cloned().ok_or_else(|| invalid(routine, "argument"))?;
                stack.push(value)?;
            }
            Instruction::LdsFld(field_ref) => {
                let address = self.static_slot(frame, field_ref, depth)?;
                let value = load(&address)?;
                frame.stack.push(value)?;
            }
            Instruction::StsFld(field_ref) => {
                let value = frame.stack.pop(&frame.routine)?;
                let address = self.static_slot(frame, field_ref, depth)?;
                store(&address, value)?;
            }
            Instruction::LdsFldA(field_ref) => {
                let address = self.static_slot(frame, field_ref, depth)?;
                frame.stack.push(Value::Address(address))?;
            }
            Instruction::InitObj(sig) => {
                let address = pop_address(stack, routine, "initobj")?;
                store(&address, Value::default_for(&sig.substitute(&frame.type_args)))?;
            }
            Instruction::Add | Instruction::Sub | Instruction::Mul => {
                let right = stack.pop(routine)?;
                let left = stack.pop(routine)?;
                stack.push(arithmetic(instruction, left, right)?)?;
            }
            Instruction::Ceq => {
                let right = stack.pop(routine)?;
                let left = stack.pop(routine)?;
                stack.push(Value::I32(i32::from(left.same_identity(&right))))?;
            }
            Instruction::Br(target) => return Ok(Flow::Jump(*target)),
            Instruction::BrTrue(target) => {
                if stack.pop(routine)?.is_truthy() {
                    return Ok(Flow::Jump(*target));
                }
            }
            Instruction::BrFalse(target) => {
                if !stack.pop(routine)?.is_truthy() {
                    return Ok(Flow::Jump(*target));
                }
            }
            Instruction::BneUn(target) => {
                let right = stack.pop(routine)?;
                let left = stack.pop(routine)?;
                if !left.same_identity(&right) {
                    return Ok(Flow::Jump(*target));
                }
            }
            Instruction::Call(method_ref) => {
                let callee = frame
                    .loaded
                    .module
                    .get_method(method_ref.method)
                    .ok_or_else(|| VmError::UnknownMethod(method_ref.method.to_string()))?;
                let returns = !callee.return_type.is_void();
                let args = frame.stack.pop_n(callee.params.len(), &frame.routine)?;
                let bound = Self::bind(frame, method_ref);
                let result = self.call_bound(&bound, args, depth)?;
                if returns {
                    let value = result.ok_or_else(|| invalid(&frame.routine, "return value"))?;
                    frame.stack.push(value)?;
                }
            }
            Instruction::LdFtn(method_ref) => {
                let bound = Self::bind(frame, method_ref);
                frame.stack.push(Value::FnPtr(bound))?;
            }
            Instruction::NewCallback => {
                let pointer = stack.pop(routine)?;
                let target = stack.pop(routine)?;
                match (target, pointer) {
                    (Value::Null, Value::FnPtr(bound)) => stack.push(Value::Callback(Arc::new(Callback::single(bound))))?,
                    (Value::Null, other) => return Err(mismatch("newcallback", &other)),
                    (other, _) => return Err(mismatch("newcallback", &other)),
                }
            }
            Instruction::CombineCallbacks => {
                let second = stack.pop(routine)?;
                let first = stack.pop(routine)?;
                let combined = Callback::combine(&first, &second).ok_or_else(|| {
                    let offender = if matches!(first, Value::Null | Value::Callback(_)) { &second } else { &first };
                    mismatch("combine", offender)
                })?;
                stack.push(combined)?;
            }
            Instruction::InvokeCallback => match stack.pop(routine)? {
                Value::Callback(callback) => {
                    for target in callback.targets() {
                        self.call_bound(target, Vec::new(), depth)?;
                    }
                }
                Value::Null => return Err(VmError::NullReference("invoke")),
                other => return Err(mismatch("invoke", &other)),
            },
            Instruction::CompareExchange => {
                let comparand = stack.pop(routine)?;
                let value = stack.pop(routine)?;
                let address = pop_address(stack, routine, "cmpxchg")?;
                let mut slot = address
                    .statics
                    .slot(address.slot)
                    .ok_or_else(|| invalid(routine, "static slot"))?;
                let prior = slot.clone();
                if prior.same_identity(&comparand) {
                    *slot = value;
                }
                drop(slot);
                stack.push(prior)?;
            }
            Instruction::Throw => {
                let value = stack.pop(routine)?;
                return Err(VmError::Thrown(value));
            }
            Instruction::Leave(target) => {
                let body = frame.loaded.module.method(frame.method).body.as_ref();
                let in_finally_region = body.is_some_and(|b| {
                    b.exception_handlers
                        .iter()
                        .any(|h| h.kind == HandlerKind::Finally && h.covers(pc))
                });
                if in_finally_region {
                    return Err(VmError::Unsupported("finally handlers"));
                }
                stack.clear();
                return Ok(Flow::Jump(*target));
            }
            Instruction::EndFinally => return Err(VmError::Unsupported("finally handlers")),
        }
        Ok(Flow::Next)
    }
}

fn close(binding_args: &[TypeSig], frame_args: &[TypeSig]) -> Arc<[TypeSig]> {
    binding_args.iter().map(|arg| arg.substitute(frame_args)).collect()
}

fn invalid(routine: &str, what: &str) -> VmError {
    VmError::InvalidProgram(format!("{}: bad {} reference", routine, what))
}

fn mismatch(op: &'static str, found: &Value) -> VmError {
    VmError::TypeMismatch {
        op,
        found: found.type_name(),
    }
}

fn pop_address(stack: &mut OperandStack, routine: &str, op: &'static str) -> VmResult<StaticAddress> {
    match stack.pop(routine)? {
        Value::Address(address) => Ok(address),
        other => Err(mismatch(op, &other)),
    }
}

fn load(address: &StaticAddress) -> VmResult<Value> {
    let slot = address
        .statics
        .slot(address.slot)
        .ok_or_else(|| VmError::InvalidProgram(format!("static slot {} out of range", address.slot)))?;
    Ok(slot.clone())
}

fn store(address: &StaticAddress, value: Value) -> VmResult<()> {
    let mut slot = address
        .statics
        .slot(address.slot)
        .ok_or_else(|| VmError::InvalidProgram(format!("static slot {} out of range", address.slot)))?;
    *slot = value;
    Ok(())
}

fn arithmetic(op: &Instruction, left: Value, right: Value) -> VmResult<Value> {
    let result = match (left, right) {
        (Value::I32(a), Value::I32(b)) => Value::I32(match op {
            Instruction::Add => a.wrapping_add(b),
            Instruction::Sub => a.wrapping_sub(b),
            _ => a.wrapping_mul(b),
        }),
        (Value::I64(a), Value::I64(b)) => Value::I64(match op {
            Instruction::Add => a.wrapping_add(b),
            Instruction::Sub => a.wrapping_sub(b),
            _ => a.wrapping_mul(b),
        }),
        (Value::F64(a), Value::F64(b)) => Value::F64(match op {
            Instruction::Add => a + b,
            Instruction::Sub => a - b,
            _ => a * b,
        }),
        (left, _) => {
            return Err(VmError::TypeMismatch {
                op: op.opcode().mnemonic(),
                found: left.type_name(),
            });
        }
    };
    Ok(result)
}
