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

//! Structural validator
//!
//! Every module handed back by the instrumentation engine goes through
//! [`validate_module`]. The checks cover handle ranges, nesting consistency,
//! generic bindings, static-only member access, local/argument/branch ranges,
//! exception-handler ranges and stack discipline.

use crate::body::{HandlerKind, MethodBody};
use crate::instruction::Instruction;
use crate::module::{Binding, FieldRef, MethodDef, MethodId, MethodRef, Module, TypeId, TypeSig};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{context}: dangling reference to {handle}")]
    DanglingHandle { context: String, handle: String },

    #[error("{context}: inconsistent nesting: {detail}")]
    Nesting { context: String, detail: String },

    #[error("{context}: {member} bound with {actual} type argument(s), declaring type has {expected}")]
    BindingArity {
        context: String,
        member: String,
        expected: usize,
        actual: usize,
    },

    #[error("{context}: generic parameter !{index} out of range (arity {arity})")]
    TypeParamOutOfRange { context: String, index: u16, arity: usize },

    #[error("{context}: {member} is not static")]
    NotStatic { context: String, member: String },

    #[error("{context}: literal field {field} has no storage")]
    LiteralAccess { context: String, field: String },

    #[error("{context}: literal field {field} has no constant value")]
    MissingConstant { context: String, field: String },

    #[error("{context}: routine {method} has no body")]
    MissingBody { context: String, method: String },

    #[error("{context}: local {index} out of range ({count} declared)")]
    LocalOutOfRange { context: String, index: u16, count: usize },

    #[error("{context}: argument {index} out of range ({count} declared)")]
    ArgumentOutOfRange { context: String, index: u16, count: usize },

    #[error("{context}: branch at IL_{offset:04} targets {target}, body has {len} instructions")]
    BranchOutOfRange { context: String, offset: u32, target: u32, len: usize },

    #[error("{context}: exception handler #{index} has an invalid range")]
    InvalidHandler { context: String, index: usize },

    #[error("{context}: stack underflow at IL_{offset:04}")]
    StackUnderflow { context: String, offset: u32 },

    #[error("{context}: stack height at IL_{offset:04} is {actual} on one path and {expected} on another")]
    StackMismatch {
        context: String,
        offset: u32,
        expected: u32,
        actual: u32,
    },

    #[error("{context}: ret at IL_{offset:04} with stack height {height}, expected {expected}")]
    InvalidReturn {
        context: String,
        offset: u32,
        height: u32,
        expected: u32,
    },

    #[error("{context}: control falls off the end of the body")]
    FallsOffEnd { context: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a whole module
pub fn validate_module(module: &Module) -> ValidationResult<()> {
    let validator = Validator { module };
    validator.check_types()?;
    for (id, _) in module.fields() {
        validator.check_field(id)?;
    }
    for (id, method) in module.methods() {
        validator.check_method(id, method)?;
    }
    debug!(
        module = %module.name,
        types = module.type_count(),
        methods = module.method_count(),
        "module validated"
    );
    Ok(())
}

/// Check type handles and the nesting graph.
///
/// Cheap enough to run on a freshly decoded module before anything walks
/// its types: every handle is in range, the declaring and nested links
/// agree, and no type is (transitively) nested in itself.
pub fn check_nesting(module: &Module) -> ValidationResult<()> {
    let count = module.type_count();
    let in_range = |ty: TypeId| ty.index() < count;

    for &top in module.top_level_types() {
        let def = module.get_type(top).ok_or_else(|| ValidationError::DanglingHandle {
            context: "top-level types".to_string(),
            handle: top.to_string(),
        })?;
        if def.declaring_type.is_some() {
            return Err(ValidationError::Nesting {
                context: top.to_string(),
                detail: "listed as top-level but has a declaring type".to_string(),
            });
        }
    }

    for (id, def) in module.types() {
        let context = id.to_string();
        let dangling = |handle: TypeId| ValidationError::DanglingHandle {
            context: context.clone(),
            handle: handle.to_string(),
        };
        match def.declaring_type {
            Some(outer) if !in_range(outer) => return Err(dangling(outer)),
            Some(outer) if !module.ty(outer).nested_types.contains(&id) => {
                return Err(ValidationError::Nesting {
                    context,
                    detail: format!("not listed among the nested types of {}", outer),
                });
            }
            None if !module.top_level_types().contains(&id) => {
                return Err(ValidationError::Nesting {
                    context,
                    detail: "neither nested nor top-level".to_string(),
                });
            }
            _ => {}
        }
        for &nested in &def.nested_types {
            if !in_range(nested) {
                return Err(dangling(nested));
            }
            if module.ty(nested).declaring_type != Some(id) {
                return Err(ValidationError::Nesting {
                    context,
                    detail: format!("{} does not name it as declaring type", nested),
                });
            }
        }
    }

    // Every nested link mirrors a declaring link, so acyclic declaring
    // chains leave the nested graph a forest.
    let mut settled = vec![false; count];
    for (start, _) in module.types() {
        let mut chain = Vec::new();
        let mut cursor = Some(start);
        while let Some(ty) = cursor {
            if settled[ty.index()] {
                break;
            }
            if chain.contains(&ty) {
                return Err(ValidationError::Nesting {
                    context: start.to_string(),
                    detail: "declaring types form a cycle".to_string(),
                });
            }
            chain.push(ty);
            cursor = module.ty(ty).declaring_type;
        }
        for ty in chain {
            settled[ty.index()] = true;
        }
    }
    Ok(())
}

struct Validator<'m> {
    module: &'m Module,
}

impl<'m> Validator<'m> {
    fn type_arity(&self, context: &str, ty: TypeId) -> ValidationResult<usize> {
        self.module
            .get_type(ty)
            .map(|t| t.generic_arity())
            .ok_or_else(|| ValidationError::DanglingHandle {
                context: context.to_string(),
                handle: ty.to_string(),
            })
    }

    fn check_types(&self) -> ValidationResult<()> {
        let module = self.module;
        check_nesting(module)?;

        for (id, def) in module.types() {
            let context = module.full_name(id);
            let dangling = |handle: String| ValidationError::DanglingHandle {
                context: context.clone(),
                handle,
            };

            for &field in &def.fields {
                let owner = module.get_field(field).ok_or_else(|| dangling(field.to_string()))?.declaring_type;
                if owner != id {
                    return Err(ValidationError::Nesting {
                        context,
                        detail: format!("{} is declared on {}", field, owner),
                    });
                }
            }
            for &method in &def.methods {
                let owner = module.get_method(method).ok_or_else(|| dangling(method.to_string()))?.declaring_type;
                if owner != id {
                    return Err(ValidationError::Nesting {
                        context,
                        detail: format!("{} is declared on {}", method, owner),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_field(&self, id: crate::module::FieldId) -> ValidationResult<()> {
        let field = self.module.field(id);
        let context = self.module.field_name(id);
        let arity = self.type_arity(&context, field.declaring_type)?;
        self.check_sig(&context, &field.field_type, arity)?;
        if field.is_literal && field.constant.is_none() {
            return Err(ValidationError::MissingConstant {
                context: context.clone(),
                field: context,
            });
        }
        Ok(())
    }

    fn check_sig(&self, context: &str, sig: &TypeSig, arity: usize) -> ValidationResult<()> {
        match sig {
            TypeSig::TypeParam(index) if *index as usize >= arity => Err(ValidationError::TypeParamOutOfRange {
                context: context.to_string(),
                index: *index,
                arity,
            }),
            TypeSig::ByRef(inner) => self.check_sig(context, inner, arity),
            TypeSig::Defined { ty, args } => {
                let expected = self.type_arity(context, *ty)?;
                if args.len() != expected {
                    return Err(ValidationError::BindingArity {
                        context: context.to_string(),
                        member: self.module.full_name(*ty),
                        expected,
                        actual: args.len(),
                    });
                }
                args.iter().try_for_each(|arg| self.check_sig(context, arg, arity))
            }
            _ => Ok(()),
        }
    }

    fn check_binding(&self, context: &str, member: String, declaring: TypeId, binding: &Binding, arity: usize) -> ValidationResult<()> {
        let expected = self.type_arity(context, declaring)?;
        let well_formed = match binding {
            Binding::Direct => expected == 0,
            Binding::Instantiated(args) => expected > 0 && args.len() == expected,
        };
        if !well_formed {
            return Err(ValidationError::BindingArity {
                context: context.to_string(),
                member,
                expected,
                actual: binding.arity(),
            });
        }
        binding.args().iter().try_for_each(|arg| self.check_sig(context, arg, arity))
    }

    fn check_field_ref(&self, context: &str, field_ref: &FieldRef, arity: usize) -> ValidationResult<()> {
        let field = self.module.get_field(field_ref.field).ok_or_else(|| ValidationError::DanglingHandle {
            context: context.to_string(),
            handle: field_ref.field.to_string(),
        })?;
        let member = self.module.field_name(field_ref.field);
        if !field.is_static {
            return Err(ValidationError::NotStatic {
                context: context.to_string(),
                member,
            });
        }
        if field.is_literal {
            return Err(ValidationError::LiteralAccess {
                context: context.to_string(),
                field: member,
            });
        }
        self.check_binding(context, member, field.declaring_type, &field_ref.binding, arity)
    }

    fn check_method_ref(&self, context: &str, method_ref: &MethodRef, arity: usize) -> ValidationResult<()> {
        let method = self.module.get_method(method_ref.method).ok_or_else(|| ValidationError::DanglingHandle {
            context: context.to_string(),
            handle: method_ref.method.to_string(),
        })?;
        let member = self.module.method_name(method_ref.method);
        if !method.is_static {
            return Err(ValidationError::NotStatic {
                context: context.to_string(),
                member,
            });
        }
        if method.body.is_none() {
            return Err(ValidationError::MissingBody {
                context: context.to_string(),
                method: member,
            });
        }
        self.check_binding(context, member, method.declaring_type, &method_ref.binding, arity)
    }

    fn check_method(&self, id: MethodId, method: &MethodDef) -> ValidationResult<()> {
        let context = self.module.method_name(id);
        let arity = self.type_arity(&context, method.declaring_type)?;
        self.check_sig(&context, &method.return_type, arity)?;
        for param in &method.params {
            self.check_sig(&context, &param.param_type, arity)?;
        }
        let Some(body) = &method.body else {
            return Ok(());
        };
        for local in &body.locals {
            self.check_sig(&context, local, arity)?;
        }

        let len = body.instructions.len();
        for (offset, instruction) in body.instructions.iter().enumerate() {
            let offset = offset as u32;
            if let Some(target) = instruction.branch_target() {
                if target as usize >= len {
                    return Err(ValidationError::BranchOutOfRange {
                        context,
                        offset,
                        target,
                        len,
                    });
                }
            }
            match instruction {
                Instruction::LdLoc(index) | Instruction::StLoc(index) if *index as usize >= body.locals.len() => {
                    return Err(ValidationError::LocalOutOfRange {
                        context,
                        index: *index,
                        count: body.locals.len(),
                    });
                }
                Instruction::LdArg(index) if *index as usize >= method.params.len() => {
                    return Err(ValidationError::ArgumentOutOfRange {
                        context,
                        index: *index,
                        count: method.params.len(),
                    });
                }
                Instruction::InitObj(sig) => self.check_sig(&context, sig, arity)?,
                other => {
                    if let Some(field_ref) = other.field_operand() {
                        self.check_field_ref(&context, field_ref, arity)?;
                    }
                    if let Some(method_ref) = other.method_operand() {
                        self.check_method_ref(&context, method_ref, arity)?;
                    }
                }
            }
        }

        for (index, handler) in body.exception_handlers.iter().enumerate() {
            let ordered = handler.try_start < handler.try_end && handler.handler_start < handler.handler_end;
            let in_range = handler.try_end as usize <= len && handler.handler_end as usize <= len;
            let disjoint = handler.try_end <= handler.handler_start || handler.handler_end <= handler.try_start;
            if !(ordered && in_range && disjoint) {
                return Err(ValidationError::InvalidHandler { context, index });
            }
        }

        self.check_stack(&context, method, body)
    }

    /// Data-flow pass over stack heights
    fn check_stack(&self, context: &str, method: &MethodDef, body: &MethodBody) -> ValidationResult<()> {
        let len = body.instructions.len();
        if len == 0 {
            return Err(ValidationError::FallsOffEnd {
                context: context.to_string(),
            });
        }
        let return_height = u32::from(!method.return_type.is_void());
        let mut heights: Vec<Option<u32>> = vec![None; len];
        let mut worklist: Vec<(usize, u32)> = vec![(0, 0)];
        for handler in &body.exception_handlers {
            let entry = match handler.kind {
                HandlerKind::Catch => 1,
                HandlerKind::Finally => 0,
            };
            worklist.push((handler.handler_start as usize, entry));
        }

        while let Some((offset, height)) = worklist.pop() {
            if offset >= len {
                return Err(ValidationError::FallsOffEnd {
                    context: context.to_string(),
                });
            }
            match heights[offset] {
                Some(known) if known == height => continue,
                Some(known) => {
                    return Err(ValidationError::StackMismatch {
                        context: context.to_string(),
                        offset: offset as u32,
                        expected: known,
                        actual: height,
                    });
                }
                None => heights[offset] = Some(height),
            }

            let instruction = &body.instructions[offset];
            let (pops, pushes) = self.stack_effect(instruction);
            if height < pops {
                return Err(ValidationError::StackUnderflow {
                    context: context.to_string(),
                    offset: offset as u32,
                });
            }
            let after = height - pops + pushes;

            match instruction {
                Instruction::Ret => {
                    if height != return_height {
                        return Err(ValidationError::InvalidReturn {
                            context: context.to_string(),
                            offset: offset as u32,
                            height,
                            expected: return_height,
                        });
                    }
                }
                Instruction::Throw | Instruction::EndFinally => {}
                Instruction::Leave(target) => worklist.push((*target as usize, 0)),
                Instruction::Br(target) => worklist.push((*target as usize, after)),
                Instruction::BrTrue(target) | Instruction::BrFalse(target) | Instruction::BneUn(target) => {
                    worklist.push((*target as usize, after));
                    worklist.push((offset + 1, after));
                }
                _ => worklist.push((offset + 1, after)),
            }
        }
        Ok(())
    }

    fn stack_effect(&self, instruction: &Instruction) -> (u32, u32) {
        match instruction {
            Instruction::Nop | Instruction::Ret | Instruction::Br(_) | Instruction::Leave(_) | Instruction::EndFinally => (0, 0),
            Instruction::Pop | Instruction::StLoc(_) | Instruction::StsFld(_) | Instruction::InitObj(_) => (1, 0),
            Instruction::BrTrue(_) | Instruction::BrFalse(_) | Instruction::InvokeCallback | Instruction::Throw => (1, 0),
            Instruction::Dup => (1, 2),
            Instruction::LdNull
            | Instruction::LdcI4(_)
            | Instruction::LdcI8(_)
            | Instruction::LdcR8(_)
            | Instruction::LdStr(_)
            | Instruction::LdLoc(_)
            | Instruction::LdArg(_)
            | Instruction::LdsFld(_)
            | Instruction::LdsFldA(_)
            | Instruction::LdFtn(_) => (0, 1),
            Instruction::Add | Instruction::Sub | Instruction::Mul | Instruction::Ceq => (2, 1),
            Instruction::NewCallback | Instruction::CombineCallbacks => (2, 1),
            Instruction::BneUn(_) => (2, 0),
            Instruction::CompareExchange => (3, 1),
            Instruction::Call(method_ref) => {
                let callee = self.module.method(method_ref.method);
                (callee.params.len() as u32, u32::from(!callee.return_type.is_void()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::ExceptionHandler;
    use crate::module::{BindingContext, FieldDef, ParamDef, TypeDef};

    fn module_with(body: MethodBody) -> (Module, MethodId) {
        let mut module = Module::new("Validate");
        let ty = module.add_type(TypeDef::class("V", "Host"));
        let method = module
            .add_method(ty, MethodDef::new_static("Run", TypeSig::Void).with_body(body))
            .unwrap();
        (module, method)
    }

    fn body(instructions: Vec<Instruction>) -> MethodBody {
        MethodBody {
            instructions,
            ..MethodBody::default()
        }
    }

    #[test]
    fn test_accepts_simple_body() {
        let (module, _) = module_with(body(vec![Instruction::LdcI4(1), Instruction::Pop, Instruction::Ret]));
        assert_eq!(validate_module(&module), Ok(()));
    }

    #[test]
    fn test_rejects_underflow() {
        let (module, _) = module_with(body(vec![Instruction::Pop, Instruction::Ret]));
        assert!(matches!(validate_module(&module), Err(ValidationError::StackUnderflow { offset: 0, .. })));
    }

    #[test]
    fn test_rejects_fall_off_end() {
        let (module, _) = module_with(body(vec![Instruction::Nop]));
        assert!(matches!(validate_module(&module), Err(ValidationError::FallsOffEnd { .. })));
    }

    #[test]
    fn test_rejects_branch_out_of_range() {
        let (module, _) = module_with(body(vec![Instruction::Br(5), Instruction::Ret]));
        assert!(matches!(validate_module(&module), Err(ValidationError::BranchOutOfRange { target: 5, .. })));
    }

    #[test]
    fn test_rejects_merge_mismatch() {
        let (module, _) = module_with(body(vec![
            Instruction::LdcI4(0),
            Instruction::BrTrue(3),
            Instruction::LdcI4(1),
            Instruction::Pop,
            Instruction::Ret,
        ]));
        assert!(matches!(validate_module(&module), Err(ValidationError::StackMismatch { offset: 3, .. })));
    }

    #[test]
    fn test_rejects_unbound_generic_field() {
        let mut module = Module::new("Validate");
        let generic = module.add_type(TypeDef::class("V", "Box`1").with_generic_params(["T"]));
        let field = module.add_field(generic, FieldDef::new_static("value", TypeSig::TypeParam(0))).unwrap();
        let host = module.add_type(TypeDef::class("V", "Host"));
        let unbound = FieldRef { field, binding: Binding::Direct };
        module
            .add_method(
                host,
                MethodDef::new_static("Run", TypeSig::Void).with_body(body(vec![
                    Instruction::LdsFld(unbound),
                    Instruction::Pop,
                    Instruction::Ret,
                ])),
            )
            .unwrap();
        assert!(matches!(validate_module(&module), Err(ValidationError::BindingArity { expected: 1, actual: 0, .. })));
    }

    #[test]
    fn test_rejects_type_param_outside_generic_type() {
        let mut module = Module::new("Validate");
        let generic = module.add_type(TypeDef::class("V", "Box`1").with_generic_params(["T"]));
        let field = module.add_field(generic, FieldDef::new_static("value", TypeSig::TypeParam(0))).unwrap();
        let host = module.add_type(TypeDef::class("V", "Host"));
        let open = module.bind_field(field, BindingContext::Open).unwrap();
        module
            .add_method(
                host,
                MethodDef::new_static("Run", TypeSig::Void).with_body(body(vec![
                    Instruction::LdsFld(open),
                    Instruction::Pop,
                    Instruction::Ret,
                ])),
            )
            .unwrap();
        assert!(matches!(validate_module(&module), Err(ValidationError::TypeParamOutOfRange { index: 0, arity: 0, .. })));
    }

    #[test]
    fn test_argument_and_return_checks() {
        let mut module = Module::new("Validate");
        let ty = module.add_type(TypeDef::class("V", "Math"));
        module
            .add_method(
                ty,
                MethodDef::new_static("Twice", TypeSig::I32)
                    .with_params(vec![ParamDef::new("x", TypeSig::I32)])
                    .with_body(body(vec![Instruction::LdArg(0), Instruction::LdArg(0), Instruction::Add, Instruction::Ret])),
            )
            .unwrap();
        assert_eq!(validate_module(&module), Ok(()));

        module
            .add_method(
                ty,
                MethodDef::new_static("Broken", TypeSig::I32).with_body(body(vec![Instruction::LdArg(1), Instruction::Ret])),
            )
            .unwrap();
        assert!(matches!(validate_module(&module), Err(ValidationError::ArgumentOutOfRange { index: 1, .. })));
    }

    #[test]
    fn test_catch_handler_entry_height() {
        let handler = ExceptionHandler {
            kind: HandlerKind::Catch,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 4,
        };
        let mut protected = body(vec![
            Instruction::LdNull,
            Instruction::Throw,
            Instruction::Pop,
            Instruction::Leave(4),
            Instruction::Ret,
        ]);
        protected.exception_handlers.push(handler.clone());
        let (module, _) = module_with(protected);
        assert_eq!(validate_module(&module), Ok(()));

        let mut bad = body(vec![Instruction::Ret]);
        bad.exception_handlers.push(handler);
        let (module, _) = module_with(bad);
        assert!(matches!(validate_module(&module), Err(ValidationError::InvalidHandler { index: 0, .. })));
    }

    #[test]
    fn test_rejects_cyclic_nesting() {
        let mut module = Module::new("Validate");
        let outer = module.add_type(TypeDef::class("V", "Outer"));
        let a = module.add_nested_type(outer, TypeDef::class("", "A")).unwrap();
        let b = module.add_nested_type(a, TypeDef::class("", "B")).unwrap();
        assert_eq!(check_nesting(&module), Ok(()));

        module.ty_mut(outer).nested_types.clear();
        module.ty_mut(a).declaring_type = Some(b);
        module.ty_mut(b).nested_types.push(a);
        let err = check_nesting(&module).unwrap_err();
        assert!(matches!(&err, ValidationError::Nesting { detail, .. } if detail.contains("cycle")));
        assert_eq!(validate_module(&module), Err(err));
    }

    #[test]
    fn test_rejects_out_of_range_nested_handle() {
        let mut module = Module::new("Validate");
        let outer = module.add_type(TypeDef::class("V", "Outer"));
        module.ty_mut(outer).nested_types.push(TypeId(9));
        assert!(matches!(check_nesting(&module), Err(ValidationError::DanglingHandle { .. })));
    }
}
