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

//! Module object graph
//!
//! A module is an arena of types, fields and routines. Entities are addressed by
//! copyable handles that stay valid for the lifetime of the module: the arena is
//! append-only and nothing is ever removed from it.

pub mod attributes;
pub mod signature;

pub use attributes::{AttributeSet, Constant, CustomAttribute, NamedArgument};
pub use signature::{Binding, BindingContext, FieldRef, MethodRef, TypeSig};

use crate::body::MethodBody;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the routine the runtime executes once per type (instantiation) before first use.
pub const TYPE_INITIALIZER_NAME: &str = ".typeinit";

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning arena
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Handle of a type declared in a module
    TypeId,
    "type"
);
define_handle!(
    /// Handle of a field declared in a module
    FieldId,
    "field"
);
define_handle!(
    /// Handle of a routine declared in a module
    MethodId,
    "method"
);

/// Errors raised while editing or querying a module
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    #[error("unknown type handle {0}")]
    UnknownType(TypeId),

    #[error("unknown field handle {0}")]
    UnknownField(FieldId),

    #[error("unknown method handle {0}")]
    UnknownMethod(MethodId),

    #[error("{member} is declared on a type with {expected} generic parameter(s) but was bound with {actual}")]
    ArityMismatch { member: String, expected: usize, actual: usize },

    #[error("type {0} already declares a member named {1}")]
    DuplicateMember(String, String),
}

/// Result type for module operations
pub type ModuleResult<T> = Result<T, ModuleError>;

/// 16-byte identity tying a module image to its debug symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleUid(pub [u8; 16]);

impl ModuleUid {
    /// Derive a stable identity from arbitrary seed bytes
    pub fn derive(seed: &[u8]) -> Self {
        let hash = blake3::hash(seed);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash.as_bytes()[..16]);
        ModuleUid(bytes)
    }
}

impl fmt::Display for ModuleUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Accessibility of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

/// A declared type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub namespace: String,
    pub name: String,
    pub visibility: Visibility,
    pub is_abstract: bool,
    pub is_sealed: bool,
    /// Names of the generic parameters; empty for non-generic types
    pub generic_params: Vec<String>,
    pub attributes: Vec<CustomAttribute>,
    /// Enclosing type for nested types
    pub declaring_type: Option<TypeId>,
    pub nested_types: Vec<TypeId>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
}

impl TypeDef {
    /// Create a public, non-generic class
    pub fn class(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            visibility: Visibility::Public,
            is_abstract: false,
            is_sealed: false,
            generic_params: Vec::new(),
            attributes: Vec::new(),
            declaring_type: None,
            nested_types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_generic_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark the type abstract and sealed so it can never be instantiated
    pub fn static_class(mut self) -> Self {
        self.is_abstract = true;
        self.is_sealed = true;
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn generic_arity(&self) -> usize {
        self.generic_params.len()
    }
}

/// A declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub declaring_type: TypeId,
    pub field_type: TypeSig,
    pub visibility: Visibility,
    pub is_static: bool,
    /// Compile-time constant; has no storage
    pub is_literal: bool,
    /// Read-only after type initialization
    pub is_init_only: bool,
    pub constant: Option<Constant>,
    pub attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// Create a public static field
    pub fn new_static(name: impl Into<String>, field_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            declaring_type: TypeId(0),
            field_type,
            visibility: Visibility::Public,
            is_static: true,
            is_literal: false,
            is_init_only: false,
            constant: None,
            attributes: Vec::new(),
        }
    }

    /// Create a public instance field
    pub fn new_instance(name: impl Into<String>, field_type: TypeSig) -> Self {
        Self {
            is_static: false,
            ..Self::new_static(name, field_type)
        }
    }

    /// Make the field read-only
    pub fn read_only(mut self) -> Self {
        self.is_init_only = true;
        self
    }

    /// Turn the field into a compile-time constant
    pub fn literal(mut self, value: Constant) -> Self {
        self.is_literal = true;
        self.constant = Some(value);
        self
    }

    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// A routine parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub param_type: TypeSig,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, param_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            param_type,
        }
    }
}

/// A declared routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub declaring_type: TypeId,
    pub visibility: Visibility,
    pub is_static: bool,
    /// Name carries meaning for the runtime (type initializers)
    pub is_special_name: bool,
    pub params: Vec<ParamDef>,
    pub return_type: TypeSig,
    /// Routine-level generic parameters
    pub generic_params: Vec<String>,
    pub attributes: Vec<CustomAttribute>,
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Create a public static routine whose body is a single `ret`
    pub fn new_static(name: impl Into<String>, return_type: TypeSig) -> Self {
        Self {
            name: name.into(),
            declaring_type: TypeId(0),
            visibility: Visibility::Public,
            is_static: true,
            is_special_name: false,
            params: Vec::new(),
            return_type,
            generic_params: Vec::new(),
            attributes: Vec::new(),
            body: Some(MethodBody::empty()),
        }
    }

    /// Create a type initializer with the given body
    pub fn type_initializer(body: MethodBody) -> Self {
        Self {
            visibility: Visibility::Private,
            is_special_name: true,
            body: Some(body),
            ..Self::new_static(TYPE_INITIALIZER_NAME, TypeSig::Void)
        }
    }

    pub fn with_params(mut self, params: Vec<ParamDef>) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_generic_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn is_type_initializer(&self) -> bool {
        self.is_static && self.is_special_name && self.name == TYPE_INITIALIZER_NAME
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }
}

/// An owned, mutable module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub uid: ModuleUid,
    /// Names of referenced modules
    pub references: Vec<String>,
    types: Vec<TypeDef>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    top_level: Vec<TypeId>,
}

impl Module {
    /// Create an empty module; its identity is derived from the name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: ModuleUid::derive(name.as_bytes()),
            name,
            references: Vec::new(),
            types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            top_level: Vec::new(),
        }
    }

    pub fn add_reference(&mut self, name: impl Into<String>) {
        self.references.push(name.into());
    }

    /// Add a top-level type
    pub fn add_type(&mut self, mut def: TypeDef) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        def.declaring_type = None;
        def.nested_types.clear();
        def.fields.clear();
        def.methods.clear();
        self.types.push(def);
        self.top_level.push(id);
        id
    }

    /// Add a type nested inside `outer`
    pub fn add_nested_type(&mut self, outer: TypeId, mut def: TypeDef) -> ModuleResult<TypeId> {
        self.get_type(outer).ok_or(ModuleError::UnknownType(outer))?;
        let id = TypeId(self.types.len() as u32);
        def.declaring_type = Some(outer);
        def.nested_types.clear();
        def.fields.clear();
        def.methods.clear();
        self.types.push(def);
        self.types[outer.index()].nested_types.push(id);
        Ok(id)
    }

    /// Add a field to `ty`
    pub fn add_field(&mut self, ty: TypeId, mut def: FieldDef) -> ModuleResult<FieldId> {
        let owner = self.get_type(ty).ok_or(ModuleError::UnknownType(ty))?;
        if owner.fields.iter().any(|f| self.fields[f.index()].name == def.name) {
            return Err(ModuleError::DuplicateMember(self.full_name(ty), def.name));
        }
        let id = FieldId(self.fields.len() as u32);
        def.declaring_type = ty;
        self.fields.push(def);
        self.types[ty.index()].fields.push(id);
        Ok(id)
    }

    /// Add a routine to `ty`
    pub fn add_method(&mut self, ty: TypeId, mut def: MethodDef) -> ModuleResult<MethodId> {
        self.get_type(ty).ok_or(ModuleError::UnknownType(ty))?;
        let id = MethodId(self.methods.len() as u32);
        def.declaring_type = ty;
        self.methods.push(def);
        self.types[ty.index()].methods.push(id);
        Ok(id)
    }

    pub fn get_type(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.index())
    }

    pub fn get_field(&self, id: FieldId) -> Option<&FieldDef> {
        self.fields.get(id.index())
    }

    pub fn get_method(&self, id: MethodId) -> Option<&MethodDef> {
        self.methods.get(id.index())
    }

    /// Type behind a handle minted by this module
    pub fn ty(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodDef {
        &self.methods[id.index()]
    }

    pub fn ty_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.types[id.index()]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDef {
        &mut self.fields[id.index()]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodDef {
        &mut self.methods[id.index()]
    }

    /// Top-level types in declaration order
    pub fn top_level_types(&self) -> &[TypeId] {
        &self.top_level
    }

    /// Every type, nested ones included, in arena order
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn methods(&self) -> impl Iterator<Item = (MethodId, &MethodDef)> {
        self.methods.iter().enumerate().map(|(i, m)| (MethodId(i as u32), m))
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldDef)> {
        self.fields.iter().enumerate().map(|(i, f)| (FieldId(i as u32), f))
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Full name: `Namespace.Name`, with nested types as `Outer/Inner`
    ///
    /// Falls back to the handle when the declaring chain dangles or loops.
    pub fn full_name(&self, id: TypeId) -> String {
        let mut segments = Vec::new();
        let mut cursor = id;
        loop {
            let Some(def) = self.get_type(cursor) else {
                return id.to_string();
            };
            if segments.len() >= self.types.len() {
                return id.to_string();
            }
            match def.declaring_type {
                Some(outer) => {
                    segments.push(def.name.as_str());
                    cursor = outer;
                }
                None => {
                    let root = if def.namespace.is_empty() {
                        def.name.clone()
                    } else {
                        format!("{}.{}", def.namespace, def.name)
                    };
                    return segments.iter().rev().fold(root, |name, segment| format!("{}/{}", name, segment));
                }
            }
        }
    }

    /// `Type::member` rendering used in messages
    pub fn method_name(&self, id: MethodId) -> String {
        match self.get_method(id) {
            Some(m) => format!("{}::{}", self.full_name(m.declaring_type), m.name),
            None => id.to_string(),
        }
    }

    pub fn field_name(&self, id: FieldId) -> String {
        match self.get_field(id) {
            Some(f) => format!("{}::{}", self.full_name(f.declaring_type), f.name),
            None => id.to_string(),
        }
    }

    /// Find a type by its full name
    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.types().map(|(id, _)| id).find(|id| self.full_name(*id) == full_name)
    }

    /// First routine of `ty` with the given name
    pub fn find_method(&self, ty: TypeId, name: &str) -> Option<MethodId> {
        self.get_type(ty)?
            .methods
            .iter()
            .copied()
            .find(|m| self.methods[m.index()].name == name)
    }

    /// Field of `ty` with the given name
    pub fn find_field(&self, ty: TypeId, name: &str) -> Option<FieldId> {
        self.get_type(ty)?
            .fields
            .iter()
            .copied()
            .find(|f| self.fields[f.index()].name == name)
    }

    /// The static initializer of `ty`, if it declares one
    pub fn type_initializer(&self, ty: TypeId) -> Option<MethodId> {
        self.get_type(ty)?
            .methods
            .iter()
            .copied()
            .find(|m| self.methods[m.index()].is_type_initializer())
    }

    /// Bind a routine reference in the given context.
    ///
    /// Non-generic declaring types always produce [`Binding::Direct`]; a closed
    /// context with arguments is rejected for them. Generic declaring types
    /// produce an instantiated binding whose arity is checked here.
    pub fn bind_method(&self, method: MethodId, context: BindingContext) -> ModuleResult<MethodRef> {
        let def = self.get_method(method).ok_or(ModuleError::UnknownMethod(method))?;
        let binding = self.bind(def.declaring_type, context, || self.method_name(method))?;
        Ok(MethodRef { method, binding })
    }

    /// Bind a field reference in the given context. See [`Module::bind_method`].
    pub fn bind_field(&self, field: FieldId, context: BindingContext) -> ModuleResult<FieldRef> {
        let def = self.get_field(field).ok_or(ModuleError::UnknownField(field))?;
        let binding = self.bind(def.declaring_type, context, || self.field_name(field))?;
        Ok(FieldRef { field, binding })
    }

    fn bind(&self, ty: TypeId, context: BindingContext, member: impl Fn() -> String) -> ModuleResult<Binding> {
        let arity = self.get_type(ty).ok_or(ModuleError::UnknownType(ty))?.generic_arity();
        match context {
            BindingContext::Open if arity == 0 => Ok(Binding::Direct),
            BindingContext::Open => Ok(Binding::Instantiated((0..arity as u16).map(TypeSig::TypeParam).collect())),
            BindingContext::Closed(args) if args.len() != arity => Err(ModuleError::ArityMismatch {
                member: member(),
                expected: arity,
                actual: args.len(),
            }),
            BindingContext::Closed(_) if arity == 0 => Ok(Binding::Direct),
            BindingContext::Closed(args) => Ok(Binding::Instantiated(args)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Module, TypeId, TypeId) {
        let mut module = Module::new("Sample");
        let plain = module.add_type(TypeDef::class("Game", "Score"));
        let generic = module.add_type(TypeDef::class("Game", "Cache`2").with_generic_params(["K", "V"]));
        (module, plain, generic)
    }

    #[test]
    fn test_nested_full_name() {
        let (mut module, plain, _) = sample();
        let inner = module.add_nested_type(plain, TypeDef::class("", "Inner")).unwrap();
        assert_eq!(module.full_name(inner), "Game.Score/Inner");
        assert_eq!(module.find_type("Game.Score/Inner"), Some(inner));
        assert_eq!(module.ty(plain).nested_types, vec![inner]);
        assert_eq!(module.top_level_types(), &[TypeId(0), TypeId(1)]);
    }

    #[test]
    fn test_full_name_of_looping_declaring_chain() {
        let (mut module, plain, _) = sample();
        let inner = module.add_nested_type(plain, TypeDef::class("", "Inner")).unwrap();
        module.ty_mut(plain).declaring_type = Some(inner);
        assert_eq!(module.full_name(inner), inner.to_string());
        assert_eq!(module.full_name(plain), plain.to_string());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let (mut module, plain, _) = sample();
        module.add_field(plain, FieldDef::new_static("value", TypeSig::I32)).unwrap();
        let err = module.add_field(plain, FieldDef::new_static("value", TypeSig::I64)).unwrap_err();
        assert_eq!(err, ModuleError::DuplicateMember("Game.Score".into(), "value".into()));
    }

    #[test]
    fn test_open_binding_follows_declaring_arity() {
        let (mut module, plain, generic) = sample();
        let m1 = module.add_method(plain, MethodDef::new_static("Run", TypeSig::Void)).unwrap();
        let m2 = module.add_method(generic, MethodDef::new_static("Run", TypeSig::Void)).unwrap();

        assert_eq!(module.bind_method(m1, BindingContext::Open).unwrap().binding, Binding::Direct);
        assert_eq!(
            module.bind_method(m2, BindingContext::Open).unwrap().binding,
            Binding::Instantiated(vec![TypeSig::TypeParam(0), TypeSig::TypeParam(1)])
        );
    }

    #[test]
    fn test_closed_binding_checks_arity() {
        let (mut module, _, generic) = sample();
        let field = module.add_field(generic, FieldDef::new_static("hits", TypeSig::I32)).unwrap();

        let err = module.bind_field(field, BindingContext::Closed(vec![TypeSig::I32])).unwrap_err();
        assert!(matches!(err, ModuleError::ArityMismatch { expected: 2, actual: 1, .. }));

        let bound = module
            .bind_field(field, BindingContext::Closed(vec![TypeSig::I32, TypeSig::String]))
            .unwrap();
        assert_eq!(bound.binding.args(), &[TypeSig::I32, TypeSig::String]);
    }

    #[test]
    fn test_type_initializer_lookup() {
        let (mut module, plain, _) = sample();
        assert_eq!(module.type_initializer(plain), None);
        module.add_method(plain, MethodDef::new_static("Other", TypeSig::Void)).unwrap();
        let init = module.add_method(plain, MethodDef::type_initializer(MethodBody::default())).unwrap();
        assert_eq!(module.type_initializer(plain), Some(init));
    }
}
