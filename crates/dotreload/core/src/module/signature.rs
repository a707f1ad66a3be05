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

//! Type signatures and member references

use super::{FieldId, MethodId, TypeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature of a value type as it appears in fields, locals, parameters and returns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    Void,
    Bool,
    I32,
    I64,
    F64,
    String,
    Object,
    /// Parameterless, void-returning multicast callback.
    Callback,
    /// Managed pointer to storage of the inner type.
    ByRef(Box<TypeSig>),
    /// Type declared in the same module, instantiated with `args` when generic.
    Defined { ty: TypeId, args: Vec<TypeSig> },
    /// Generic parameter of the enclosing type, by position.
    TypeParam(u16),
    /// Type declared outside the module, by full name. Always a reference type.
    External(String),
}

impl TypeSig {
    /// Non-generic reference to a type of this module
    pub fn defined(ty: TypeId) -> Self {
        TypeSig::Defined { ty, args: Vec::new() }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Void)
    }

    /// Whether the signature mentions no generic parameter
    pub fn is_closed(&self) -> bool {
        match self {
            TypeSig::TypeParam(_) => false,
            TypeSig::ByRef(inner) => inner.is_closed(),
            TypeSig::Defined { args, .. } => args.iter().all(TypeSig::is_closed),
            _ => true,
        }
    }

    /// Highest generic parameter index mentioned, if any
    pub fn max_type_param(&self) -> Option<u16> {
        match self {
            TypeSig::TypeParam(index) => Some(*index),
            TypeSig::ByRef(inner) => inner.max_type_param(),
            TypeSig::Defined { args, .. } => args.iter().filter_map(TypeSig::max_type_param).max(),
            _ => None,
        }
    }

    /// Replace generic parameters with the given arguments.
    ///
    /// Parameters without a matching argument are left in place; the validator
    /// rejects such signatures before they can reach a runtime.
    pub fn substitute(&self, args: &[TypeSig]) -> TypeSig {
        match self {
            TypeSig::TypeParam(index) => args.get(*index as usize).cloned().unwrap_or_else(|| self.clone()),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(inner.substitute(args))),
            TypeSig::Defined { ty, args: inner } => TypeSig::Defined {
                ty: *ty,
                args: inner.iter().map(|a| a.substitute(args)).collect(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Bool => write!(f, "bool"),
            TypeSig::I32 => write!(f, "i32"),
            TypeSig::I64 => write!(f, "i64"),
            TypeSig::F64 => write!(f, "f64"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::Callback => write!(f, "callback"),
            TypeSig::ByRef(inner) => write!(f, "{}&", inner),
            TypeSig::Defined { ty, args } => {
                write!(f, "{}", ty)?;
                write_args(f, args)
            }
            TypeSig::TypeParam(index) => write!(f, "!{}", index),
            TypeSig::External(name) => write!(f, "[ext]{}", name),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[TypeSig]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    write!(f, "<")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ">")
}

/// How a member reference is bound to its declaring type's generic parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binding {
    /// The declaring type is not generic.
    Direct,
    /// The declaring type is generic and is instantiated with these arguments.
    ///
    /// Arguments may mention `TypeParam`s of the *referencing* routine's type;
    /// they are resolved against the calling frame's instantiation at runtime.
    Instantiated(Vec<TypeSig>),
}

impl Binding {
    /// Number of type arguments supplied
    pub fn arity(&self) -> usize {
        match self {
            Binding::Direct => 0,
            Binding::Instantiated(args) => args.len(),
        }
    }

    /// Type arguments as a slice (empty for direct bindings)
    pub fn args(&self) -> &[TypeSig] {
        match self {
            Binding::Direct => &[],
            Binding::Instantiated(args) => args,
        }
    }
}

/// Context a caller supplies when asking the module for a member reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingContext {
    /// Bind through the declaring type's own generic parameter list. Used by code
    /// that lives on the declaring type itself and runs once per instantiation.
    Open,
    /// Bind to one closed instantiation.
    Closed(Vec<TypeSig>),
}

/// Reference to a routine together with its generic binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub method: MethodId,
    pub binding: Binding,
}

/// Reference to a field together with its generic binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub field: FieldId,
    pub binding: Binding,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method)?;
        write_args(f, self.binding.args())
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)?;
        write_args(f, self.binding.args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_nested_parameters() {
        let sig = TypeSig::Defined {
            ty: TypeId(3),
            args: vec![TypeSig::TypeParam(1), TypeSig::ByRef(Box::new(TypeSig::TypeParam(0)))],
        };
        let closed = sig.substitute(&[TypeSig::I32, TypeSig::String]);
        assert_eq!(
            closed,
            TypeSig::Defined {
                ty: TypeId(3),
                args: vec![TypeSig::String, TypeSig::ByRef(Box::new(TypeSig::I32))],
            }
        );
        assert!(closed.is_closed());
        assert!(!sig.is_closed());
        assert_eq!(sig.max_type_param(), Some(1));
    }

    #[test]
    fn test_substitute_leaves_unmatched_parameter() {
        assert_eq!(TypeSig::TypeParam(2).substitute(&[TypeSig::I32]), TypeSig::TypeParam(2));
    }

    #[test]
    fn test_display() {
        let sig = TypeSig::Defined { ty: TypeId(1), args: vec![TypeSig::TypeParam(0)] };
        assert_eq!(sig.to_string(), "type#1<!0>");
        assert_eq!(TypeSig::ByRef(Box::new(TypeSig::Callback)).to_string(), "callback&");
    }
}
