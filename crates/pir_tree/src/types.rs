//! IR types as stored in carriers.
//!
//! Types are generic over the reference representation `R`: inside a session
//! a class or type-parameter reference is a [`DeclId`](crate::ids::DeclId);
//! in a cache payload it is a [`Signature`](crate::signature::Signature).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Types that need no declaration to describe them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    /// The unit type.
    Unit,
    /// Booleans.
    Boolean,
    /// UTF-16 code units.
    Char,
    /// 32-bit integers.
    Int,
    /// 64-bit integers.
    Long,
    /// 64-bit floating point.
    Double,
    /// Strings.
    String,
    /// The top type.
    Any,
    /// The bottom type.
    Nothing,
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuiltinType::Unit => "Unit",
            BuiltinType::Boolean => "Boolean",
            BuiltinType::Char => "Char",
            BuiltinType::Int => "Int",
            BuiltinType::Long => "Long",
            BuiltinType::Double => "Double",
            BuiltinType::String => "String",
            BuiltinType::Any => "Any",
            BuiltinType::Nothing => "Nothing",
        };
        f.write_str(name)
    }
}

/// A type appearing in a declaration's mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType<R> {
    /// A builtin type.
    Builtin {
        /// Which builtin.
        ty: BuiltinType,
        /// Whether `null` is a value of this type.
        nullable: bool,
    },
    /// An instantiation of a class declaration.
    Class {
        /// The class declaration.
        class: R,
        /// Type arguments, in declaration order of the class's type parameters.
        arguments: Vec<IrType<R>>,
        /// Whether `null` is a value of this type.
        nullable: bool,
    },
    /// A reference to a type parameter declaration.
    Parameter {
        /// The type parameter declaration.
        parameter: R,
        /// Whether `null` is a value of this type.
        nullable: bool,
    },
    /// Placeholder for a type that failed to resolve.
    Error,
}

impl<R> IrType<R> {
    /// A non-nullable builtin type.
    pub fn builtin(ty: BuiltinType) -> Self {
        IrType::Builtin { ty, nullable: false }
    }

    /// A non-nullable class type without arguments.
    pub fn class(class: R) -> Self {
        IrType::Class {
            class,
            arguments: Vec::new(),
            nullable: false,
        }
    }

    /// The unit type.
    pub fn unit() -> Self {
        Self::builtin(BuiltinType::Unit)
    }

    /// Returns the same type with `nullable` set.
    pub fn nullable(mut self) -> Self {
        match &mut self {
            IrType::Builtin { nullable, .. }
            | IrType::Class { nullable, .. }
            | IrType::Parameter { nullable, .. } => *nullable = true,
            IrType::Error => {}
        }
        self
    }

    /// Rebuilds this type with every declaration reference translated by `f`.
    pub fn try_map_refs<S, E>(&self, f: &mut dyn FnMut(&R) -> Result<S, E>) -> Result<IrType<S>, E> {
        Ok(match self {
            IrType::Builtin { ty, nullable } => IrType::Builtin {
                ty: *ty,
                nullable: *nullable,
            },
            IrType::Class {
                class,
                arguments,
                nullable,
            } => IrType::Class {
                class: f(class)?,
                arguments: arguments
                    .iter()
                    .map(|a| a.try_map_refs(f))
                    .collect::<Result<_, _>>()?,
                nullable: *nullable,
            },
            IrType::Parameter { parameter, nullable } => IrType::Parameter {
                parameter: f(parameter)?,
                nullable: *nullable,
            },
            IrType::Error => IrType::Error,
        })
    }

    /// Calls `f` on every declaration reference in this type.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        match self {
            IrType::Class { class, arguments, .. } => {
                f(class);
                for a in arguments {
                    a.for_each_ref(f);
                }
            }
            IrType::Parameter { parameter, .. } => f(parameter),
            IrType::Builtin { .. } | IrType::Error => {}
        }
    }
}
