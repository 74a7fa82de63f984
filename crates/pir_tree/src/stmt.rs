//! Statements inside declaration bodies.

use crate::body::LocalId;
use crate::expr::Expr;
use crate::types::IrType;
use serde::{Deserialize, Serialize};

/// A statement in a declaration body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt<R> {
    /// An expression evaluated for its effect.
    Expr(Expr<R>),
    /// Declares a body-local variable.
    Var {
        /// The local being declared.
        local: LocalId,
        /// Source name of the variable, kept for diagnostics only.
        name: String,
        /// The variable's type.
        ty: IrType<R>,
        /// The initial value, if any.
        initializer: Option<Expr<R>>,
    },
    /// Returns from the enclosing function.
    Return(Option<Expr<R>>),
    /// A `while` loop.
    While {
        /// The loop condition.
        condition: Expr<R>,
        /// The loop body.
        body: Vec<Stmt<R>>,
    },
    /// Throws the value of an expression.
    Throw(Expr<R>),
}

impl<R> Stmt<R> {
    /// Rebuilds this statement with every declaration reference translated by `f`.
    pub fn try_map_refs<S, E>(&self, f: &mut dyn FnMut(&R) -> Result<S, E>) -> Result<Stmt<S>, E> {
        Ok(match self {
            Stmt::Expr(e) => Stmt::Expr(e.try_map_refs(f)?),
            Stmt::Var {
                local,
                name,
                ty,
                initializer,
            } => Stmt::Var {
                local: *local,
                name: name.clone(),
                ty: ty.try_map_refs(f)?,
                initializer: initializer.as_ref().map(|e| e.try_map_refs(f)).transpose()?,
            },
            Stmt::Return(e) => Stmt::Return(e.as_ref().map(|e| e.try_map_refs(f)).transpose()?),
            Stmt::While { condition, body } => Stmt::While {
                condition: condition.try_map_refs(f)?,
                body: body
                    .iter()
                    .map(|s| s.try_map_refs(f))
                    .collect::<Result<_, _>>()?,
            },
            Stmt::Throw(e) => Stmt::Throw(e.try_map_refs(f)?),
        })
    }

    /// Calls `f` on every declaration reference in this statement.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        match self {
            Stmt::Expr(e) | Stmt::Throw(e) => e.for_each_ref(f),
            Stmt::Var { ty, initializer, .. } => {
                ty.for_each_ref(f);
                if let Some(e) = initializer {
                    e.for_each_ref(f);
                }
            }
            Stmt::Return(e) => {
                if let Some(e) = e {
                    e.for_each_ref(f);
                }
            }
            Stmt::While { condition, body } => {
                condition.for_each_ref(f);
                for s in body {
                    s.for_each_ref(f);
                }
            }
        }
    }
}
