//! Expression trees inside declaration bodies.
//!
//! Expressions reference other declarations through `R` (a [`DeclId`] in a
//! live session, a signature in a cache payload). Local variables and lambda
//! parameters are not declarations: they are addressed by body-local
//! [`LocalId`]s and never receive a signature.
//!
//! [`DeclId`]: crate::ids::DeclId

use crate::body::{Body, LocalId};
use crate::const_value::ConstValue;
use crate::stmt::Stmt;
use crate::types::IrType;
use serde::{Deserialize, Serialize};

/// A type operator applied by [`Expr::TypeOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeOperator {
    /// Checked cast; fails at runtime on mismatch.
    Cast,
    /// Safe cast; yields `null` on mismatch.
    SafeCast,
    /// Instance check; yields a boolean.
    InstanceOf,
}

/// An expression in a declaration body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr<R> {
    /// A literal constant.
    Const(ConstValue),
    /// Reads a body-local variable.
    GetLocal(LocalId),
    /// Writes a body-local variable.
    SetLocal {
        /// The variable written.
        local: LocalId,
        /// The value stored.
        value: Box<Expr<R>>,
    },
    /// Reads a value parameter or the `this` receiver of a declaration.
    GetValue(R),
    /// Reads the singleton instance of an object class.
    GetObject(R),
    /// Reads a field.
    GetField {
        /// The field declaration.
        field: R,
        /// The instance read from; `None` for static fields.
        receiver: Option<Box<Expr<R>>>,
    },
    /// Writes a field.
    SetField {
        /// The field declaration.
        field: R,
        /// The instance written to; `None` for static fields.
        receiver: Option<Box<Expr<R>>>,
        /// The value stored.
        value: Box<Expr<R>>,
    },
    /// Calls a function.
    Call {
        /// The function declaration.
        callee: R,
        /// The dispatch receiver, for member calls.
        receiver: Option<Box<Expr<R>>>,
        /// Value arguments in parameter order.
        arguments: Vec<Expr<R>>,
        /// The result type.
        ty: IrType<R>,
    },
    /// Calls a constructor.
    New {
        /// The constructor declaration.
        constructor: R,
        /// Value arguments in parameter order.
        arguments: Vec<Expr<R>>,
    },
    /// A function literal. Its parameters are locals of the enclosing body.
    Lambda {
        /// Parameters, as locals.
        parameters: Vec<LocalId>,
        /// The lambda body.
        body: Box<Body<R>>,
    },
    /// A block of statements whose value is that of its last expression.
    Block(Vec<Stmt<R>>),
    /// A conditional expression.
    If {
        /// The condition.
        condition: Box<Expr<R>>,
        /// The value when the condition holds.
        then_branch: Box<Expr<R>>,
        /// The value otherwise.
        else_branch: Option<Box<Expr<R>>>,
    },
    /// A cast or instance check.
    TypeOp {
        /// The operator.
        operator: TypeOperator,
        /// The operand.
        operand: Box<Expr<R>>,
        /// The type operand.
        ty: IrType<R>,
    },
}

fn map_boxed<R, S, E>(
    expr: &Expr<R>,
    f: &mut dyn FnMut(&R) -> Result<S, E>,
) -> Result<Box<Expr<S>>, E> {
    Ok(Box::new(expr.try_map_refs(f)?))
}

fn map_optional<R, S, E>(
    expr: &Option<Box<Expr<R>>>,
    f: &mut dyn FnMut(&R) -> Result<S, E>,
) -> Result<Option<Box<Expr<S>>>, E> {
    expr.as_deref().map(|e| map_boxed(e, f)).transpose()
}

fn map_all<R, S, E>(
    exprs: &[Expr<R>],
    f: &mut dyn FnMut(&R) -> Result<S, E>,
) -> Result<Vec<Expr<S>>, E> {
    exprs.iter().map(|e| e.try_map_refs(f)).collect()
}

impl<R> Expr<R> {
    /// Rebuilds this expression with every declaration reference translated by
    /// `f`. Locals are carried over unchanged.
    pub fn try_map_refs<S, E>(&self, f: &mut dyn FnMut(&R) -> Result<S, E>) -> Result<Expr<S>, E> {
        Ok(match self {
            Expr::Const(value) => Expr::Const(value.clone()),
            Expr::GetLocal(local) => Expr::GetLocal(*local),
            Expr::SetLocal { local, value } => Expr::SetLocal {
                local: *local,
                value: map_boxed(value, f)?,
            },
            Expr::GetValue(r) => Expr::GetValue(f(r)?),
            Expr::GetObject(r) => Expr::GetObject(f(r)?),
            Expr::GetField { field, receiver } => Expr::GetField {
                field: f(field)?,
                receiver: map_optional(receiver, f)?,
            },
            Expr::SetField {
                field,
                receiver,
                value,
            } => Expr::SetField {
                field: f(field)?,
                receiver: map_optional(receiver, f)?,
                value: map_boxed(value, f)?,
            },
            Expr::Call {
                callee,
                receiver,
                arguments,
                ty,
            } => Expr::Call {
                callee: f(callee)?,
                receiver: map_optional(receiver, f)?,
                arguments: map_all(arguments, f)?,
                ty: ty.try_map_refs(f)?,
            },
            Expr::New {
                constructor,
                arguments,
            } => Expr::New {
                constructor: f(constructor)?,
                arguments: map_all(arguments, f)?,
            },
            Expr::Lambda { parameters, body } => Expr::Lambda {
                parameters: parameters.clone(),
                body: Box::new(body.try_map_refs(f)?),
            },
            Expr::Block(stmts) => Expr::Block(
                stmts
                    .iter()
                    .map(|s| s.try_map_refs(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => Expr::If {
                condition: map_boxed(condition, f)?,
                then_branch: map_boxed(then_branch, f)?,
                else_branch: map_optional(else_branch, f)?,
            },
            Expr::TypeOp {
                operator,
                operand,
                ty,
            } => Expr::TypeOp {
                operator: *operator,
                operand: map_boxed(operand, f)?,
                ty: ty.try_map_refs(f)?,
            },
        })
    }

    /// Calls `f` on every declaration reference in this expression, in
    /// evaluation order.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        match self {
            Expr::Const(_) | Expr::GetLocal(_) => {}
            Expr::SetLocal { value, .. } => value.for_each_ref(f),
            Expr::GetValue(r) | Expr::GetObject(r) => f(r),
            Expr::GetField { field, receiver } => {
                if let Some(receiver) = receiver {
                    receiver.for_each_ref(f);
                }
                f(field);
            }
            Expr::SetField {
                field,
                receiver,
                value,
            } => {
                if let Some(receiver) = receiver {
                    receiver.for_each_ref(f);
                }
                value.for_each_ref(f);
                f(field);
            }
            Expr::Call {
                callee,
                receiver,
                arguments,
                ty,
            } => {
                if let Some(receiver) = receiver {
                    receiver.for_each_ref(f);
                }
                for a in arguments {
                    a.for_each_ref(f);
                }
                f(callee);
                ty.for_each_ref(f);
            }
            Expr::New {
                constructor,
                arguments,
            } => {
                for a in arguments {
                    a.for_each_ref(f);
                }
                f(constructor);
            }
            Expr::Lambda { body, .. } => body.for_each_ref(f),
            Expr::Block(stmts) => {
                for s in stmts {
                    s.for_each_ref(f);
                }
            }
            Expr::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.for_each_ref(f);
                then_branch.for_each_ref(f);
                if let Some(e) = else_branch {
                    e.for_each_ref(f);
                }
            }
            Expr::TypeOp { operand, ty, .. } => {
                operand.for_each_ref(f);
                ty.for_each_ref(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DeclId;
    use crate::types::BuiltinType;
    use std::convert::Infallible;

    fn d(n: u32) -> DeclId {
        DeclId::from_raw(n)
    }

    #[test]
    fn call_visits_receiver_arguments_then_callee() {
        let call = Expr::Call {
            callee: d(1),
            receiver: Some(Box::new(Expr::GetValue(d(2)))),
            arguments: vec![Expr::GetObject(d(3)), Expr::Const(ConstValue::Int(1))],
            ty: IrType::builtin(BuiltinType::Unit),
        };
        let mut seen = Vec::new();
        call.for_each_ref(&mut |r| seen.push(*r));
        assert_eq!(seen, vec![d(2), d(3), d(1)]);
    }

    #[test]
    fn locals_are_not_references() {
        let e: Expr<DeclId> = Expr::SetLocal {
            local: LocalId::new(0),
            value: Box::new(Expr::GetLocal(LocalId::new(1))),
        };
        let mut count = 0;
        e.for_each_ref(&mut |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn lambda_body_references_are_visited() {
        let lambda = Expr::Lambda {
            parameters: vec![LocalId::new(0)],
            body: Box::new(Body::new(vec![Stmt::Expr(Expr::New {
                constructor: d(7),
                arguments: vec![Expr::GetLocal(LocalId::new(0))],
            })])),
        };
        let mut seen = Vec::new();
        lambda.for_each_ref(&mut |r| seen.push(*r));
        assert_eq!(seen, vec![d(7)]);
    }

    #[test]
    fn try_map_refs_rewrites_field_access() {
        let e = Expr::SetField {
            field: d(4),
            receiver: None,
            value: Box::new(Expr::GetField {
                field: d(5),
                receiver: Some(Box::new(Expr::GetObject(d(6)))),
            }),
        };
        let mapped: Expr<u32> = e
            .try_map_refs(&mut |r| Ok::<_, Infallible>(r.as_raw() * 10))
            .unwrap();
        assert_eq!(
            mapped,
            Expr::SetField {
                field: 40,
                receiver: None,
                value: Box::new(Expr::GetField {
                    field: 50,
                    receiver: Some(Box::new(Expr::GetObject(60))),
                }),
            }
        );
    }
}
