//! Declaration bodies.
//!
//! A [`Body`] is immutable once built: carriers hold it behind an `Arc`, so a
//! new carrier snapshot shares the previous body until a lowering replaces it.

use crate::stmt::Stmt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body-local ID of a variable or lambda parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct LocalId(u32);

impl LocalId {
    /// Creates a local ID from its index within the body.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index within the body.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local#{}", self.0)
    }
}

/// The statements of a function, constructor, initializer or field
/// initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body<R> {
    /// Statements in execution order.
    pub statements: Vec<Stmt<R>>,
}

impl<R> Body<R> {
    /// Creates a body from its statements.
    pub fn new(statements: Vec<Stmt<R>>) -> Self {
        Self { statements }
    }

    /// Rebuilds this body with every declaration reference translated by `f`.
    pub fn try_map_refs<S, E>(&self, f: &mut dyn FnMut(&R) -> Result<S, E>) -> Result<Body<S>, E> {
        Ok(Body {
            statements: self
                .statements
                .iter()
                .map(|s| s.try_map_refs(f))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Calls `f` on every declaration reference in this body.
    pub fn for_each_ref(&self, f: &mut dyn FnMut(&R)) {
        for s in &self.statements {
            s.for_each_ref(f);
        }
    }
}

impl<R> Default for Body<R> {
    fn default() -> Self {
        Self {
            statements: Vec::new(),
        }
    }
}
