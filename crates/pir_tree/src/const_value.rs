//! Literal constants appearing in declaration bodies and annotations.

use serde::{Deserialize, Serialize};

/// A literal constant value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    /// The `null` literal.
    Null,
    /// A boolean literal.
    Bool(bool),
    /// A character literal.
    Char(char),
    /// A 32-bit integer literal.
    Int(i32),
    /// A 64-bit integer literal.
    Long(i64),
    /// A floating-point literal.
    Double(f64),
    /// A string literal.
    String(String),
}
