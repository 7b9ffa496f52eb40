//! Compile-time values.
//!
//! A [`Value`] is only meaningful next to the [`Type`] it was produced with;
//! the pair forms a [`TypedValue`]. Integers are held as `i128`, which bounds
//! compile-time integer arithmetic: results outside that range are reported
//! as overflow by the analyzer.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::{CmpOp, DeclId, Type};

/// A global variable's storage description.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Declaration that owns the storage.
    pub owner: DeclId,
    /// Initial value; `None` for extern variables.
    pub init: Option<Value>,
    pub is_mutable: bool,
    pub is_extern: bool,
    pub is_threadlocal: bool,
}

/// A compile-time known value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Undefined,
    Null,
    Bool(bool),
    Int(i128),
    Float(OrderedFloat<f64>),
    Type(Type),
    /// A function with a body; its `Fn` lives in the owner decl's arena.
    Function(DeclId),
    /// A function declared without a body.
    ExternFn(DeclId),
    /// A global `var` or `extern` variable.
    Variable(Arc<Variable>),
    /// Address of a declaration's storage.
    DeclRef(DeclId),
    Array(Arc<[Value]>),
    Slice { ptr: Arc<Value>, len: u64 },
    /// Address of a comptime-mutable local slot.
    ComptimeAlloc(u32),
}

impl Value {
    #[inline]
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as a float; integers convert.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(v.0),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// Whether a float value has a non-zero fractional part.
    pub fn float_has_fraction(&self) -> bool {
        match self {
            Value::Float(v) => v.0.is_finite() && v.0.fract() != 0.0,
            _ => false,
        }
    }

    /// Sign of a numeric value.
    pub fn order_against_zero(&self) -> Option<Ordering> {
        match self {
            Value::Int(v) => Some(v.cmp(&0)),
            Value::Float(v) => v.0.partial_cmp(&0.0),
            _ => None,
        }
    }

    /// Compare two compile-time values. `None` if they are not comparable.
    pub fn compare(&self, op: CmpOp, rhs: &Value) -> Option<bool> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Some(op.holds(a.cmp(b))),
            (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
                let (a, b) = (self.as_float()?, rhs.as_float()?);
                Some(match a.partial_cmp(&b) {
                    Some(ord) => op.holds(ord),
                    None => op == CmpOp::Neq,
                })
            }
            _ if op.is_equality() => {
                let eq = match (self, rhs) {
                    (Value::Bool(a), Value::Bool(b)) => a == b,
                    (Value::Type(a), Value::Type(b)) => a == b,
                    (Value::Null, Value::Null) | (Value::Void, Value::Void) => true,
                    (Value::Null, _) | (_, Value::Null) => false,
                    (Value::DeclRef(a), Value::DeclRef(b)) => a == b,
                    _ => return None,
                };
                Some(if op == CmpOp::Eq { eq } else { !eq })
            }
            _ => None,
        }
    }
}

/// Number of bits needed to hold `value` in two's complement.
///
/// Non-negative values report their unsigned width; callers add a sign bit
/// when the destination is signed.
pub fn int_bit_count_twos_comp(value: i128) -> u32 {
    if value >= 0 {
        128 - value.leading_zeros()
    } else {
        let mag = value.unsigned_abs();
        let bits = 128 - mag.leading_zeros();
        if mag.is_power_of_two() { bits } else { bits + 1 }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("{}"),
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v.0),
            Value::Type(ty) => write!(f, "{}", ty),
            Value::Function(decl) => write!(f, "(function {})", decl),
            Value::ExternFn(decl) => write!(f, "(extern function {})", decl),
            Value::Variable(var) => write!(f, "(variable {})", var.owner),
            Value::DeclRef(decl) => write!(f, "&{}", decl),
            Value::Array(elems) => {
                f.write_str("{ ")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                f.write_str(" }")
            }
            Value::Slice { ptr, len } => write!(f, "{}[0..{}]", ptr, len),
            Value::ComptimeAlloc(slot) => write!(f, "(comptime alloc {})", slot),
        }
    }
}

/// A value together with its type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: Type,
    pub val: Value,
}

impl TypedValue {
    pub fn new(ty: Type, val: Value) -> Self {
        Self { ty, val }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twos_comp_bit_counts() {
        assert_eq!(int_bit_count_twos_comp(0), 0);
        assert_eq!(int_bit_count_twos_comp(1), 1);
        assert_eq!(int_bit_count_twos_comp(255), 8);
        assert_eq!(int_bit_count_twos_comp(256), 9);
        assert_eq!(int_bit_count_twos_comp(-1), 1);
        assert_eq!(int_bit_count_twos_comp(-8), 4);
        assert_eq!(int_bit_count_twos_comp(-7), 4);
        assert_eq!(int_bit_count_twos_comp(-129), 9);
    }

    #[test]
    fn compare_mixed_numeric() {
        assert_eq!(Value::Int(5).compare(CmpOp::Eq, &Value::Int(5)), Some(true));
        assert_eq!(
            Value::Int(2).compare(CmpOp::Lt, &Value::Float(OrderedFloat(2.5))),
            Some(true)
        );
        assert_eq!(
            Value::Float(OrderedFloat(f64::NAN)).compare(CmpOp::Neq, &Value::Int(0)),
            Some(true)
        );
    }

    #[test]
    fn compare_non_numeric() {
        assert_eq!(
            Value::Type(Type::U8).compare(CmpOp::Eq, &Value::Type(Type::U8)),
            Some(true)
        );
        assert_eq!(Value::Null.compare(CmpOp::Neq, &Value::Int(1)), Some(true));
        assert_eq!(Value::Bool(true).compare(CmpOp::Lt, &Value::Bool(false)), None);
    }

    #[test]
    fn fraction_detection() {
        assert!(Value::Float(OrderedFloat(1.5)).float_has_fraction());
        assert!(!Value::Float(OrderedFloat(2.0)).float_has_fraction());
        assert!(!Value::Int(3).float_has_fraction());
    }
}
