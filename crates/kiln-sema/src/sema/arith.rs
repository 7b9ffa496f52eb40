//! Arithmetic, negation and boolean operators.

use std::cmp::Ordering;

use kiln_core::{ArithOp, InnerResult, Span, Type, Value};
use ordered_float::OrderedFloat;

use super::Sema;
use crate::backend::Backend;
use crate::builder::Block;
use crate::ir::{BinOp, InstRef, UnOp};

fn is_arith_operand(ty: &Type) -> bool {
    match ty {
        Type::Vector(v) => v.child.is_numeric(),
        Type::Undefined => true,
        other => other.is_numeric(),
    }
}

/// Types a `comptime_int` peer resolves to.
fn numeric_peer(ty: &Type) -> bool {
    matches!(ty, Type::Int(_) | Type::Float(_) | Type::ComptimeFloat)
}

impl<B: Backend> Sema<'_, B> {
    /// The type both operands of a binary operator convert to.
    pub(crate) fn resolve_peer_types(
        &mut self,
        lhs: &Type,
        rhs: &Type,
        span: Span,
    ) -> InnerResult<Type> {
        if lhs == rhs {
            return Ok(lhs.clone());
        }
        let peer = match (lhs, rhs) {
            (Type::Undefined, other) | (other, Type::Undefined) => Some(other.clone()),
            (Type::ComptimeInt, other) | (other, Type::ComptimeInt) if numeric_peer(other) => {
                Some(other.clone())
            }
            (Type::ComptimeFloat, other) | (other, Type::ComptimeFloat) if other.is_float() => {
                Some(other.clone())
            }
            (Type::Int(a), Type::Int(b)) if a.signedness == b.signedness => {
                let wider = if a.bits >= b.bits { lhs } else { rhs };
                Some(wider.clone())
            }
            (Type::Int(a), Type::Int(b)) => {
                // Mixed signedness only unifies when the signed side is wider.
                let (signed, unsigned, signed_ty) = if a.is_signed() {
                    (a, b, lhs)
                } else {
                    (b, a, rhs)
                };
                (signed.bits > unsigned.bits).then(|| signed_ty.clone())
            }
            (Type::Float(a), Type::Float(b)) => {
                let wider = if a >= b { lhs } else { rhs };
                Some(wider.clone())
            }
            _ => None,
        };
        match peer {
            Some(ty) => Ok(ty),
            None => Err(self.fail(span, format!("incompatible types: '{}' and '{}'", lhs, rhs))),
        }
    }

    pub(super) fn analyze_arith(
        &mut self,
        block: &mut Block<'_>,
        op: ArithOp,
        lhs: InstRef,
        rhs: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let lhs_ty = block.arena.ty(lhs).clone();
        let rhs_ty = block.arena.ty(rhs).clone();
        if !is_arith_operand(&lhs_ty) || !is_arith_operand(&rhs_ty) {
            return Err(self.fail(
                span,
                format!("invalid operands to binary expression: '{}' and '{}'", lhs_ty, rhs_ty),
            ));
        }
        let ty = self.resolve_peer_types(&lhs_ty, &rhs_ty, span)?;
        let lhs = self.coerce(block, &ty, lhs, span)?;
        let rhs = self.coerce(block, &ty, rhs, span)?;

        let lhs_val = block.arena.value(lhs).cloned();
        let rhs_val = block.arena.value(rhs).cloned();
        if matches!(op, ArithOp::Div | ArithOp::Rem)
            && rhs_val.as_ref().and_then(Value::order_against_zero) == Some(Ordering::Equal)
        {
            return Err(self.fail(span, "division by zero"));
        }
        if let (Some(lhs_val), Some(rhs_val)) = (&lhs_val, &rhs_val) {
            let val = self.fold_arith(op, &ty, lhs_val, rhs_val, span)?;
            return block.add_constant(ty, val, span);
        }
        self.require_runtime(block, span)?;
        block.add_bin_op(BinOp::from_arith(op), ty, lhs, rhs, span)
    }

    fn fold_arith(
        &mut self,
        op: ArithOp,
        ty: &Type,
        lhs: &Value,
        rhs: &Value,
        span: Span,
    ) -> InnerResult<Value> {
        if lhs.is_undef() || rhs.is_undef() {
            return Err(self.fail(span, "use of undefined value"));
        }
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            let result = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => a.checked_div(*b),
                ArithOp::Rem => a.checked_rem(*b),
            };
            return match result {
                Some(v) if ty.int_info().is_none_or(|info| info.fits(v)) => Ok(Value::Int(v)),
                _ => Err(self.fail(span, format!("overflow of integer type '{}'", ty))),
            };
        }
        match (lhs.as_float(), rhs.as_float()) {
            (Some(a), Some(b)) => {
                let result = match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Rem => a % b,
                };
                Ok(Value::Float(OrderedFloat(result)))
            }
            _ => Err(self.fail(span, "unable to evaluate constant expression")),
        }
    }

    pub(super) fn analyze_negate(
        &mut self,
        block: &mut Block<'_>,
        operand: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let ty = block.arena.ty(operand).clone();
        if !is_arith_operand(&ty) || ty == Type::Undefined {
            return Err(self.fail(span, format!("negation of type '{}'", ty)));
        }
        if let Some(val) = block.arena.value(operand).cloned() {
            let negated = match val {
                Value::Int(v) => match v.checked_neg() {
                    Some(n) if ty.int_info().is_none_or(|info| info.fits(n)) => Value::Int(n),
                    _ => return Err(self.fail(span, format!("overflow of integer type '{}'", ty))),
                },
                Value::Float(v) => Value::Float(-v),
                Value::Undefined => return Err(self.fail(span, "use of undefined value")),
                _ => return Err(self.fail(span, "unable to evaluate constant expression")),
            };
            return block.add_constant(ty, negated, span);
        }
        self.require_runtime(block, span)?;
        if ty.int_info().is_some_and(|info| !info.is_signed()) {
            return Err(self.fail(span, format!("negation of type '{}'", ty)));
        }
        block.add_un_op(UnOp::Negate, ty, operand, span)
    }

    pub(super) fn analyze_not(
        &mut self,
        block: &mut Block<'_>,
        operand: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let operand = self.coerce(block, &Type::Bool, operand, span)?;
        if let Some(val) = block.arena.value(operand).cloned() {
            let Some(b) = val.as_bool() else {
                return Err(self.fail(span, "use of undefined value"));
            };
            return block.add_constant(Type::Bool, Value::Bool(!b), span);
        }
        self.require_runtime(block, span)?;
        block.add_un_op(UnOp::Not, Type::Bool, operand, span)
    }

    pub(super) fn analyze_bool_op(
        &mut self,
        block: &mut Block<'_>,
        is_and: bool,
        lhs: InstRef,
        rhs: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let lhs = self.coerce(block, &Type::Bool, lhs, span)?;
        let rhs = self.coerce(block, &Type::Bool, rhs, span)?;
        let lhs_val = block.arena.value(lhs).and_then(Value::as_bool);
        let rhs_val = block.arena.value(rhs).and_then(Value::as_bool);
        let folded = match (lhs_val, rhs_val) {
            (Some(a), Some(b)) => Some(if is_and { a && b } else { a || b }),
            // `false and x`, `true or x`
            (Some(a), None) if a != is_and => Some(a),
            _ => None,
        };
        if let Some(result) = folded {
            return block.add_constant(Type::Bool, Value::Bool(result), span);
        }
        self.require_runtime(block, span)?;
        let op = if is_and { BinOp::BoolAnd } else { BinOp::BoolOr };
        block.add_bin_op(op, Type::Bool, lhs, rhs, span)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{only_error, with_sema};
    use super::*;
    use kiln_core::Span;
    use pretty_assertions::assert_eq;

    fn int(block: &mut Block<'_>, v: i128) -> InstRef {
        block
            .add_constant(Type::ComptimeInt, Value::Int(v), Span::default())
            .unwrap()
    }

    #[test]
    fn peer_types() {
        let (results, _) = with_sema(|sema, _| {
            let span = Span::default();
            vec![
                sema.resolve_peer_types(&Type::ComptimeInt, &Type::U8, span)
                    .unwrap(),
                sema.resolve_peer_types(&Type::U16, &Type::U8, span)
                    .unwrap(),
                sema.resolve_peer_types(&Type::U8, &Type::I16, span)
                    .unwrap(),
                sema.resolve_peer_types(&Type::F32, &Type::ComptimeFloat, span)
                    .unwrap(),
                sema.resolve_peer_types(&Type::F64, &Type::F32, span)
                    .unwrap(),
            ]
        });
        assert_eq!(results, vec![Type::U8, Type::U16, Type::I16, Type::F32, Type::F64]);

        let (err, module) = with_sema(|sema, _| {
            sema.resolve_peer_types(&Type::U16, &Type::I16, Span::default())
        });
        assert!(err.is_err());
        assert_eq!(only_error(&module), "incompatible types: 'u16' and 'i16'");
    }

    #[test]
    fn comptime_arith_folds() {
        let (val, _) = with_sema(|sema, block| {
            let (a, b) = (int(block, 40), int(block, 2));
            let sum = sema
                .analyze_arith(block, ArithOp::Add, a, b, Span::default())
                .unwrap();
            assert!(block.insts.is_empty());
            block.arena.value(sum).cloned()
        });
        assert_eq!(val, Some(Value::Int(42)));
    }

    #[test]
    fn fixed_width_overflow() {
        let (_, module) = with_sema(|sema, block| {
            let a = block
                .add_constant(Type::U8, Value::Int(200), Span::default())
                .unwrap();
            let b = int(block, 100);
            sema.analyze_arith(block, ArithOp::Add, a, b, Span::default())
        });
        assert_eq!(only_error(&module), "overflow of integer type 'u8'");
    }

    #[test]
    fn division_by_zero() {
        let (_, module) = with_sema(|sema, block| {
            let a = block.add_arg(0, Type::U32, Span::default()).unwrap();
            let zero = int(block, 0);
            sema.analyze_arith(block, ArithOp::Div, a, zero, Span::default())
        });
        assert_eq!(only_error(&module), "division by zero");
    }

    #[test]
    fn runtime_operands_emit_instructions() {
        let (kinds, _) = with_sema(|sema, block| {
            let a = block.add_arg(0, Type::I32, Span::default()).unwrap();
            let one = int(block, 1);
            let sum = sema
                .analyze_arith(block, ArithOp::Sub, a, one, Span::default())
                .unwrap();
            let neg = sema.analyze_negate(block, sum, Span::default()).unwrap();
            (block.insts.len(), block.arena.ty(neg).clone())
        });
        assert_eq!(kinds, (3, Type::I32));
    }

    #[test]
    fn unsigned_runtime_negation_fails() {
        let (_, module) = with_sema(|sema, block| {
            let a = block.add_arg(0, Type::U8, Span::default()).unwrap();
            sema.analyze_negate(block, a, Span::default())
        });
        assert_eq!(only_error(&module), "negation of type 'u8'");
    }

    #[test]
    fn bool_ops_short_circuit_when_known() {
        let (folded, _) = with_sema(|sema, block| {
            let f = block
                .add_constant(Type::Bool, Value::Bool(false), Span::default())
                .unwrap();
            let x = block.add_arg(0, Type::Bool, Span::default()).unwrap();
            let and = sema
                .analyze_bool_op(block, true, f, x, Span::default())
                .unwrap();
            let or = sema
                .analyze_bool_op(block, false, f, x, Span::default())
                .unwrap();
            (block.arena.value(and).cloned(), block.arena.value(or).is_none())
        });
        assert_eq!(folded, (Some(Value::Bool(false)), true));
    }
}
