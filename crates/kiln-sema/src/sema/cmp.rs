//! Comparison operators.
//!
//! Mixed-width and mixed-signedness integer comparisons are widened to an
//! integer type that can hold every value of both operands, so `i32 < u32`
//! compares as `i33`. A compile-time known operand contributes only the bits
//! its value actually needs.

use std::cmp::Ordering;
use std::sync::Arc;

use kiln_core::{
    CmpOp, InnerResult, MAX_INT_BITS, PtrSize, Signedness, Span, Type, Value,
    int_bit_count_twos_comp,
};

use super::Sema;
use crate::backend::Backend;
use crate::builder::Block;
use crate::ir::{BinOp, InstRef, UnOp};

fn is_numeric_or_vector(ty: &Type) -> bool {
    ty.is_numeric() || ty.is_vector()
}

/// `x < 2.5` is `x <= 2`; `2.5 < x` is `2 < x`.
fn floor_adjusted(op: CmpOp, fractional_on_rhs: bool) -> CmpOp {
    match (op, fractional_on_rhs) {
        (CmpOp::Lt | CmpOp::Lte, true) => CmpOp::Lte,
        (CmpOp::Gt | CmpOp::Gte, true) => CmpOp::Gt,
        (CmpOp::Lt | CmpOp::Lte, false) => CmpOp::Lt,
        (CmpOp::Gt | CmpOp::Gte, false) => CmpOp::Gte,
        (other, _) => other,
    }
}

/// Bits and signedness an integer operand needs.
fn operand_bits(block: &Block<'_>, inst: InstRef) -> (u32, bool) {
    if let Some(v) = block.arena.value(inst).and_then(Value::as_int) {
        return (int_bit_count_twos_comp(v), v < 0);
    }
    match block.arena.ty(inst).int_info() {
        Some(info) => (u32::from(info.bits), info.is_signed()),
        None => (0, false),
    }
}

impl<B: Backend> Sema<'_, B> {
    pub(super) fn analyze_cmp(
        &mut self,
        block: &mut Block<'_>,
        op: CmpOp,
        lhs: InstRef,
        rhs: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let lhs_ty = block.arena.ty(lhs).clone();
        let rhs_ty = block.arena.ty(rhs).clone();
        if is_numeric_or_vector(&lhs_ty) && is_numeric_or_vector(&rhs_ty) {
            return self.cmp_numeric(block, op, lhs, rhs, span);
        }

        let null_check = match (&lhs_ty, &rhs_ty) {
            (Type::Null, Type::Optional(_)) => Some(rhs),
            (Type::Optional(_), Type::Null) => Some(lhs),
            _ => None,
        };
        if let Some(operand) = null_check {
            if !op.is_equality() {
                let ty = block.arena.ty(operand).clone();
                return Err(self.fail(
                    span,
                    format!("operator {} not allowed for type '{}'", op, ty),
                ));
            }
            if let Some(val) = block.arena.value(operand) {
                let is_null = *val == Value::Null;
                let result = Value::Bool(is_null == (op == CmpOp::Eq));
                return block.add_constant(Type::Bool, result, span);
            }
            self.require_runtime(block, span)?;
            let un_op = if op == CmpOp::Eq { UnOp::IsNull } else { UnOp::IsNonNull };
            return block.add_un_op(un_op, Type::Bool, operand, span);
        }

        if lhs_ty != rhs_ty {
            return Err(self.fail(
                span,
                format!("incompatible types: '{}' and '{}'", lhs_ty, rhs_ty),
            ));
        }
        if let (Some(a), Some(b)) = (block.arena.value(lhs), block.arena.value(rhs)) {
            let result = a.compare(op, b);
            return match result {
                Some(result) => block.add_constant(Type::Bool, Value::Bool(result), span),
                None => Err(self.fail(
                    span,
                    format!("operator {} not allowed for type '{}'", op, lhs_ty),
                )),
            };
        }
        let runtime_comparable = match &lhs_ty {
            Type::Bool | Type::Pointer(_) => true,
            Type::Optional(child) => {
                let ptr = child.pointer_info();
                ptr.is_some_and(|p| p.size != PtrSize::Slice)
            }
            _ => false,
        };
        if !op.is_equality() || !runtime_comparable {
            return Err(self.fail(
                span,
                format!("operator {} not allowed for type '{}'", op, lhs_ty),
            ));
        }
        self.require_runtime(block, span)?;
        block.add_bin_op(BinOp::Cmp(op), Type::Bool, lhs, rhs, span)
    }

    /// Compare two numeric operands, or two vectors element-wise.
    pub(crate) fn cmp_numeric(
        &mut self,
        block: &mut Block<'_>,
        op: CmpOp,
        lhs: InstRef,
        rhs: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let lhs_ty = block.arena.ty(lhs).clone();
        let rhs_ty = block.arena.ty(rhs).clone();
        match (&lhs_ty, &rhs_ty) {
            (Type::Vector(a), Type::Vector(b)) => {
                return self.cmp_vector(block, op, lhs, rhs, (a.len, b.len), span);
            }
            (Type::Vector(_), _) | (_, Type::Vector(_)) => {
                return Err(self.fail(
                    span,
                    format!(
                        "mixed scalar and vector operands to comparison operator: '{}' and '{}'",
                        lhs_ty, rhs_ty
                    ),
                ));
            }
            _ => {}
        }

        let lhs_val = block.arena.value(lhs).cloned();
        let rhs_val = block.arena.value(rhs).cloned();
        if let (Some(a), Some(b)) = (&lhs_val, &rhs_val) {
            if a.is_undef() || b.is_undef() {
                return block.add_constant(Type::Bool, Value::Undefined, span);
            }
            return match a.compare(op, b) {
                Some(result) => block.add_constant(Type::Bool, Value::Bool(result), span),
                None => Err(self.fail(
                    span,
                    format!("operator {} not allowed for type '{}'", op, lhs_ty),
                )),
            };
        }

        if lhs_ty.is_float() || rhs_ty.is_float() {
            let bits = lhs_ty.float_bits().max(rhs_ty.float_bits()).unwrap_or(64);
            let dest = Type::Float(bits);
            let lhs = self.coerce(block, &dest, lhs, span)?;
            let rhs = self.coerce(block, &dest, rhs, span)?;
            self.require_runtime(block, span)?;
            return block.add_bin_op(BinOp::Cmp(op), Type::Bool, lhs, rhs, span);
        }

        // One side is a runtime integer. A fractional constant on the other
        // side decides equality outright and floors for ordering. NaN and
        // infinities decide every comparison.
        let (mut lhs, mut rhs, mut op) = (lhs, rhs, op);
        for (val, on_rhs) in [(&lhs_val, false), (&rhs_val, true)] {
            let Some(Value::Float(f)) = val else { continue };
            if !f.0.is_finite() {
                let result = if f.0.is_nan() {
                    op == CmpOp::Neq
                } else {
                    let int_vs_const = if f.0 > 0.0 { Ordering::Less } else { Ordering::Greater };
                    op.holds(if on_rhs { int_vs_const } else { int_vs_const.reverse() })
                };
                return block.add_constant(Type::Bool, Value::Bool(result), span);
            }
            if val.as_ref().is_some_and(Value::float_has_fraction) {
                if op.is_equality() {
                    return block.add_constant(Type::Bool, Value::Bool(op == CmpOp::Neq), span);
                }
                op = floor_adjusted(op, on_rhs);
            }
            let floored = Value::Int(f.0.floor() as i128);
            let inst = block.add_constant(Type::ComptimeInt, floored, span)?;
            if on_rhs {
                rhs = inst;
            } else {
                lhs = inst;
            }
        }

        let (lhs_bits, lhs_signed) = operand_bits(block, lhs);
        let (rhs_bits, rhs_signed) = operand_bits(block, rhs);
        let dest_signed = lhs_signed || rhs_signed;
        let widen = |bits: u32, signed: bool| if dest_signed && !signed { bits + 1 } else { bits };
        let dest_bits = widen(lhs_bits, lhs_signed)
            .max(widen(rhs_bits, rhs_signed))
            .max(1);
        if dest_bits > u32::from(MAX_INT_BITS) {
            return Err(self.fail(span, format!("{} exceeds maximum integer bit count", dest_bits)));
        }
        let dest_bits = dest_bits as u16;

        let signedness = if dest_signed { Signedness::Signed } else { Signedness::Unsigned };
        let dest = Type::int(signedness, dest_bits);
        let lhs = self.coerce(block, &dest, lhs, span)?;
        let rhs = self.coerce(block, &dest, rhs, span)?;
        self.require_runtime(block, span)?;
        block.add_bin_op(BinOp::Cmp(op), Type::Bool, lhs, rhs, span)
    }

    fn cmp_vector(
        &mut self,
        block: &mut Block<'_>,
        op: CmpOp,
        lhs: InstRef,
        rhs: InstRef,
        (lhs_len, rhs_len): (u32, u32),
        span: Span,
    ) -> InnerResult<InstRef> {
        if lhs_len != rhs_len {
            return Err(self.fail(
                span,
                format!("vector length mismatch: {} and {}", lhs_len, rhs_len),
            ));
        }
        let lhs_ty = block.arena.ty(lhs).clone();
        let rhs_ty = block.arena.ty(rhs).clone();
        if lhs_ty != rhs_ty {
            return Err(self.fail(
                span,
                format!("incompatible types: '{}' and '{}'", lhs_ty, rhs_ty),
            ));
        }
        let result_ty = Type::vector(lhs_len, Type::Bool);
        let operands = (block.arena.value(lhs), block.arena.value(rhs));
        if let (Some(Value::Array(a)), Some(Value::Array(b))) = operands {
            let folded: Option<Vec<Value>> = a
                .iter()
                .zip(b.iter())
                .map(|(a, b)| a.compare(op, b).map(Value::Bool))
                .collect();
            if let Some(elems) = folded {
                return block.add_constant(result_ty, Value::Array(Arc::from(elems)), span);
            }
        }
        self.require_runtime(block, span)?;
        block.add_bin_op(BinOp::Cmp(op), result_ty, lhs, rhs, span)
    }
}
