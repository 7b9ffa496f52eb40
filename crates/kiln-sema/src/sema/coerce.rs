//! Implicit type coercion.

use std::fmt;
use std::sync::Arc;

use kiln_core::{InnerResult, PointerType, PtrSize, Span, Type, Value};
use ordered_float::OrderedFloat;

use super::Sema;
use crate::backend::Backend;
use crate::builder::Block;
use crate::ir::{InstRef, UnOp};

/// Pointer types with identical layout where only constness is added.
fn ptr_in_memory_coercible(dest: &PointerType, src: &PointerType) -> bool {
    dest.size == src.size
        && dest.child == src.child
        && (dest.is_const || !src.is_const)
        && dest.sentinel.is_none_or(|s| src.sentinel == Some(s))
}

fn in_memory_coercible(dest: &Type, src: &Type) -> bool {
    match (dest, src) {
        (Type::Pointer(d), Type::Pointer(s)) => ptr_in_memory_coercible(d, s),
        (Type::Optional(d), Type::Optional(s)) => match (d.as_ref(), s.as_ref()) {
            (Type::Pointer(d), Type::Pointer(s)) => ptr_in_memory_coercible(d, s),
            _ => false,
        },
        _ => false,
    }
}

/// `*[N]T` to `[]T`, `[*]T` or `[*c]T` with compatible constness.
///
/// A sentinel-terminated destination needs the array to carry the same
/// sentinel.
fn array_ptr_target(dest: &Type, src: &Type) -> Option<(PtrSize, u64)> {
    let (Type::Pointer(d), Type::Pointer(s)) = (dest, src) else {
        return None;
    };
    if s.size != PtrSize::One || d.size == PtrSize::One {
        return None;
    }
    let Type::Array(array) = &s.child else {
        return None;
    };
    let compatible = array.child == d.child
        && (d.is_const || !s.is_const)
        && d.sentinel.is_none_or(|s| array.sentinel == Some(s));
    compatible.then_some((d.size, array.len))
}

fn fractional_msg(f: f64, dest: &Type) -> String {
    format!("fractional component prevents float value '{f}' from being casted to type '{dest}'")
}

fn unrepresentable_msg(dest: &Type, val: impl fmt::Display) -> String {
    format!("type '{dest}' cannot represent integer value '{val}'")
}

fn float_max(bits: u16) -> f64 {
    match bits {
        16 => 65504.0,
        32 => f64::from(f32::MAX),
        _ => f64::MAX,
    }
}

impl<B: Backend> Sema<'_, B> {
    /// Convert `inst` to `dest`, or fail with a type mismatch.
    pub(crate) fn coerce(
        &mut self,
        block: &mut Block<'_>,
        dest: &Type,
        inst: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        let src = block.arena.ty(inst).clone();
        if src == *dest {
            return Ok(inst);
        }
        if in_memory_coercible(dest, &src) {
            return self.retype(block, dest, inst, span);
        }
        if src == Type::Undefined {
            return block.add_constant(dest.clone(), Value::Undefined, span);
        }

        if let Type::Optional(child) = dest {
            if src == Type::Null {
                return block.add_constant(dest.clone(), Value::Null, span);
            }
            let wraps = src == **child
                || (src.is_numeric() && child.is_numeric())
                || in_memory_coercible(child, &src)
                || array_ptr_target(child, &src).is_some();
            if wraps {
                let payload = self.coerce(block, child, inst, span)?;
                if let Some(val) = block.arena.value(payload).cloned() {
                    return block.add_constant(dest.clone(), val, span);
                }
                self.require_runtime(block, span)?;
                return block.add_un_op(UnOp::WrapOptional, dest.clone(), payload, span);
            }
        }

        if let Some((size, len)) = array_ptr_target(dest, &src) {
            if let Some(val) = block.arena.value(inst).cloned() {
                let val = match size {
                    PtrSize::Slice => Value::Slice {
                        ptr: Arc::new(val),
                        len,
                    },
                    _ => val,
                };
                return block.add_constant(dest.clone(), val, span);
            }
            self.require_runtime(block, span)?;
            let op = match size {
                PtrSize::Slice => UnOp::ArrayToSlice,
                PtrSize::Many => UnOp::ArrayToMany,
                _ => UnOp::ArrayToC,
            };
            return block.add_un_op(op, dest.clone(), inst, span);
        }

        let comptime_src = matches!(src, Type::ComptimeInt | Type::ComptimeFloat);
        let numeric_applies = (comptime_src && dest.is_numeric())
            || (src.is_int() && dest.is_int())
            || (src.is_float() && dest.is_float());
        if numeric_applies && let Some(val) = block.arena.value(inst).cloned() {
            let val = self.coerce_numeric_value(dest, val, span)?;
            return block.add_constant(dest.clone(), val, span);
        }

        match (dest, &src) {
            (Type::Int(d), Type::Int(s))
                if (d.signedness == s.signedness && d.bits >= s.bits)
                    || (d.is_signed() && !s.is_signed() && d.bits > s.bits) =>
            {
                self.require_runtime(block, span)?;
                block.add_un_op(UnOp::IntCast, dest.clone(), inst, span)
            }
            (Type::Float(d), Type::Float(s)) if d >= s => {
                self.require_runtime(block, span)?;
                block.add_un_op(UnOp::FloatCast, dest.clone(), inst, span)
            }
            _ => Err(self.fail(span, format!("expected '{}', found '{}'", dest, src))),
        }
    }

    fn retype(
        &mut self,
        block: &mut Block<'_>,
        dest: &Type,
        inst: InstRef,
        span: Span,
    ) -> InnerResult<InstRef> {
        if let Some(val) = block.arena.value(inst).cloned() {
            return block.add_constant(dest.clone(), val, span);
        }
        self.require_runtime(block, span)?;
        block.add_un_op(UnOp::Bitcast, dest.clone(), inst, span)
    }

    fn coerce_numeric_value(&mut self, dest: &Type, val: Value, span: Span) -> InnerResult<Value> {
        if val.is_undef() {
            return Ok(val);
        }
        match dest {
            Type::Int(info) => {
                let int = match &val {
                    Value::Int(v) => *v,
                    Value::Float(f) if val.float_has_fraction() => {
                        return Err(self.fail(span, fractional_msg(f.0, dest)));
                    }
                    Value::Float(f) if f.0.is_finite() && f.0.abs() < i128::MAX as f64 => {
                        f.0 as i128
                    }
                    _ => return Err(self.fail(span, unrepresentable_msg(dest, &val))),
                };
                if !info.fits(int) {
                    return Err(self.fail(span, unrepresentable_msg(dest, int)));
                }
                Ok(Value::Int(int))
            }
            Type::ComptimeInt => match &val {
                Value::Float(f) if val.float_has_fraction() => {
                    Err(self.fail(span, fractional_msg(f.0, dest)))
                }
                Value::Float(f) => Ok(Value::Int(f.0 as i128)),
                _ => Ok(val),
            },
            Type::Float(bits) => {
                let Some(f) = val.as_float() else {
                    return Err(self.fail(span, "unable to evaluate constant expression"));
                };
                if f.is_finite() && f.abs() > float_max(*bits) {
                    return Err(self.fail(
                        span,
                        format!("cast of value '{}' to type '{}' loses information", val, dest),
                    ));
                }
                Ok(Value::Float(OrderedFloat(f)))
            }
            Type::ComptimeFloat => match val.as_float() {
                Some(f) => Ok(Value::Float(OrderedFloat(f))),
                None => Ok(val),
            },
            _ => Ok(val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{only_error, with_sema};
    use super::*;
    use crate::ir::InstKind;
    use kiln_core::ArrayType;
    use pretty_assertions::assert_eq;

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn comptime_int_must_fit() {
        let (_, module) = with_sema(|sema, block| {
            let c = block
                .add_constant(Type::ComptimeInt, Value::Int(300), span())
                .unwrap();
            sema.coerce(block, &Type::U8, c, span())
        });
        assert_eq!(only_error(&module), "type 'u8' cannot represent integer value '300'");
    }

    #[test]
    fn fractional_float_to_int() {
        let (_, module) = with_sema(|sema, block| {
            let c = block
                .add_constant(Type::ComptimeFloat, Value::Float(OrderedFloat(1.5)), span())
                .unwrap();
            sema.coerce(block, &Type::I32, c, span())
        });
        assert_eq!(
            only_error(&module),
            "fractional component prevents float value '1.5' from being casted to type 'i32'"
        );
    }

    #[test]
    fn float_range_is_checked() {
        let (_, module) = with_sema(|sema, block| {
            let c = block
                .add_constant(Type::ComptimeInt, Value::Int(100_000), span())
                .unwrap();
            sema.coerce(block, &Type::F16, c, span())
        });
        assert_eq!(only_error(&module), "cast of value '100000' to type 'f16' loses information");
    }

    #[test]
    fn runtime_int_widening() {
        let (kind, module) = with_sema(|sema, block| {
            let a = block.add_arg(0, Type::U8, span()).unwrap();
            let widened = sema.coerce(block, &Type::I16, a, span()).unwrap();
            let narrowed = sema.coerce(block, &Type::I8, a, span());
            assert!(narrowed.is_err());
            block.arena.get(widened).kind.clone()
        });
        assert!(matches!(kind, InstKind::UnOp { op: UnOp::IntCast, .. }));
        assert_eq!(only_error(&module), "expected 'i8', found 'u8'");
    }

    #[test]
    fn optional_wrapping() {
        let ((null, wrapped), _) = with_sema(|sema, block| {
            let null = block.add_constant(Type::Null, Value::Null, span()).unwrap();
            let null = sema
                .coerce(block, &Type::optional(Type::U8), null, span())
                .unwrap();
            let a = block.add_arg(0, Type::U8, span()).unwrap();
            let wrapped = sema
                .coerce(block, &Type::optional(Type::U8), a, span())
                .unwrap();
            (block.arena.value(null).cloned(), block.arena.get(wrapped).kind.clone())
        });
        assert_eq!(null, Some(Value::Null));
        assert!(matches!(wrapped, InstKind::UnOp { op: UnOp::WrapOptional, .. }));
    }

    #[test]
    fn array_pointer_to_slice() {
        let (kind, _) = with_sema(|sema, block| {
            let arr_ptr = Type::single_ptr(Type::array(3, Type::U8), true);
            let a = block.add_arg(0, arr_ptr, span()).unwrap();
            let slice = sema
                .coerce(block, &Type::slice(Type::U8, true), a, span())
                .unwrap();
            block.arena.get(slice).kind.clone()
        });
        assert!(matches!(kind, InstKind::UnOp { op: UnOp::ArrayToSlice, .. }));
    }

    #[test]
    fn comptime_int_fits_fixed_width() {
        let ((ty, val, emitted), module) = with_sema(|sema, block| {
            let c = block
                .add_constant(Type::ComptimeInt, Value::Int(100), span())
                .unwrap();
            let byte = sema.coerce(block, &Type::U8, c, span()).unwrap();
            (block.arena.ty(byte).clone(), block.arena.value(byte).cloned(), block.insts.len())
        });
        assert_eq!(ty, Type::U8);
        assert_eq!(val, Some(Value::Int(100)));
        assert_eq!(emitted, 0);
        assert!(module.all_errors().is_empty());
    }

    #[test]
    fn comptime_array_pointer_to_slice_folds() {
        let ((owner, val, emitted), _) = with_sema(|sema, block| {
            let arr_ptr = Type::single_ptr(Type::array(4, Type::U8), false);
            let c = block
                .add_constant(arr_ptr, Value::DeclRef(sema.owner), span())
                .unwrap();
            let slice = sema
                .coerce(block, &Type::slice(Type::U8, false), c, span())
                .unwrap();
            (sema.owner, block.arena.value(slice).cloned(), block.insts.len())
        });
        assert_eq!(
            val,
            Some(Value::Slice {
                ptr: Arc::new(Value::DeclRef(owner)),
                len: 4,
            })
        );
        assert_eq!(emitted, 0);
    }

    fn zero_terminated_slice() -> Type {
        Type::Pointer(Arc::new(PointerType {
            size: PtrSize::Slice,
            child: Type::U8,
            is_const: true,
            sentinel: Some(0),
        }))
    }

    #[test]
    fn sentinel_slice_needs_sentinel_array() {
        let (accepted, module) = with_sema(|sema, block| {
            let plain = Type::single_ptr(Type::array(4, Type::U8), false);
            let a = block.add_arg(0, plain, span()).unwrap();
            let dest = zero_terminated_slice();
            sema.coerce(block, &dest, a, span()).is_ok()
        });
        assert!(!accepted);
        assert_eq!(only_error(&module), "expected '[:0]const u8', found '*[4]u8'");
    }

    #[test]
    fn sentinel_array_to_sentinel_slice() {
        let (kind, module) = with_sema(|sema, block| {
            let terminated = Type::Array(Arc::new(ArrayType {
                len: 4,
                child: Type::U8,
                sentinel: Some(0),
            }));
            let a = block
                .add_arg(0, Type::single_ptr(terminated, false), span())
                .unwrap();
            let slice = sema
                .coerce(block, &zero_terminated_slice(), a, span())
                .unwrap();
            block.arena.get(slice).kind.clone()
        });
        assert!(matches!(kind, InstKind::UnOp { op: UnOp::ArrayToSlice, .. }));
        assert!(module.all_errors().is_empty());
    }

    #[test]
    fn adding_const_is_a_bitcast() {
        let (kind, _) = with_sema(|sema, block| {
            let a = block
                .add_arg(0, Type::single_ptr(Type::U32, false), span())
                .unwrap();
            let c = sema
                .coerce(block, &Type::single_ptr(Type::U32, true), a, span())
                .unwrap();
            block.arena.get(c).kind.clone()
        });
        assert!(matches!(kind, InstKind::UnOp { op: UnOp::Bitcast, .. }));
    }
}
