//! Compile-time type representation.
//!
//! Types are tag-dispatched values. Primitive types are plain enum variants,
//! so comparing two of them is a tag check. Composite types share their
//! payload through [`Arc`]: cloning a `Type` never deep-copies, and equality
//! tries pointer identity before falling back to a structural comparison.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Largest integer bit width a type may have.
pub const MAX_INT_BITS: u16 = 65535;

// ============================================================================
// Payloads
// ============================================================================

/// Integer signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// Width and signedness of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntInfo {
    pub signedness: Signedness,
    pub bits: u16,
}

impl IntInfo {
    pub const fn signed(bits: u16) -> Self {
        Self {
            signedness: Signedness::Signed,
            bits,
        }
    }

    pub const fn unsigned(bits: u16) -> Self {
        Self {
            signedness: Signedness::Unsigned,
            bits,
        }
    }

    #[inline]
    pub fn is_signed(&self) -> bool {
        self.signedness == Signedness::Signed
    }

    /// Whether `value` is representable in this integer type.
    pub fn fits(&self, value: i128) -> bool {
        match self.signedness {
            Signedness::Unsigned => {
                if value < 0 {
                    return false;
                }
                // Any non-negative i128 fits in 127 or more unsigned bits.
                self.bits >= 127 || (value as u128) >> self.bits == 0
            }
            Signedness::Signed => {
                if self.bits == 0 {
                    return value == 0;
                }
                if self.bits >= 128 {
                    return true;
                }
                let min = -(1i128 << (self.bits - 1));
                let max = (1i128 << (self.bits - 1)) - 1;
                value >= min && value <= max
            }
        }
    }
}

/// Pointer flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrSize {
    /// `*T`
    One,
    /// `[*]T`
    Many,
    /// `[]T`
    Slice,
    /// `[*c]T`
    C,
}

/// Payload of pointer and slice types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerType {
    pub size: PtrSize,
    pub child: Type,
    pub is_const: bool,
    /// Integer sentinel terminating the pointee, if any.
    pub sentinel: Option<i128>,
}

/// Payload of fixed-size array types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub len: u64,
    pub child: Type,
    pub sentinel: Option<i128>,
}

/// Payload of SIMD vector types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VectorType {
    pub len: u32,
    pub child: Type,
}

/// Function calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    #[default]
    Unspecified,
    C,
    Inline,
}

/// Payload of function types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnType {
    pub params: Vec<Type>,
    pub ret: Type,
    pub cc: CallingConvention,
}

// ============================================================================
// Type
// ============================================================================

/// A compile-time type.
#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Bool,
    NoReturn,
    /// The type of types.
    Type,
    ComptimeInt,
    ComptimeFloat,
    /// Type of the `undefined` literal.
    Undefined,
    /// Type of the `null` literal.
    Null,
    Int(IntInfo),
    /// Float with the given bit width (16, 32, 64 or 128).
    Float(u16),
    Pointer(Arc<PointerType>),
    Array(Arc<ArrayType>),
    Optional(Arc<Type>),
    Vector(Arc<VectorType>),
    Fn(Arc<FnType>),
}

impl Type {
    pub const U1: Type = Type::Int(IntInfo::unsigned(1));
    pub const U8: Type = Type::Int(IntInfo::unsigned(8));
    pub const U16: Type = Type::Int(IntInfo::unsigned(16));
    pub const U32: Type = Type::Int(IntInfo::unsigned(32));
    pub const U64: Type = Type::Int(IntInfo::unsigned(64));
    pub const I8: Type = Type::Int(IntInfo::signed(8));
    pub const I16: Type = Type::Int(IntInfo::signed(16));
    pub const I32: Type = Type::Int(IntInfo::signed(32));
    pub const I64: Type = Type::Int(IntInfo::signed(64));
    pub const USIZE: Type = Type::Int(IntInfo::unsigned(64));
    pub const ISIZE: Type = Type::Int(IntInfo::signed(64));
    pub const F16: Type = Type::Float(16);
    pub const F32: Type = Type::Float(32);
    pub const F64: Type = Type::Float(64);
    pub const F128: Type = Type::Float(128);

    // =========================================
    // Construction
    // =========================================

    pub fn int(signedness: Signedness, bits: u16) -> Type {
        Type::Int(IntInfo { signedness, bits })
    }

    pub fn pointer(size: PtrSize, child: Type, is_const: bool) -> Type {
        Type::Pointer(Arc::new(PointerType {
            size,
            child,
            is_const,
            sentinel: None,
        }))
    }

    pub fn single_ptr(child: Type, is_const: bool) -> Type {
        Type::pointer(PtrSize::One, child, is_const)
    }

    pub fn slice(child: Type, is_const: bool) -> Type {
        Type::pointer(PtrSize::Slice, child, is_const)
    }

    pub fn array(len: u64, child: Type) -> Type {
        Type::Array(Arc::new(ArrayType {
            len,
            child,
            sentinel: None,
        }))
    }

    pub fn optional(child: Type) -> Type {
        Type::Optional(Arc::new(child))
    }

    pub fn vector(len: u32, child: Type) -> Type {
        Type::Vector(Arc::new(VectorType { len, child }))
    }

    pub fn function(params: Vec<Type>, ret: Type, cc: CallingConvention) -> Type {
        Type::Fn(Arc::new(FnType { params, ret, cc }))
    }

    // =========================================
    // Classification
    // =========================================

    /// Runtime integer type.
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Runtime float type.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float(_))
    }

    /// Integer or float, runtime or comptime.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int(_) | Type::Float(_) | Type::ComptimeInt | Type::ComptimeFloat
        )
    }

    #[inline]
    pub fn is_signed_int(&self) -> bool {
        matches!(self, Type::Int(info) if info.is_signed())
    }

    #[inline]
    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector(_))
    }

    pub fn int_info(&self) -> Option<IntInfo> {
        match self {
            Type::Int(info) => Some(*info),
            _ => None,
        }
    }

    pub fn float_bits(&self) -> Option<u16> {
        match self {
            Type::Float(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn pointer_info(&self) -> Option<&PointerType> {
        match self {
            Type::Pointer(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn fn_info(&self) -> Option<&FnType> {
        match self {
            Type::Fn(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_single_pointer(&self) -> bool {
        matches!(self, Type::Pointer(p) if p.size == PtrSize::One)
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, Type::Pointer(p) if p.size == PtrSize::Slice)
    }

    /// `[*]T` or `[*c]T`.
    pub fn is_unknown_len_pointer(&self) -> bool {
        matches!(self, Type::Pointer(p) if matches!(p.size, PtrSize::Many | PtrSize::C))
    }

    /// Element type of pointers, arrays, vectors and optionals.
    pub fn elem_type(&self) -> Option<&Type> {
        match self {
            Type::Pointer(p) => Some(&p.child),
            Type::Array(a) => Some(&a.child),
            Type::Vector(v) => Some(&v.child),
            Type::Optional(child) => Some(child),
            _ => None,
        }
    }

    /// Length of arrays and vectors.
    pub fn array_len(&self) -> Option<u64> {
        match self {
            Type::Array(a) => Some(a.len),
            Type::Vector(v) => Some(u64::from(v.len)),
            _ => None,
        }
    }

    pub fn optional_child(&self) -> Option<&Type> {
        match self {
            Type::Optional(child) => Some(child),
            _ => None,
        }
    }

    /// Types whose values only exist at compile time.
    pub fn is_comptime_only(&self) -> bool {
        match self {
            Type::ComptimeInt
            | Type::ComptimeFloat
            | Type::Type
            | Type::Null
            | Type::Undefined
            | Type::Fn(_) => true,
            Type::Pointer(p) => p.child.is_comptime_only() && !matches!(p.child, Type::Fn(_)),
            Type::Array(a) => a.child.is_comptime_only(),
            Type::Optional(child) => child.is_comptime_only(),
            Type::Vector(v) => v.child.is_comptime_only(),
            Type::Void | Type::Bool | Type::NoReturn | Type::Int(_) | Type::Float(_) => false,
        }
    }

    /// Whether a mutable variable may have this type.
    pub fn is_valid_var_type(&self) -> bool {
        let mut ty = self;
        loop {
            match ty {
                Type::Bool | Type::Int(_) | Type::Float(_) | Type::Vector(_) => return true,
                Type::ComptimeFloat
                | Type::ComptimeInt
                | Type::NoReturn
                | Type::Type
                | Type::Void
                | Type::Undefined
                | Type::Null
                | Type::Fn(_) => return false,
                Type::Optional(child) => ty = child,
                Type::Pointer(p) => ty = &p.child,
                Type::Array(a) => ty = &a.child,
            }
        }
    }

    /// Whether values of this type occupy storage in generated code.
    pub fn has_code_gen_bits(&self) -> bool {
        match self {
            Type::Void
            | Type::NoReturn
            | Type::Type
            | Type::ComptimeInt
            | Type::ComptimeFloat
            | Type::Undefined
            | Type::Null => false,
            Type::Bool | Type::Float(_) => true,
            Type::Int(info) => info.bits != 0,
            Type::Pointer(p) => !p.child.is_comptime_only(),
            Type::Array(a) => a.len != 0 && a.child.has_code_gen_bits(),
            Type::Vector(v) => v.len != 0 && v.child.has_code_gen_bits(),
            Type::Optional(child) => !child.is_comptime_only(),
            Type::Fn(f) => {
                f.cc != CallingConvention::Inline
                    && !f.params.iter().any(Type::is_comptime_only)
                    && !f.ret.is_comptime_only()
            }
        }
    }
}

// ============================================================================
// Equality
// ============================================================================

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Int(a), Type::Int(b)) => a == b,
            (Type::Float(a), Type::Float(b)) => a == b,
            (Type::Pointer(a), Type::Pointer(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Array(a), Type::Array(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Optional(a), Type::Optional(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Vector(a), Type::Vector(b)) => Arc::ptr_eq(a, b) || a == b,
            (Type::Fn(a), Type::Fn(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => {
                std::mem::discriminant(self) == std::mem::discriminant(other)
                    && !self.has_payload()
            }
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Type::Int(info) => info.hash(state),
            Type::Float(bits) => bits.hash(state),
            Type::Pointer(p) => p.hash(state),
            Type::Array(a) => a.hash(state),
            Type::Optional(c) => c.hash(state),
            Type::Vector(v) => v.hash(state),
            Type::Fn(f) => f.hash(state),
            _ => {}
        }
    }
}

impl Type {
    fn has_payload(&self) -> bool {
        matches!(
            self,
            Type::Int(_)
                | Type::Float(_)
                | Type::Pointer(_)
                | Type::Array(_)
                | Type::Optional(_)
                | Type::Vector(_)
                | Type::Fn(_)
        )
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Bool => f.write_str("bool"),
            Type::NoReturn => f.write_str("noreturn"),
            Type::Type => f.write_str("type"),
            Type::ComptimeInt => f.write_str("comptime_int"),
            Type::ComptimeFloat => f.write_str("comptime_float"),
            Type::Undefined => f.write_str("@TypeOf(undefined)"),
            Type::Null => f.write_str("@TypeOf(null)"),
            Type::Int(info) => match info.signedness {
                Signedness::Signed => write!(f, "i{}", info.bits),
                Signedness::Unsigned => write!(f, "u{}", info.bits),
            },
            Type::Float(bits) => write!(f, "f{}", bits),
            Type::Pointer(p) => {
                match (p.size, p.sentinel) {
                    (PtrSize::One, _) => f.write_str("*")?,
                    (PtrSize::Many, None) => f.write_str("[*]")?,
                    (PtrSize::Many, Some(s)) => write!(f, "[*:{}]", s)?,
                    (PtrSize::Slice, None) => f.write_str("[]")?,
                    (PtrSize::Slice, Some(s)) => write!(f, "[:{}]", s)?,
                    (PtrSize::C, _) => f.write_str("[*c]")?,
                }
                if p.is_const {
                    f.write_str("const ")?;
                }
                write!(f, "{}", p.child)
            }
            Type::Array(a) => match a.sentinel {
                Some(s) => write!(f, "[{}:{}]{}", a.len, s, a.child),
                None => write!(f, "[{}]{}", a.len, a.child),
            },
            Type::Optional(child) => write!(f, "?{}", child),
            Type::Vector(v) => write!(f, "@Vector({}, {})", v.len, v.child),
            Type::Fn(func) => {
                f.write_str("fn(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                f.write_str(") ")?;
                match func.cc {
                    CallingConvention::Unspecified => {}
                    CallingConvention::C => f.write_str("callconv(.C) ")?,
                    CallingConvention::Inline => f.write_str("callconv(.Inline) ")?,
                }
                write!(f, "{}", func.ret)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_fits() {
        assert!(IntInfo::unsigned(8).fits(255));
        assert!(!IntInfo::unsigned(8).fits(256));
        assert!(!IntInfo::unsigned(8).fits(-1));
        assert!(IntInfo::signed(8).fits(-128));
        assert!(!IntInfo::signed(8).fits(128));
        assert!(IntInfo::signed(0).fits(0));
        assert!(IntInfo::unsigned(200).fits(i128::MAX));
        assert!(IntInfo::signed(128).fits(i128::MIN));
    }

    #[test]
    fn structural_equality() {
        let a = Type::slice(Type::U8, true);
        let b = Type::slice(Type::U8, true);
        assert_eq!(a, b);
        assert_ne!(a, Type::slice(Type::U8, false));
        assert_ne!(Type::U8, Type::I8);
        assert_eq!(Type::Bool, Type::Bool);
        assert_ne!(Type::Bool, Type::Void);
    }

    #[test]
    fn shared_payload_equality() {
        let a = Type::array(4, Type::U8);
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn display_composites() {
        assert_eq!(Type::single_ptr(Type::array(4, Type::U8), false).to_string(), "*[4]u8");
        assert_eq!(Type::slice(Type::U8, true).to_string(), "[]const u8");
        assert_eq!(Type::optional(Type::I32).to_string(), "?i32");
        assert_eq!(Type::vector(4, Type::F32).to_string(), "@Vector(4, f32)");
        assert_eq!(
            Type::function(vec![Type::I32, Type::Bool], Type::Void, CallingConvention::Unspecified)
                .to_string(),
            "fn(i32, bool) void"
        );
    }

    #[test]
    fn var_type_validity() {
        assert!(Type::U8.is_valid_var_type());
        assert!(!Type::ComptimeInt.is_valid_var_type());
        assert!(!Type::Type.is_valid_var_type());
        assert!(Type::optional(Type::U8).is_valid_var_type());
        assert!(!Type::array(2, Type::ComptimeInt).is_valid_var_type());
    }

    #[test]
    fn code_gen_bits() {
        let f = Type::function(vec![Type::I32], Type::I32, CallingConvention::Unspecified);
        assert!(f.has_code_gen_bits());
        let generic = Type::function(vec![Type::Type], Type::Void, CallingConvention::Unspecified);
        assert!(!generic.has_code_gen_bits());
        let inline = Type::function(vec![], Type::Void, CallingConvention::Inline);
        assert!(!inline.has_code_gen_bits());
        assert!(!Type::Int(IntInfo::unsigned(0)).has_code_gen_bits());
    }
}
