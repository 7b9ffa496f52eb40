//! Typed intermediate representation.
//!
//! Instructions live in an [`IrArena`] and are addressed by [`InstRef`]
//! indices. Bodies are ordered lists of refs. An arena can be snapshotted and
//! later truncated back to that point, which is how a failed function body
//! analysis releases everything it appended.

use std::fmt;

use kiln_core::{CmpOp, InnerError, InnerResult, Span, Type, Value};

/// Handle to an instruction in an [`IrArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstRef(pub u32);

impl InstRef {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for InstRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for InstRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// An ordered instruction list.
pub type Body = Vec<InstRef>;

/// Instructions without operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoOp {
    /// Stack slot; the instruction type is the pointer type.
    Alloc,
    Breakpoint,
    Unreachable,
    RetVoid,
}

/// Single-operand instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Load,
    Bitcast,
    Negate,
    Not,
    IntCast,
    FloatCast,
    WrapOptional,
    IsNull,
    IsNonNull,
    /// Address of a runtime value.
    Ref,
    Ret,
    ArrayToSlice,
    ArrayToMany,
    ArrayToC,
}

/// Two-operand instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Cmp(CmpOp),
    BoolAnd,
    BoolOr,
    /// `lhs` is the pointer, `rhs` the stored value.
    Store,
}

impl BinOp {
    pub fn from_arith(op: kiln_core::ArithOp) -> Self {
        use kiln_core::ArithOp;
        match op {
            ArithOp::Add => BinOp::Add,
            ArithOp::Sub => BinOp::Sub,
            ArithOp::Mul => BinOp::Mul,
            ArithOp::Div => BinOp::Div,
            ArithOp::Rem => BinOp::Rem,
        }
    }
}

/// One arm of a `switch_br`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub item: Value,
    pub body: Body,
}

/// Instruction payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Constant(Value),
    Arg { index: u32 },
    NoOp(NoOp),
    UnOp { op: UnOp, operand: InstRef },
    BinOp { op: BinOp, lhs: InstRef, rhs: InstRef },
    /// Exit `block`, yielding `operand` as its result.
    Br { block: InstRef, operand: Option<InstRef> },
    CondBr {
        cond: InstRef,
        then_body: Body,
        else_body: Body,
    },
    Block { body: Body },
    /// Repeats `body` until a `br` leaves an enclosing block.
    Loop { body: Body },
    Call { callee: InstRef, args: Vec<InstRef> },
    SwitchBr {
        target: InstRef,
        cases: Vec<SwitchCase>,
        else_body: Body,
    },
}

/// A typed, source-located instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub kind: InstKind,
    pub ty: Type,
    pub src: Span,
}

impl Inst {
    /// The compile-time value, for constants.
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            InstKind::Constant(val) => Some(val),
            _ => None,
        }
    }

    /// Whether control never continues past this instruction.
    pub fn is_no_return(&self) -> bool {
        self.ty == Type::NoReturn
    }
}

// ============================================================================
// Arena
// ============================================================================

/// Restorable marker into an [`IrArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaSnapshot {
    len: u32,
}

/// Instruction storage for one analysis lifetime.
#[derive(Debug, Clone, Default)]
pub struct IrArena {
    insts: Vec<Inst>,
    limit: Option<usize>,
}

impl IrArena {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            insts: Vec::new(),
            limit,
        }
    }

    /// Allocate an instruction, failing once the budget is spent.
    pub fn alloc(&mut self, kind: InstKind, ty: Type, src: Span) -> InnerResult<InstRef> {
        if self.limit.is_some_and(|limit| self.insts.len() >= limit) {
            return Err(InnerError::OutOfMemory);
        }
        let inst_ref = InstRef(self.insts.len() as u32);
        self.insts.push(Inst { kind, ty, src });
        Ok(inst_ref)
    }

    #[inline]
    pub fn get(&self, inst: InstRef) -> &Inst {
        &self.insts[inst.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, inst: InstRef) -> &mut Inst {
        &mut self.insts[inst.index()]
    }

    #[inline]
    pub fn ty(&self, inst: InstRef) -> &Type {
        &self.insts[inst.index()].ty
    }

    #[inline]
    pub fn value(&self, inst: InstRef) -> Option<&Value> {
        self.insts[inst.index()].value()
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        ArenaSnapshot {
            len: self.insts.len() as u32,
        }
    }

    /// Drop everything allocated after `snapshot`.
    pub fn restore(&mut self, snapshot: ArenaSnapshot) {
        self.insts.truncate(snapshot.len as usize);
    }

    /// Fill in the body of a previously reserved `block` or `loop`.
    pub fn set_body(&mut self, inst: InstRef, new_body: Body) {
        match &mut self.get_mut(inst).kind {
            InstKind::Block { body } | InstKind::Loop { body } => *body = new_body,
            _ => debug_assert!(false, "set_body on non-block instruction {}", inst),
        }
    }

    /// Render `body` in a readable listing.
    pub fn display_body<'a>(&'a self, body: &'a [InstRef]) -> BodyDisplay<'a> {
        BodyDisplay { arena: self, body }
    }
}

/// Display adapter returned by [`IrArena::display_body`].
pub struct BodyDisplay<'a> {
    arena: &'a IrArena,
    body: &'a [InstRef],
}

impl BodyDisplay<'_> {
    fn write_body(
        &self,
        f: &mut fmt::Formatter<'_>,
        body: &[InstRef],
        indent: usize,
    ) -> fmt::Result {
        for &inst_ref in body {
            let inst = self.arena.get(inst_ref);
            write!(f, "{:indent$}{} : {} = ", "", inst_ref, inst.ty, indent = indent)?;
            match &inst.kind {
                InstKind::Constant(val) => writeln!(f, "constant({})", val)?,
                InstKind::Arg { index } => writeln!(f, "arg({})", index)?,
                InstKind::NoOp(op) => writeln!(f, "{:?}", op)?,
                InstKind::UnOp { op, operand } => writeln!(f, "{:?}({})", op, operand)?,
                InstKind::BinOp { op, lhs, rhs } => writeln!(f, "{:?}({}, {})", op, lhs, rhs)?,
                InstKind::Br { block, operand } => match operand {
                    Some(operand) => writeln!(f, "br({}, {})", block, operand)?,
                    None => writeln!(f, "br({})", block)?,
                },
                InstKind::CondBr {
                    cond,
                    then_body,
                    else_body,
                } => {
                    writeln!(f, "condbr({}) {{", cond)?;
                    self.write_body(f, then_body, indent + 2)?;
                    writeln!(f, "{:indent$}}} else {{", "", indent = indent)?;
                    self.write_body(f, else_body, indent + 2)?;
                    writeln!(f, "{:indent$}}}", "", indent = indent)?;
                }
                InstKind::Block { body } | InstKind::Loop { body } => {
                    let name = match inst.kind {
                        InstKind::Loop { .. } => "loop",
                        _ => "block",
                    };
                    writeln!(f, "{} {{", name)?;
                    self.write_body(f, body, indent + 2)?;
                    writeln!(f, "{:indent$}}}", "", indent = indent)?;
                }
                InstKind::Call { callee, args } => {
                    write!(f, "call({}", callee)?;
                    for arg in args {
                        write!(f, ", {}", arg)?;
                    }
                    writeln!(f, ")")?;
                }
                InstKind::SwitchBr {
                    target,
                    cases,
                    else_body,
                } => {
                    writeln!(f, "switchbr({}) {{", target)?;
                    for case in cases {
                        writeln!(f, "{:indent$}{} => {{", "", case.item, indent = indent + 2)?;
                        self.write_body(f, &case.body, indent + 4)?;
                        writeln!(f, "{:indent$}}}", "", indent = indent + 2)?;
                    }
                    writeln!(f, "{:indent$}else => {{", "", indent = indent + 2)?;
                    self.write_body(f, else_body, indent + 4)?;
                    writeln!(f, "{:indent$}}}", "", indent = indent + 2)?;
                    writeln!(f, "{:indent$}}}", "", indent = indent)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for BodyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_body(f, self.body, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_restore_truncates() {
        let mut arena = IrArena::new(None);
        let keep = arena
            .alloc(InstKind::Constant(Value::Int(1)), Type::ComptimeInt, Span::default())
            .unwrap();
        let snapshot = arena.snapshot();
        arena
            .alloc(InstKind::NoOp(NoOp::Breakpoint), Type::Void, Span::default())
            .unwrap();
        arena
            .alloc(InstKind::NoOp(NoOp::RetVoid), Type::NoReturn, Span::default())
            .unwrap();
        assert_eq!(arena.len(), 3);

        arena.restore(snapshot);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.value(keep), Some(&Value::Int(1)));
    }

    #[test]
    fn limit_yields_out_of_memory() {
        let mut arena = IrArena::new(Some(1));
        let ret = InstKind::NoOp(NoOp::RetVoid);
        let first = arena.alloc(ret.clone(), Type::NoReturn, Span::default());
        assert!(first.is_ok());
        assert_eq!(
            arena.alloc(ret, Type::NoReturn, Span::default()),
            Err(InnerError::OutOfMemory)
        );
    }

    #[test]
    fn display_lists_nested_bodies() {
        let mut arena = IrArena::new(None);
        let cond = arena
            .alloc(InstKind::Constant(Value::Bool(true)), Type::Bool, Span::default())
            .unwrap();
        let ret = arena
            .alloc(InstKind::NoOp(NoOp::RetVoid), Type::NoReturn, Span::default())
            .unwrap();
        let br = arena
            .alloc(
                InstKind::CondBr {
                    cond,
                    then_body: vec![ret],
                    else_body: vec![],
                },
                Type::NoReturn,
                Span::default(),
            )
            .unwrap();
        let text = arena.display_body(&[br]).to_string();
        assert!(text.contains("condbr(%0) {"));
        assert!(text.contains("  %1 : noreturn = RetVoid"));
    }
}
