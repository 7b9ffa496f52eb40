//! Instruction builder.
//!
//! A [`Block`] appends typed instructions to an ordered body, allocating them
//! from the arena it borrows. Every `add_*` method has the same shape:
//! allocate, stamp type and source, append, return the handle.

use kiln_core::{InnerResult, Span, Type, Value};

use crate::ir::{BinOp, Body, InstKind, InstRef, IrArena, NoOp, SwitchCase, UnOp};

/// An instruction list under construction.
pub struct Block<'a> {
    pub arena: &'a mut IrArena,
    pub insts: Body,
    /// Every operand must be compile-time known.
    pub is_comptime: bool,
}

impl<'a> Block<'a> {
    pub fn new(arena: &'a mut IrArena, is_comptime: bool) -> Self {
        Self {
            arena,
            insts: Vec::new(),
            is_comptime,
        }
    }

    /// A nested block sharing this block's arena.
    pub fn child(&mut self) -> Block<'_> {
        Block {
            arena: &mut *self.arena,
            insts: Vec::new(),
            is_comptime: self.is_comptime,
        }
    }

    /// A nested compile-time block. Nothing it appends is kept.
    pub fn comptime_child(&mut self) -> Block<'_> {
        Block {
            arena: &mut *self.arena,
            insts: Vec::new(),
            is_comptime: true,
        }
    }

    pub fn into_body(self) -> Body {
        self.insts
    }

    fn add(&mut self, kind: InstKind, ty: Type, src: Span) -> InnerResult<InstRef> {
        let inst = self.arena.alloc(kind, ty, src)?;
        self.insts.push(inst);
        Ok(inst)
    }

    /// A constant lives in the arena but is not part of any body.
    pub fn add_constant(&mut self, ty: Type, val: Value, src: Span) -> InnerResult<InstRef> {
        self.arena.alloc(InstKind::Constant(val), ty, src)
    }

    pub fn add_arg(&mut self, index: u32, ty: Type, src: Span) -> InnerResult<InstRef> {
        self.add(InstKind::Arg { index }, ty, src)
    }

    pub fn add_no_op(&mut self, op: NoOp, ty: Type, src: Span) -> InnerResult<InstRef> {
        self.add(InstKind::NoOp(op), ty, src)
    }

    pub fn add_un_op(
        &mut self,
        op: UnOp,
        ty: Type,
        operand: InstRef,
        src: Span,
    ) -> InnerResult<InstRef> {
        self.add(InstKind::UnOp { op, operand }, ty, src)
    }

    pub fn add_bin_op(
        &mut self,
        op: BinOp,
        ty: Type,
        lhs: InstRef,
        rhs: InstRef,
        src: Span,
    ) -> InnerResult<InstRef> {
        self.add(InstKind::BinOp { op, lhs, rhs }, ty, src)
    }

    pub fn add_br(
        &mut self,
        block: InstRef,
        operand: Option<InstRef>,
        src: Span,
    ) -> InnerResult<InstRef> {
        self.add(InstKind::Br { block, operand }, Type::NoReturn, src)
    }

    pub fn add_cond_br(
        &mut self,
        cond: InstRef,
        then_body: Body,
        else_body: Body,
        ty: Type,
        src: Span,
    ) -> InnerResult<InstRef> {
        self.add(
            InstKind::CondBr {
                cond,
                then_body,
                else_body,
            },
            ty,
            src,
        )
    }

    pub fn add_call(
        &mut self,
        callee: InstRef,
        args: Vec<InstRef>,
        ret_ty: Type,
        src: Span,
    ) -> InnerResult<InstRef> {
        self.add(InstKind::Call { callee, args }, ret_ty, src)
    }

    pub fn add_switch_br(
        &mut self,
        target: InstRef,
        cases: Vec<SwitchCase>,
        else_body: Body,
        src: Span,
    ) -> InnerResult<InstRef> {
        self.add(
            InstKind::SwitchBr {
                target,
                cases,
                else_body,
            },
            Type::NoReturn,
            src,
        )
    }

    /// Append an empty `block`; fill it with [`IrArena::set_body`].
    pub fn add_block(&mut self, ty: Type, src: Span) -> InnerResult<InstRef> {
        self.add(InstKind::Block { body: Vec::new() }, ty, src)
    }

    /// Append an empty `loop`; fill it with [`IrArena::set_body`].
    pub fn add_loop(&mut self, src: Span) -> InnerResult<InstRef> {
        self.add(InstKind::Loop { body: Vec::new() }, Type::NoReturn, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{CmpOp, InnerError};

    #[test]
    fn constants_are_not_appended() {
        let mut arena = IrArena::new(None);
        let mut block = Block::new(&mut arena, false);
        let c = block
            .add_constant(Type::U8, Value::Int(7), Span::new(0, 1))
            .unwrap();
        assert!(block.insts.is_empty());
        assert_eq!(block.arena.value(c), Some(&Value::Int(7)));
        assert_eq!(*block.arena.ty(c), Type::U8);
    }

    #[test]
    fn ops_are_stamped_and_appended() {
        let mut arena = IrArena::new(None);
        let mut block = Block::new(&mut arena, false);
        let a = block.add_arg(0, Type::I32, Span::new(3, 4)).unwrap();
        let b = block.add_arg(1, Type::I32, Span::new(5, 6)).unwrap();
        let sum = block
            .add_bin_op(BinOp::Add, Type::I32, a, b, Span::new(3, 6))
            .unwrap();
        let cmp = block
            .add_bin_op(BinOp::Cmp(CmpOp::Lt), Type::Bool, sum, b, Span::new(3, 8))
            .unwrap();
        let neg = block
            .add_un_op(UnOp::Not, Type::Bool, cmp, Span::new(2, 8))
            .unwrap();
        assert_eq!(block.insts, vec![a, b, sum, cmp, neg]);
        assert_eq!(block.arena.get(sum).src, Span::new(3, 6));
        assert_eq!(*block.arena.ty(cmp), Type::Bool);
    }

    #[test]
    fn nested_bodies_use_the_same_arena() {
        let mut arena = IrArena::new(None);
        let mut block = Block::new(&mut arena, false);
        let outer = block.add_block(Type::Void, Span::default()).unwrap();
        let inner_body = {
            let mut child = block.child();
            child.add_br(outer, None, Span::default()).unwrap();
            child.into_body()
        };
        let looped = block.add_loop(Span::default()).unwrap();
        block.arena.set_body(looped, inner_body.clone());
        assert_eq!(block.insts, vec![outer, looped]);
        assert!(matches!(
            &block.arena.get(looped).kind,
            InstKind::Loop { body } if *body == inner_body
        ));
    }

    #[test]
    fn switch_and_call_shapes() {
        let mut arena = IrArena::new(None);
        let mut block = Block::new(&mut arena, false);
        let target = block.add_arg(0, Type::U8, Span::default()).unwrap();
        let fn_ty = Type::function(vec![], Type::Void, Default::default());
        let callee = block
            .add_constant(fn_ty, Value::Void, Span::default())
            .unwrap();
        let call = block
            .add_call(callee, vec![], Type::Void, Span::default())
            .unwrap();
        let sw = block
            .add_switch_br(
                target,
                vec![SwitchCase {
                    item: Value::Int(1),
                    body: vec![call],
                }],
                vec![],
                Span::default(),
            )
            .unwrap();
        assert!(block.arena.get(sw).is_no_return());
        assert_eq!(block.insts.len(), 3);
    }

    #[test]
    fn exhausted_budget_is_out_of_memory() {
        let mut arena = IrArena::new(Some(2));
        let mut block = Block::new(&mut arena, false);
        block
            .add_no_op(NoOp::Breakpoint, Type::Void, Span::default())
            .unwrap();
        block
            .add_no_op(NoOp::Breakpoint, Type::Void, Span::default())
            .unwrap();
        let err = block.add_no_op(NoOp::Unreachable, Type::NoReturn, Span::default());
        assert_eq!(err, Err(InnerError::OutOfMemory));
        assert_eq!(block.insts.len(), 2);
    }
}
