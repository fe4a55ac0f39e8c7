//! Virtual machine: a single-threaded stack interpreter over tagged cells.
//!
//! Grounded on `bytecode/vm/mod.rs`'s `CallFrame`/fetch-dispatch loop,
//! trimmed of every concern spec.md's Non-goals rule out (generators,
//! async, exceptions, weakrefs, OS calls, inline method caches). The
//! `CallFrame<'code>` lifetime-parameterized borrow of its code is carried
//! over directly from the teacher's own frame representation.

use crate::bytecode::{ArithOp, CellKind, FuncDescId, LinkedModule, Op};
use crate::error::{ErrorKind, VenomError, VenomResult};
use crate::heap::{ClassObjId, Heap, NativePayload};
use crate::io::PrintWriter;
use crate::value::{stringify_immediate, Cell};

/// `(return-ip, locals, current function descriptor)`, per spec.md §4.7.
struct CallFrame<'code> {
    code: &'code [Op],
    ip: usize,
    locals: Vec<Cell>,
}

/// A lightweight handle identifying the active execution context, handed to
/// built-ins that need to know where they were called from. Venom has a
/// single built-in (`print`) with no re-entrant call back into the VM, so
/// this only tracks frame depth rather than ouros's fuller re-entrant
/// callback machinery.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    pub frame_depth: usize,
}

pub struct Vm<'code> {
    frames: Vec<CallFrame<'code>>,
    stack: Vec<Cell>,
    heap: Heap,
    module: &'code LinkedModule,
}

impl<'code> Vm<'code> {
    /// Builds a fresh VM over `module`, copying its linked class-object
    /// table into the heap's own class table up front. `AllocObj`/
    /// `CallVirtual` address classes by `ClassObjId`, and the heap's class
    /// table must hold an entry at that same index before either opcode
    /// runs; `Linker`/`ClassObjMap` assign ids by insertion order
    /// (`ClassObjId(len())` at each `insert`), and `Heap::register_class`
    /// does the same, so copying `module.classes` across in order keeps
    /// every id meaning the same class on both sides.
    pub fn new(module: &'code LinkedModule) -> Self {
        let mut heap = Heap::new();
        for class in module.classes.iter() {
            heap.register_class(class.clone());
        }
        Self {
            frames: Vec::new(),
            stack: Vec::new(),
            heap,
            module,
        }
    }

    /// Yields the active execution context. Built-ins call this to learn how
    /// deep the current call stack is; re-entrant calls from a built-in back
    /// into the VM would push a new frame and restore this on return (see
    /// spec.md §5's scoped-acquisition discipline), though no built-in in
    /// this core actually re-enters the VM.
    pub fn current_context(&self) -> ExecutionContext {
        ExecutionContext {
            frame_depth: self.frames.len(),
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Runs the module's entry code to completion, returning the final cell
    /// on the operand stack (the program's result, if any). Fatal failures
    /// (decode errors, nil-receiver dispatch, div-by-zero, overflow) return
    /// `ErrorKind::VMFatal`; no Venom-level exception mechanism exists in
    /// this core (spec.md §4.7).
    pub fn run(&mut self, writer: &mut dyn PrintWriter) -> VenomResult<Option<Cell>> {
        self.frames.push(CallFrame {
            code: self.module.entry.as_slice(),
            ip: 0,
            locals: Vec::new(),
        });
        self.run_loop(writer)?;
        Ok(self.stack.pop())
    }

    fn run_loop(&mut self, writer: &mut dyn PrintWriter) -> VenomResult<()> {
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(());
            };
            if frame.ip >= frame.code.len() {
                // Implicit return at end of function body.
                self.frames.pop();
                if self.frames.is_empty() {
                    return Ok(());
                }
                continue;
            }
            let op = frame.code[frame.ip];
            self.frames.last_mut().expect("frame checked above").ip += 1;
            match self.step(op, writer)? {
                StepResult::Continue => {}
                StepResult::Halted => return Ok(()),
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, op: Op, writer: &mut dyn PrintWriter) -> VenomResult<StepResult> {
        match op {
            Op::PushCellInt(v) => self.stack.push(Cell::Int(v)),
            Op::PushCellFloat(bits) => self.stack.push(Cell::Float(f64::from_bits(bits))),
            Op::PushCellBool(v) => self.stack.push(Cell::Bool(v)),
            Op::PushCellNil => self.stack.push(Cell::NIL),
            Op::PushCellRef(const_idx) => {
                let text = self
                    .module
                    .constants
                    .get(const_idx as usize)
                    .ok_or_else(|| fatal("PUSH_CELL_REF constant index out of range"))?
                    .clone();
                let id = self.heap.allocate_native(self.module.string_class, NativePayload::Str(text));
                self.stack.push(Cell::Ref(id));
            }
            Op::PopCell => {
                self.pop()?;
            }
            Op::PopCellRef => {
                let cell = self.pop()?;
                cell.release(&mut self.heap);
            }
            Op::LoadLocal(_kind, slot) => {
                let frame = self.frames.last().ok_or_else(|| fatal("LOAD_LOCAL with no active frame"))?;
                let cell = frame
                    .locals
                    .get(slot as usize)
                    .ok_or_else(|| fatal("LOAD_LOCAL out of range"))?
                    .dup(&mut self.heap);
                self.stack.push(cell);
            }
            Op::StoreLocal(_kind, slot) => {
                let value = self.pop()?;
                let frame = self.frames.last_mut().ok_or_else(|| fatal("STORE_LOCAL with no active frame"))?;
                while frame.locals.len() <= slot as usize {
                    frame.locals.push(Cell::NIL);
                }
                let old = std::mem::replace(&mut frame.locals[slot as usize], value);
                old.release(&mut self.heap);
            }
            Op::LoadAttr(_kind, idx) => {
                let receiver = self.pop()?;
                let Cell::Ref(id) = receiver else {
                    return Err(fatal("LOAD_ATTR on a non-reference receiver"));
                };
                if id.is_null() {
                    return Err(fatal("nil-receiver attribute access"));
                }
                let cell = self.heap.get(id).attrs[idx as usize].dup(&mut self.heap);
                self.stack.push(cell);
            }
            Op::StoreAttr(_kind, idx) => {
                let value = self.pop()?;
                let receiver = self.pop()?;
                let Cell::Ref(id) = receiver else {
                    return Err(fatal("STORE_ATTR on a non-reference receiver"));
                };
                if id.is_null() {
                    return Err(fatal("nil-receiver attribute store"));
                }
                let old = std::mem::replace(&mut self.heap.get_mut(id).attrs[idx as usize], value);
                old.release(&mut self.heap);
            }
            Op::BinOp(arith, kind) => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = self.eval_binop(arith, kind, lhs, rhs)?;
                self.stack.push(result);
            }
            Op::Jump(label) => {
                self.frames.last_mut().expect("active frame").ip = label.0 as usize;
            }
            Op::BranchZ(_kind, label) => {
                let cell = self.pop()?;
                if is_falsey(&cell) {
                    self.frames.last_mut().expect("active frame").ip = label.0 as usize;
                }
            }
            Op::BranchNz(_kind, label) => {
                let cell = self.pop()?;
                if !is_falsey(&cell) {
                    self.frames.last_mut().expect("active frame").ip = label.0 as usize;
                }
            }
            Op::Call(func_id, argc) => self.do_call(func_id, argc, writer)?,
            Op::CallVirtual(vtable_idx, argc) => self.do_call_virtual(vtable_idx, argc, writer)?,
            Op::Ret => {
                let frame = self.frames.pop().ok_or_else(|| fatal("RET with no active frame"))?;
                for local in frame.locals {
                    local.release(&mut self.heap);
                }
            }
            Op::RetCellRef => {
                let ret = self.pop()?;
                let frame = self.frames.pop().ok_or_else(|| fatal("RET_CELL_REF with no active frame"))?;
                for local in frame.locals {
                    local.release(&mut self.heap);
                }
                self.stack.push(ret);
            }
            Op::AllocObj(class_id) => {
                let obj = self.alloc_instance(class_id);
                self.stack.push(Cell::Ref(obj));
            }
            Op::Incref => {
                let cell = self.pop()?;
                let dup = cell.dup(&mut self.heap);
                self.stack.push(cell);
                self.stack.push(dup);
            }
            Op::Decref => {
                let cell = self.pop()?;
                if let Cell::Ref(id) = &cell {
                    self.heap.inc_ref(*id);
                }
                cell.release(&mut self.heap);
            }
        }
        Ok(StepResult::Continue)
    }

    fn alloc_instance(&mut self, class_id: ClassObjId) -> crate::heap::HeapId {
        let attr_count = self.heap.class(class_id).attr_count;
        self.heap.allocate(class_id, (0..attr_count).map(|_| Cell::NIL).collect())
    }

    fn pop(&mut self) -> VenomResult<Cell> {
        self.stack.pop().ok_or_else(|| fatal("operand stack underflow"))
    }

    fn do_call(&mut self, func_id: FuncDescId, argc: u32, writer: &mut dyn PrintWriter) -> VenomResult<()> {
        let desc = self.module.funcs.get(func_id);
        if desc.native {
            return self.call_native(&desc.name.clone(), argc, writer);
        }
        if self.stack.len() < argc as usize {
            return Err(fatal("CALL with fewer operands than its argument count"));
        }
        let base = self.stack.len() - argc as usize;
        let locals: Vec<Cell> = self.stack.split_off(base);
        self.frames.push(CallFrame {
            code: desc.code.as_slice(),
            ip: 0,
            locals,
        });
        Ok(())
    }

    fn do_call_virtual(&mut self, vtable_idx: u32, argc: u32, writer: &mut dyn PrintWriter) -> VenomResult<()> {
        // Receiver sits below the `argc` explicit arguments.
        if self.stack.len() < argc as usize + 1 {
            return Err(fatal("CALL_VIRTUAL with fewer operands than receiver+args"));
        }
        let receiver_idx = self.stack.len() - argc as usize - 1;
        let Cell::Ref(receiver_id) = self.stack[receiver_idx] else {
            return Err(fatal("CALL_VIRTUAL on a non-reference receiver"));
        };
        if receiver_id.is_null() {
            return Err(fatal("nil-receiver virtual dispatch"));
        }
        let class_id = self.heap.get(receiver_id).class;
        let func_id = *self
            .heap
            .class(class_id)
            .vtable
            .get(vtable_idx as usize)
            .ok_or_else(|| fatal("CALL_VIRTUAL vtable index out of range"))?;
        self.do_call(func_id, argc + 1, writer)
    }

    fn call_native(&mut self, name: &str, argc: u32, writer: &mut dyn PrintWriter) -> VenomResult<()> {
        match name {
            "print" => {
                if argc != 1 {
                    return Err(fatal("print expects exactly one argument"));
                }
                let value = self.pop()?;
                let text = self.stringify(&value)?;
                writer.print_line(&text);
                value.release(&mut self.heap);
                self.stack.push(Cell::NIL);
                Ok(())
            }
            other => Err(fatal(&format!("unknown native function '{other}'"))),
        }
    }

    /// Invokes the stringify vtable slot on `value`'s class for a `Ref`
    /// that isn't nil; immediates are stringified directly per spec.md §6.
    /// Builtin `String` is also handled directly here, via its native
    /// payload, rather than through a vtable slot — `String` carries no
    /// declared methods to dispatch through (see `Linker::new`), so there is
    /// no slot to call.
    fn stringify(&mut self, value: &Cell) -> VenomResult<String> {
        if let Some(s) = stringify_immediate(value) {
            return Ok(s);
        }
        if let Cell::Ref(id) = value {
            if let Some(NativePayload::Str(s)) = &self.heap.get(*id).native {
                return Ok(s.clone());
            }
        }
        // A live non-nil Ref with no immediate stringification and no
        // native payload reaching here means a user class with no
        // registered stringify slot — not yet implemented in this core.
        Err(fatal("value has no stringify implementation"))
    }

    fn eval_binop(&mut self, arith: ArithOp, kind: CellKind, lhs: Cell, rhs: Cell) -> VenomResult<Cell> {
        use ArithOp::{And, CmpEq, CmpNe, Or, Xor};
        debug_assert_eq!(cell_kind(&lhs), kind, "emitter/VM cell-kind mismatch (lhs)");
        match (kind, arith, lhs, rhs) {
            (CellKind::Int, op, Cell::Int(a), Cell::Int(b)) => self.eval_int_binop(op, a, b),
            (CellKind::Float, op, Cell::Float(a), Cell::Float(b)) => Ok(eval_float_binop(op, a, b)),
            (CellKind::Bool, And, Cell::Bool(a), Cell::Bool(b)) => Ok(Cell::Bool(a && b)),
            (CellKind::Bool, Or, Cell::Bool(a), Cell::Bool(b)) => Ok(Cell::Bool(a || b)),
            (CellKind::Bool, Xor, Cell::Bool(a), Cell::Bool(b)) => Ok(Cell::Bool(a != b)),
            (CellKind::Bool, CmpEq, Cell::Bool(a), Cell::Bool(b)) => Ok(Cell::Bool(a == b)),
            (CellKind::Bool, CmpNe, Cell::Bool(a), Cell::Bool(b)) => Ok(Cell::Bool(a != b)),
            (CellKind::Ref, CmpEq, Cell::Ref(a), Cell::Ref(b)) => Ok(Cell::Bool(a == b)),
            (CellKind::Ref, CmpNe, Cell::Ref(a), Cell::Ref(b)) => Ok(Cell::Bool(a != b)),
            _ => Err(fatal("binary operator applied to a mismatched cell kind")),
        }
    }

    fn eval_int_binop(&mut self, op: ArithOp, a: i64, b: i64) -> VenomResult<Cell> {
        use ArithOp::{Add, CmpEq, CmpGe, CmpGt, CmpLe, CmpLt, CmpNe, Div, Mod, Mul, Sub};
        Ok(match op {
            Add => Cell::Int(a.checked_add(b).ok_or_else(|| fatal("Int overflow"))?),
            Sub => Cell::Int(a.checked_sub(b).ok_or_else(|| fatal("Int overflow"))?),
            Mul => Cell::Int(a.checked_mul(b).ok_or_else(|| fatal("Int overflow"))?),
            Div => {
                if b == 0 {
                    return Err(fatal("division by zero"));
                }
                Cell::Int(a.checked_div(b).ok_or_else(|| fatal("Int overflow"))?)
            }
            Mod => {
                if b == 0 {
                    return Err(fatal("division by zero"));
                }
                Cell::Int(a % b)
            }
            CmpLt => Cell::Bool(a < b),
            CmpLe => Cell::Bool(a <= b),
            CmpGt => Cell::Bool(a > b),
            CmpGe => Cell::Bool(a >= b),
            CmpEq => Cell::Bool(a == b),
            CmpNe => Cell::Bool(a != b),
            _ => return Err(fatal("operator not defined over Int")),
        })
    }
}

fn eval_float_binop(op: ArithOp, a: f64, b: f64) -> Cell {
    use ArithOp::{Add, CmpEq, CmpGe, CmpGt, CmpLe, CmpLt, CmpNe, Div, Mod, Mul, Sub};
    match op {
        Add => Cell::Float(a + b),
        Sub => Cell::Float(a - b),
        Mul => Cell::Float(a * b),
        Div => Cell::Float(a / b),
        Mod => Cell::Float(a % b),
        CmpLt => Cell::Bool(a < b),
        CmpLe => Cell::Bool(a <= b),
        CmpGt => Cell::Bool(a > b),
        CmpGe => Cell::Bool(a >= b),
        CmpEq => Cell::Bool(a == b),
        CmpNe => Cell::Bool(a != b),
        _ => Cell::Bool(false),
    }
}

fn cell_kind(cell: &Cell) -> CellKind {
    match cell {
        Cell::Int(_) => CellKind::Int,
        Cell::Float(_) => CellKind::Float,
        Cell::Bool(_) => CellKind::Bool,
        Cell::Ref(_) => CellKind::Ref,
    }
}

fn is_falsey(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => !*b,
        Cell::Int(v) => *v == 0,
        Cell::Float(v) => *v == 0.0,
        Cell::Ref(id) => id.is_null(),
    }
}

enum StepResult {
    Continue,
    #[allow(dead_code)]
    Halted,
}

fn fatal(message: &str) -> VenomError {
    VenomError::new(ErrorKind::VMFatal, message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{FuncDesc, Linker};
    use crate::io::CollectPrint;

    fn linked(entry: Vec<Op>) -> LinkedModule {
        Linker::new().finish(entry)
    }

    #[test]
    fn arithmetic_precedence_is_already_resolved_by_codegen() {
        // x = 1 + 2 * 3; print(x)  (scenario 2): codegen has already
        // flattened precedence into RPN-style bytecode by the time the VM
        // sees it.
        let module = linked(vec![
            Op::PushCellInt(1),
            Op::PushCellInt(2),
            Op::PushCellInt(3),
            Op::BinOp(ArithOp::Mul, CellKind::Int),
            Op::BinOp(ArithOp::Add, CellKind::Int),
        ]);
        let mut vm = Vm::new(&module);
        let mut sink = CollectPrint::default();
        let result = vm.run(&mut sink).unwrap();
        assert_eq!(result, Some(Cell::Int(7)));
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let module = linked(vec![
            Op::PushCellInt(1),
            Op::PushCellInt(0),
            Op::BinOp(ArithOp::Div, CellKind::Int),
        ]);
        let mut vm = Vm::new(&module);
        let mut sink = CollectPrint::default();
        let err = vm.run(&mut sink).unwrap_err();
        assert_eq!(err.kind, ErrorKind::VMFatal);
    }

    #[test]
    fn print_builtin_writes_stringified_value_and_returns_nil() {
        let mut linker = Linker::new();
        let print_id = linker.define_func(FuncDesc {
            name: "print".into(),
            arg_count: 1,
            ref_arg_mask: 0,
            native: true,
            code: Vec::new(),
        });
        let module = linker.finish(vec![
            Op::PushCellInt(42),
            Op::Call(print_id, 1),
        ]);
        let mut vm = Vm::new(&module);
        let mut sink = CollectPrint::default();
        let result = vm.run(&mut sink).unwrap();
        assert_eq!(sink.lines, vec!["42".to_owned()]);
        assert_eq!(result, Some(Cell::NIL));
    }
}
