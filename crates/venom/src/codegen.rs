//! Code generator: lowers a checked, lifted AST into a `LinkedModule`.
//!
//! Grounded on the same division of labor `bytecode/builder.rs` and
//! `bytecode/vm/call.rs` show in the teacher repo: a builder that only knows
//! about stack-effect bookkeeping and label resolution, and a linker that
//! only knows about name -> descriptor tables. This module is the part in
//! between — deciding, for every statement and expression, which `Op`s to
//! emit against a `CodeBuilder`, assigning local slots to the variables the
//! checker left as `StorageClass::Unassigned`, and registering one
//! `FuncDesc`/`ClassObj` per compiled function/class into a `Linker`.
//!
//! Generic functions and classes are compiled exactly once, against their
//! declared placeholder types, rather than once per instantiation: any value
//! whose static type is a bare type parameter is `CellKind::Ref`, since a
//! placeholder's `TypeId` never matches `int_id`/`float_id`/`bool_id`, so no
//! per-call-site specialization is needed to pick the right cell
//! representation. A generic container instantiated over `Int`/`Float`/`Bool`
//! therefore stores a boxed representation for that slot rather than an
//! unboxed cell; this core's test fixtures only instantiate generics over
//! reference types, so the trade-off is never exercised.

use ahash::AHashMap;

use crate::ast::{Ast, BinOp as AstBinOp, ClassDecl, Expr, ExprId, FuncDecl, Stmt, StmtId, UnOp as AstUnOp};
use crate::bytecode::{ArithOp, CellKind, CodeBuilder, FuncDesc, Linker, Op};
use crate::error::{VenomError, VenomResult};
use crate::heap::{ClassObj, ClassObjId, FuncDescId};
use crate::lift::LiftContext;
use crate::symbol::{ClassSymbolId, FuncSymbolId, ScopeId, StorageClass, SymbolTable, VarSymbolId};
use crate::types::{InstId, TypeId, TypeRegistry};

/// Per-function slot assignment. Parameters are bound to their actual
/// position in this frame's own (possibly capture-prefixed) parameter list
/// via `bind_param`, never by consulting `SymbolTable` storage — a lifted
/// function's captures are prepended to its parameter list after the name
/// pass already assigned pre-lift `StorageClass::Parameter` indices, so that
/// stored index is stale for such a function and must not be trusted. Every
/// other local gets the next free slot in declaration order, assigned the
/// first time it is seen and cached here.
#[derive(Default)]
struct Frame {
    next_slot: u32,
    slots: AHashMap<VarSymbolId, u32>,
}

impl Frame {
    /// Binds `sym` to `slot` directly, purely within this frame. Used for
    /// parameters, whose position is determined by the frame itself, not by
    /// whatever `StorageClass` the symbol happens to carry.
    fn bind_param(&mut self, sym: VarSymbolId, slot: u32) {
        self.slots.insert(sym, slot);
    }

    /// Slot for a local variable first introduced by assignment inside this
    /// function's own body. Such a symbol is owned by exactly one frame —
    /// unlike a lifted function's capture symbols, which a caller's frame
    /// and the callee's frame both need to reason about, but never the same
    /// slot number for — so writing the assigned slot back onto the shared
    /// `SymbolTable` here is safe.
    fn slot_of(&mut self, sym: VarSymbolId, symtab: &mut SymbolTable) -> u32 {
        if let Some(&slot) = self.slots.get(&sym) {
            return slot;
        }
        let slot = match symtab.variable(sym).storage {
            StorageClass::Unassigned => {
                let s = self.next_slot;
                self.next_slot += 1;
                symtab.variable_mut(sym).storage = StorageClass::Local(s);
                s
            }
            StorageClass::Local(idx) => idx,
            StorageClass::Parameter(idx) => idx,
            StorageClass::ClassAttribute(_) | StorageClass::ModuleGlobal(_) => {
                unreachable!("attribute/global variables are accessed via AttrAccess, never as a bare local")
            }
        };
        self.slots.insert(sym, slot);
        slot
    }
}

pub struct CodeGen<'a> {
    ast: &'a mut Ast,
    symtab: &'a mut SymbolTable,
    registry: &'a mut TypeRegistry,
    linker: Linker,
    type_to_class: AHashMap<TypeId, ClassSymbolId>,
    /// Declaration site of each class, recorded by `scan` so a class
    /// referenced before its turn in source order (e.g. a method body that
    /// constructs a class declared later) can still be compiled on demand.
    class_decl_stmt: AHashMap<ClassSymbolId, StmtId>,
    /// Lifted-function -> the ORIGINAL (pre-lift, caller-scope) symbols its
    /// now-leading capture parameters were bound from, recorded as nested
    /// functions are scanned for non-local references. A call site loads
    /// each of these from its own frame to build the capture-prefix
    /// argument list; the callee's own synthesized parameter symbols never
    /// appear here.
    captures: AHashMap<FuncSymbolId, Vec<VarSymbolId>>,
    compiled: AHashMap<FuncSymbolId, FuncDescId>,
    compiled_classes: AHashMap<ClassSymbolId, ClassObjId>,
}

impl<'a> CodeGen<'a> {
    pub fn new(registry: &'a mut TypeRegistry, symtab: &'a mut SymbolTable, ast: &'a mut Ast) -> Self {
        let mut type_to_class = AHashMap::new();
        for i in 0..symtab.class_count() {
            let id = ClassSymbolId(u32::try_from(i).expect("class table fits u32"));
            type_to_class.insert(symtab.class(id).type_id, id);
        }
        Self {
            ast,
            symtab,
            registry,
            linker: Linker::new(),
            type_to_class,
            class_decl_stmt: AHashMap::new(),
            captures: AHashMap::new(),
            compiled: AHashMap::new(),
            compiled_classes: AHashMap::new(),
        }
    }

    /// Lowers the whole module: lifts every nested non-generic function to
    /// module scope, compiles every class (flattening vtables down the
    /// inheritance chain) and every non-generic function eagerly, and emits
    /// the top-level statements as the module's entry code.
    pub fn compile_module(mut self, root_scope: ScopeId, stmts: &[StmtId]) -> VenomResult<crate::bytecode::LinkedModule> {
        let mut ctx = LiftContext::new(root_scope);
        self.scan(root_scope, stmts, &mut ctx);

        for &id in stmts {
            if let Stmt::ClassDecl(decl) = self.ast.stmt(id).clone() {
                let class_id = decl.symbol.expect("name pass always assigns a class symbol");
                self.ensure_class_compiled(class_id)?;
            }
        }
        for &id in stmts {
            if let Stmt::FuncDecl(decl) = self.ast.stmt(id).clone() {
                if decl.type_params.is_empty() {
                    self.compile_function(&decl)?;
                }
            }
        }

        let mut entry_builder = CodeBuilder::new();
        for &id in stmts {
            if matches!(self.ast.stmt(id), Stmt::FuncDecl(_) | Stmt::ClassDecl(_)) {
                continue;
            }
            self.emit_stmt(&mut entry_builder, &mut Frame::default(), root_scope, id)?;
        }
        let entry = entry_builder.finish();
        Ok(self.linker.finish(entry))
    }

    // -----------------------------------------------------------------
    // Scanning (closure-lifting driver, class declaration index)
    // -----------------------------------------------------------------

    /// Walks every statement list reachable from `stmts`, lifting each
    /// non-generic `FuncDecl` whose declaring scope is not already
    /// `ctx.lift_into` (i.e. every nested function, direct or transitively
    /// nested) and recording the declaration site of every class. The
    /// nested declaration itself is left in place — only its `FuncSymbol`'s
    /// parameter list and body are rewritten — so the enclosing body's
    /// control flow is unaffected; call sites consult `self.captures` for
    /// the extra leading arguments a lifted callee now expects.
    fn scan(&mut self, scope: ScopeId, stmts: &[StmtId], ctx: &mut LiftContext) {
        for &id in stmts {
            match self.ast.stmt(id).clone() {
                Stmt::FuncDecl(decl) => {
                    if let Some(func) = decl.symbol {
                        if decl.type_params.is_empty() && scope != ctx.lift_into {
                            let own_scope = self.symtab.function(func).body_scope;
                            let lifted = crate::lift::lift_function_decl(self.ast, self.symtab, ctx, own_scope, id, func, &decl);
                            self.captures.insert(func, lifted.captures);
                        }
                        let body_scope = self.symtab.function(func).body_scope;
                        let body = match self.ast.stmt(id) {
                            Stmt::FuncDecl(d) => d.body.clone(),
                            _ => unreachable!("statement kind did not change under us"),
                        };
                        self.scan(body_scope, &body, ctx);
                    }
                }
                Stmt::ClassDecl(decl) => {
                    if let Some(class_id) = decl.symbol {
                        self.class_decl_stmt.insert(class_id, id);
                    }
                    for &m in &decl.methods {
                        self.scan(scope, std::slice::from_ref(&m), ctx);
                    }
                }
                Stmt::While { body, .. } => self.scan(scope, &body, ctx),
                Stmt::ExprStmt(_) | Stmt::Assign { .. } | Stmt::Return(_) => {}
            }
        }
    }

    // -----------------------------------------------------------------
    // Functions and classes
    // -----------------------------------------------------------------

    fn compile_function(&mut self, decl: &FuncDecl) -> VenomResult<FuncDescId> {
        let func = decl.symbol.expect("name pass always assigns a function symbol");
        if let Some(&id) = self.compiled.get(&func) {
            return Ok(id);
        }
        let body_scope = self.symtab.function(func).body_scope;
        let params = self.symtab.function(func).params.clone();

        let mut frame = Frame::default();
        for (idx, &p) in params.iter().enumerate() {
            frame.bind_param(p, u32::try_from(idx).expect("parameter count fits u32"));
        }
        frame.next_slot = u32::try_from(params.len()).expect("parameter count fits u32");

        let mut builder = CodeBuilder::new();
        for &s in &decl.body {
            self.emit_stmt(&mut builder, &mut frame, body_scope, s)?;
        }
        // A body that falls off its last statement without an explicit
        // `return` would otherwise pop the call frame with no value pushed
        // (`vm.rs`'s `run_loop` silently drops a frame whose code is
        // exhausted); every compiled function body leaves exactly one value
        // on the stack, so an implicit `nil` return is always appended.
        builder.emit(Op::PushCellNil);
        builder.emit(Op::RetCellRef);
        let code = builder.finish();

        let ref_arg_mask = ref_arg_mask(&params, self.symtab, self.registry);
        let desc = FuncDesc {
            name: decl.name.clone(),
            arg_count: u32::try_from(params.len()).expect("parameter count fits u32"),
            ref_arg_mask,
            native: false,
            code,
        };
        let id = self.linker.define_func(desc);
        self.compiled.insert(func, id);
        Ok(id)
    }

    /// Compiles `class_id` if it has not been already, looking its
    /// declaration up in `class_decl_stmt` first — used both by the
    /// top-level compile pass and by any call/construction site that
    /// references a class on demand, regardless of source order.
    fn ensure_class_compiled(&mut self, class_id: ClassSymbolId) -> VenomResult<ClassObjId> {
        if let Some(&id) = self.compiled_classes.get(&class_id) {
            return Ok(id);
        }
        let stmt_id = *self
            .class_decl_stmt
            .get(&class_id)
            .expect("scan records every class declaration before compilation begins");
        let Stmt::ClassDecl(decl) = self.ast.stmt(stmt_id).clone() else {
            return Err(VenomError::semantic("class symbol points at a non-class statement"));
        };
        self.compile_class(&decl)
    }

    /// Flattens this class's vtable down the single-inheritance chain: the
    /// parent's already-compiled `Vec<FuncDescId>` and its flattened
    /// name -> slot map seed the working vtable, this class's own declared
    /// methods then override matching names in place and append new ones.
    /// The final flattened map is written back onto `ClassSymbol::vtable`
    /// (`symbol.rs`'s own doc comment on that field names the code
    /// generator as the thing that fills it in), overwriting the
    /// class-local map the checker left there for its own override
    /// resolution.
    fn compile_class(&mut self, decl: &ClassDecl) -> VenomResult<ClassObjId> {
        let class_id = decl.symbol.expect("name pass always assigns a class symbol");
        if let Some(&id) = self.compiled_classes.get(&class_id) {
            return Ok(id);
        }

        let parent = self.symtab.class(class_id).parents.first().copied();
        let (mut vtable, mut flat_names): (Vec<FuncDescId>, AHashMap<String, u32>) = if let Some(parent_id) = parent {
            self.ensure_class_compiled(parent_id)?;
            let parent_obj_id = *self
                .compiled_classes
                .get(&parent_id)
                .expect("ensure_class_compiled just compiled this class");
            let parent_obj = self.linker.classes().get(parent_obj_id).clone();
            (parent_obj.vtable, self.symtab.class(parent_id).vtable.clone())
        } else {
            (Vec::new(), AHashMap::new())
        };

        let methods = self.symtab.class(class_id).methods.clone();
        for &method in &methods {
            let stmt_id = self.symtab.function(method).body.expect("method has a body");
            let Stmt::FuncDecl(method_decl) = self.ast.stmt(stmt_id).clone() else {
                return Err(VenomError::semantic("vtable entry is not a method"));
            };
            let desc_id = self.compile_function(&method_decl)?;
            if let Some(&slot) = flat_names.get(&method_decl.name) {
                vtable[slot as usize] = desc_id;
            } else {
                let slot = u32::try_from(vtable.len()).expect("vtable overflow");
                vtable.push(desc_id);
                flat_names.insert(method_decl.name.clone(), slot);
            }
        }
        self.symtab.class_mut(class_id).vtable = flat_names.clone();

        let attr_count = self.symtab.class(class_id).attributes.len();
        let init_desc = flat_names.get("init").map(|&slot| vtable[slot as usize]);
        let obj = ClassObj {
            name: decl.name.clone(),
            attr_count,
            init_desc,
            release_desc: None,
            ctor_desc: None,
            vtable,
        };
        let id = self.linker.define_class(obj);
        self.compiled_classes.insert(class_id, id);
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn emit_stmt(&mut self, b: &mut CodeBuilder, frame: &mut Frame, scope: ScopeId, id: StmtId) -> VenomResult<()> {
        match self.ast.stmt(id).clone() {
            Stmt::ExprStmt(e) => {
                let kind = self.emit_expr(b, frame, scope, e)?;
                b.emit(pop_op(kind));
                Ok(())
            }
            Stmt::Assign { target, value } => self.emit_assign(b, frame, scope, target, value),
            Stmt::While { cond, body } => self.emit_while(b, frame, scope, cond, &body),
            Stmt::Return(value) => {
                if let Some(v) = value {
                    let kind = self.emit_expr(b, frame, scope, v)?;
                    b.emit(if kind == CellKind::Ref { Op::RetCellRef } else { Op::Ret });
                } else {
                    b.emit(Op::PushCellNil);
                    b.emit(Op::RetCellRef);
                }
                Ok(())
            }
            Stmt::FuncDecl(_) | Stmt::ClassDecl(_) => Ok(()),
        }
    }

    fn emit_while(&mut self, b: &mut CodeBuilder, frame: &mut Frame, scope: ScopeId, cond: ExprId, body: &[StmtId]) -> VenomResult<()> {
        let cond_t = self.infer_type(scope, cond)?;
        let cond_kind = self.cell_kind_of(cond_t);
        let head = b.new_label();
        let done = b.new_label();
        b.bind_label(head);
        let kind = self.emit_expr(b, frame, scope, cond)?;
        debug_assert_eq!(kind, cond_kind);
        b.emit(Op::BranchZ(cond_kind, done));
        for &s in body {
            self.emit_stmt(b, frame, scope, s)?;
        }
        b.emit(Op::Jump(head));
        b.bind_label(done);
        Ok(())
    }

    fn emit_assign(&mut self, b: &mut CodeBuilder, frame: &mut Frame, scope: ScopeId, target: ExprId, value: ExprId) -> VenomResult<()> {
        match self.ast.expr(target).clone() {
            Expr::Var(sym) => {
                let kind = self.emit_expr(b, frame, scope, value)?;
                let slot = frame.slot_of(sym, self.symtab);
                b.emit(Op::StoreLocal(kind, slot));
                Ok(())
            }
            Expr::AttrAccess { receiver, attr } => {
                let recv_t = self.infer_type(scope, receiver)?;
                let class = self.class_of(recv_t)?;
                let idx = self.attr_index(class, &attr)?;
                self.emit_expr(b, frame, scope, receiver)?;
                let kind = self.emit_expr(b, frame, scope, value)?;
                b.emit(Op::StoreAttr(kind, idx));
                Ok(())
            }
            _ => Err(VenomError::semantic("invalid assignment target")),
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    /// Emits `id` and returns the `CellKind` of the value it leaves on the
    /// stack.
    fn emit_expr(&mut self, b: &mut CodeBuilder, frame: &mut Frame, scope: ScopeId, id: ExprId) -> VenomResult<CellKind> {
        match self.ast.expr(id).clone() {
            Expr::IntLit(v) => {
                b.emit(Op::PushCellInt(v));
                Ok(CellKind::Int)
            }
            Expr::FloatLit(bits) => {
                b.emit(Op::PushCellFloat(bits));
                Ok(CellKind::Float)
            }
            Expr::BoolLit(v) => {
                b.emit(Op::PushCellBool(v));
                Ok(CellKind::Bool)
            }
            Expr::NilLit => {
                b.emit(Op::PushCellNil);
                Ok(CellKind::Ref)
            }
            Expr::StringLit(s) => {
                let idx = self.linker.intern_string(s);
                b.emit(Op::PushCellRef(idx));
                Ok(CellKind::Ref)
            }
            Expr::Name(name) => Err(VenomError::semantic(format!("unresolved name '{name}' reached codegen"))),
            Expr::Var(sym) => {
                let slot = frame.slot_of(sym, self.symtab);
                let ty = self.symtab.variable(sym).declared_type;
                let kind = self.cell_kind_of(ty);
                b.emit(Op::LoadLocal(kind, slot));
                Ok(kind)
            }
            Expr::UnOp(op, inner) => match op {
                AstUnOp::Neg => {
                    // No dedicated negate opcode exists; lower to `0 - x`.
                    // The zero constant is pushed before the operand so the
                    // stack ends up `[0, x]`, the order `BinOp::Sub` expects.
                    let operand_t = self.infer_type(scope, inner)?;
                    let kind = self.cell_kind_of(operand_t);
                    match kind {
                        CellKind::Int => b.emit(Op::PushCellInt(0)),
                        CellKind::Float => b.emit(Op::PushCellFloat(0f64.to_bits())),
                        _ => return Err(VenomError::semantic("unary '-' applied to a non-numeric value")),
                    }
                    let emitted = self.emit_expr(b, frame, scope, inner)?;
                    debug_assert_eq!(emitted, kind);
                    b.emit(Op::BinOp(ArithOp::Sub, kind));
                    Ok(kind)
                }
                AstUnOp::Not => {
                    let emitted = self.emit_expr(b, frame, scope, inner)?;
                    debug_assert_eq!(emitted, CellKind::Bool);
                    b.emit(Op::PushCellBool(true));
                    b.emit(Op::BinOp(ArithOp::Xor, CellKind::Bool));
                    Ok(CellKind::Bool)
                }
            },
            Expr::BinOp(op, lhs, rhs) => self.emit_binop(b, frame, scope, op, lhs, rhs),
            Expr::Call { callee, args } => self.emit_call(b, frame, scope, &callee, &args),
            Expr::MethodCall { receiver, method, args } => self.emit_method_call(b, frame, scope, receiver, &method, &args),
            Expr::AttrAccess { receiver, attr } => {
                let recv_t = self.infer_type(scope, receiver)?;
                let class = self.class_of(recv_t)?;
                let idx = self.attr_index(class, &attr)?;
                let attr_t = self.attr_type(class, &attr)?;
                let kind = self.cell_kind_of(attr_t);
                self.emit_expr(b, frame, scope, receiver)?;
                b.emit(Op::LoadAttr(kind, idx));
                Ok(kind)
            }
            Expr::New { class, type_args, args } => self.emit_new(b, frame, scope, &class, &type_args, &args),
        }
    }

    fn emit_binop(
        &mut self,
        b: &mut CodeBuilder,
        frame: &mut Frame,
        scope: ScopeId,
        op: AstBinOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> VenomResult<CellKind> {
        let lhs_kind = self.emit_expr(b, frame, scope, lhs)?;
        let rhs_kind = self.emit_expr(b, frame, scope, rhs)?;
        debug_assert_eq!(lhs_kind, rhs_kind, "emitter type mismatch on a binary operator");
        let arith = match op {
            AstBinOp::Add => ArithOp::Add,
            AstBinOp::Sub => ArithOp::Sub,
            AstBinOp::Mul => ArithOp::Mul,
            AstBinOp::Div => ArithOp::Div,
            AstBinOp::Mod => ArithOp::Mod,
            AstBinOp::And => ArithOp::And,
            AstBinOp::Or => ArithOp::Or,
            AstBinOp::Lt => ArithOp::CmpLt,
            AstBinOp::Le => ArithOp::CmpLe,
            AstBinOp::Gt => ArithOp::CmpGt,
            AstBinOp::Ge => ArithOp::CmpGe,
            AstBinOp::Eq => ArithOp::CmpEq,
            AstBinOp::Ne => ArithOp::CmpNe,
        };
        b.emit(Op::BinOp(arith, lhs_kind));
        Ok(match op {
            AstBinOp::Lt
            | AstBinOp::Le
            | AstBinOp::Gt
            | AstBinOp::Ge
            | AstBinOp::Eq
            | AstBinOp::Ne
            | AstBinOp::And
            | AstBinOp::Or => CellKind::Bool,
            AstBinOp::Add | AstBinOp::Sub | AstBinOp::Mul | AstBinOp::Div | AstBinOp::Mod => lhs_kind,
        })
    }

    fn emit_call(&mut self, b: &mut CodeBuilder, frame: &mut Frame, scope: ScopeId, callee: &str, args: &[ExprId]) -> VenomResult<CellKind> {
        if callee == "print" {
            for &a in args {
                self.emit_expr(b, frame, scope, a)?;
            }
            let print_id = self.ensure_print();
            b.emit(Op::Call(print_id, u32::try_from(args.len()).expect("arg count fits u32")));
            return Ok(CellKind::Ref);
        }

        let func = self
            .symtab
            .lookup_function(scope, callee, true)
            .ok_or_else(|| VenomError::semantic(format!("undefined function '{callee}' reached codegen")))?;
        let func_decl_stmt = self.symtab.function(func).body.expect("function has a body");
        let Stmt::FuncDecl(decl) = self.ast.stmt(func_decl_stmt).clone() else {
            return Err(VenomError::semantic("function symbol points at a non-function statement"));
        };

        // Each entry is a symbol from THIS caller's own scope (the original
        // captured variable, e.g. `a` in `outer`) — loading it resolves to a
        // slot already assigned within `frame`, not the callee's own
        // synthesized `__capture_*` parameter.
        if let Some(captures) = self.captures.get(&func).cloned() {
            for cap in captures {
                let slot = frame.slot_of(cap, self.symtab);
                let kind = self.cell_kind_of(self.symtab.variable(cap).declared_type);
                b.emit(Op::LoadLocal(kind, slot));
            }
        }
        for &a in args {
            self.emit_expr(b, frame, scope, a)?;
        }

        let desc_id = self.compile_function(&decl)?;
        let capture_count = self.captures.get(&func).map_or(0, Vec::len);
        let argc = u32::try_from(args.len() + capture_count).expect("arg count fits u32");
        b.emit(Op::Call(desc_id, argc));
        let ret = self.symtab.function(func).return_type;
        Ok(self.cell_kind_of(ret))
    }

    fn emit_method_call(
        &mut self,
        b: &mut CodeBuilder,
        frame: &mut Frame,
        scope: ScopeId,
        receiver: ExprId,
        method: &str,
        args: &[ExprId],
    ) -> VenomResult<CellKind> {
        let recv_t = self.infer_type(scope, receiver)?;
        let class = self.class_of(recv_t)?;
        self.ensure_class_compiled(class)?;
        let slot = self
            .resolve_vtable_slot(class, method)
            .ok_or_else(|| VenomError::semantic(format!("no method '{method}' in vtable")))?;
        let func = self.resolve_method_symbol(class, method).expect("slot resolved above");
        let ret = self.symtab.function(func).return_type;

        self.emit_expr(b, frame, scope, receiver)?;
        for &a in args {
            self.emit_expr(b, frame, scope, a)?;
        }
        b.emit(Op::CallVirtual(slot, u32::try_from(args.len()).expect("arg count fits u32")));
        Ok(self.cell_kind_of(ret))
    }

    fn emit_new(
        &mut self,
        b: &mut CodeBuilder,
        frame: &mut Frame,
        scope: ScopeId,
        class_name: &str,
        type_arg_names: &[String],
        args: &[ExprId],
    ) -> VenomResult<CellKind> {
        let class_id = self
            .symtab
            .lookup_class(scope, class_name, true)
            .ok_or_else(|| VenomError::semantic(format!("undefined class '{class_name}' reached codegen")))?;
        let _ = type_arg_names;
        let class_obj = self.ensure_class_compiled(class_id)?;
        b.emit(Op::AllocObj(class_obj));

        if let Some(init) = self.resolve_method_symbol(class_id, "init") {
            let slot = self.resolve_vtable_slot(class_id, "init").expect("just resolved");
            // The allocated reference is duplicated: one copy is consumed as
            // `init`'s receiver, the other remains as this expression's own
            // result.
            b.emit(Op::Incref);
            for &a in args {
                self.emit_expr(b, frame, scope, a)?;
            }
            b.emit(Op::CallVirtual(slot, u32::try_from(args.len()).expect("arg count fits u32")));
            let ret = self.symtab.function(init).return_type;
            b.emit(pop_op(self.cell_kind_of(ret)));
        }
        Ok(CellKind::Ref)
    }

    fn ensure_print(&mut self) -> FuncDescId {
        if let Some(id) = self.linker.funcs().lookup("print") {
            return id;
        }
        self.linker.define_func(FuncDesc {
            name: "print".into(),
            arg_count: 1,
            ref_arg_mask: 0,
            native: true,
            code: Vec::new(),
        })
    }

    // -----------------------------------------------------------------
    // Type / symbol resolution helpers (mirrors check.rs, self-contained)
    // -----------------------------------------------------------------

    fn cell_kind_of(&self, t: InstId) -> CellKind {
        let base = self.registry.inst_of(t).base;
        if base == self.registry.int_id {
            CellKind::Int
        } else if base == self.registry.float_id {
            CellKind::Float
        } else if base == self.registry.bool_id {
            CellKind::Bool
        } else {
            CellKind::Ref
        }
    }

    fn class_of(&self, t: InstId) -> VenomResult<ClassSymbolId> {
        let base = self.registry.inst_of(t).base;
        self.type_to_class
            .get(&base)
            .copied()
            .ok_or_else(|| VenomError::semantic("receiver is not a class type"))
    }

    /// Looks up the (already globally-flattened, see `check.rs`'s
    /// `total_attr_count`) storage index the checker assigned this
    /// attribute, walking up the parent chain when it is inherited.
    fn attr_index(&self, class: ClassSymbolId, name: &str) -> VenomResult<u32> {
        let class_sym = self.symtab.class(class);
        for &a in &class_sym.attributes {
            if self.symtab.variable(a).name == name {
                return match self.symtab.variable(a).storage {
                    StorageClass::ClassAttribute(idx) => Ok(idx),
                    _ => unreachable!("class attributes are always StorageClass::ClassAttribute"),
                };
            }
        }
        if let Some(&parent) = class_sym.parents.first() {
            return self.attr_index(parent, name);
        }
        Err(VenomError::semantic(format!("no attribute '{name}' on this class")))
    }

    fn attr_type(&self, class: ClassSymbolId, name: &str) -> VenomResult<InstId> {
        let class_sym = self.symtab.class(class);
        for &a in &class_sym.attributes {
            if self.symtab.variable(a).name == name {
                return Ok(self.symtab.variable(a).declared_type);
            }
        }
        if let Some(&parent) = class_sym.parents.first() {
            return self.attr_type(parent, name);
        }
        Err(VenomError::semantic(format!("no attribute '{name}' on this class")))
    }

    /// Finds the most-derived declaration of `name` starting at `class`,
    /// walking up the parent chain. Deliberately independent of the
    /// flattened vtable slot numbers (`resolve_vtable_slot`) — this class's
    /// own `methods` list only ever holds directly-declared methods, never
    /// inherited ones, so it is searched by name rather than indexed by
    /// slot.
    fn resolve_method_symbol(&self, class: ClassSymbolId, name: &str) -> Option<FuncSymbolId> {
        let class_sym = self.symtab.class(class);
        for &m in &class_sym.methods {
            if self.symtab.function(m).name == name {
                return Some(m);
            }
        }
        class_sym.parents.first().and_then(|&p| self.resolve_method_symbol(p, name))
    }

    /// The flattened dispatch slot for `name` on `class`, valid once
    /// `compile_class` has run for `class` (and, transitively, every
    /// ancestor). Unlike `resolve_method_symbol` this never needs to walk
    /// parents itself: `compile_class` already copied every inherited name
    /// into the class's own flattened map.
    fn resolve_vtable_slot(&self, class: ClassSymbolId, name: &str) -> Option<u32> {
        self.symtab.class(class).vtable.get(name).copied()
    }

    /// Re-derives an expression's static type from symbol declarations and
    /// scope, without relying on `Ast::static_types` (stale for lifted
    /// clones, which allocate fresh `ExprId`s with no recorded entry).
    fn infer_type(&mut self, scope: ScopeId, id: ExprId) -> VenomResult<InstId> {
        match self.ast.expr(id).clone() {
            Expr::IntLit(_) => Ok(self.registry.instantiate(self.registry.int_id, vec![]).unwrap()),
            Expr::FloatLit(_) => Ok(self.registry.instantiate(self.registry.float_id, vec![]).unwrap()),
            Expr::BoolLit(_) => Ok(self.registry.instantiate(self.registry.bool_id, vec![]).unwrap()),
            Expr::StringLit(_) => Ok(self.registry.instantiate(self.registry.string_id, vec![]).unwrap()),
            Expr::NilLit => Ok(self.registry.instantiate(self.registry.object_id, vec![]).unwrap()),
            Expr::Name(name) => Err(VenomError::semantic(format!("unresolved name '{name}' reached codegen"))),
            Expr::Var(sym) => Ok(self.symtab.variable(sym).declared_type),
            Expr::UnOp(op, inner) => match op {
                AstUnOp::Neg => self.infer_type(scope, inner),
                AstUnOp::Not => Ok(self.registry.instantiate(self.registry.bool_id, vec![]).unwrap()),
            },
            Expr::BinOp(op, lhs, rhs) => match op {
                AstBinOp::Lt
                | AstBinOp::Le
                | AstBinOp::Gt
                | AstBinOp::Ge
                | AstBinOp::Eq
                | AstBinOp::Ne
                | AstBinOp::And
                | AstBinOp::Or => Ok(self.registry.instantiate(self.registry.bool_id, vec![]).unwrap()),
                _ => self.infer_type(scope, lhs),
            },
            Expr::Call { callee, .. } => {
                if callee == "print" {
                    return Ok(self.registry.instantiate(self.registry.object_id, vec![]).unwrap());
                }
                let func = self
                    .symtab
                    .lookup_function(scope, &callee, true)
                    .ok_or_else(|| VenomError::semantic(format!("undefined function '{callee}' reached codegen")))?;
                Ok(self.symtab.function(func).return_type)
            }
            Expr::MethodCall { receiver, method, .. } => {
                let recv_t = self.infer_type(scope, receiver)?;
                let class = self.class_of(recv_t)?;
                let func = self
                    .resolve_method_symbol(class, &method)
                    .ok_or_else(|| VenomError::semantic(format!("no method '{method}' reached codegen")))?;
                Ok(self.symtab.function(func).return_type)
            }
            Expr::AttrAccess { receiver, attr } => {
                let recv_t = self.infer_type(scope, receiver)?;
                let class = self.class_of(recv_t)?;
                self.attr_type(class, &attr)
            }
            Expr::New { class, type_args, .. } => {
                let class_id = self
                    .symtab
                    .lookup_class(scope, &class, true)
                    .ok_or_else(|| VenomError::semantic(format!("undefined class '{class}' reached codegen")))?;
                let resolved_args: Vec<InstId> = type_args
                    .iter()
                    .map(|n| self.resolve_type_name(n))
                    .collect::<VenomResult<_>>()?;
                let type_id = self.symtab.class(class_id).type_id;
                self.registry
                    .instantiate(type_id, resolved_args)
                    .map_err(|e| VenomError::semantic(e.to_string()))
            }
        }
    }

    fn resolve_type_name(&mut self, name: &str) -> VenomResult<InstId> {
        let type_id = self
            .registry
            .lookup(name)
            .ok_or_else(|| VenomError::semantic(format!("unknown type '{name}'")))?;
        self.registry
            .instantiate(type_id, Vec::new())
            .map_err(|e| VenomError::semantic(format!("'{name}': {e}")))
    }
}

fn pop_op(kind: CellKind) -> Op {
    if kind == CellKind::Ref {
        Op::PopCellRef
    } else {
        Op::PopCell
    }
}

fn ref_arg_mask(params: &[VarSymbolId], symtab: &SymbolTable, registry: &TypeRegistry) -> u64 {
    let mut mask = 0u64;
    for (i, &p) in params.iter().enumerate().take(64) {
        let ty = symtab.variable(p).declared_type;
        let base = registry.inst_of(ty).base;
        let is_ref = base != registry.int_id && base != registry.float_id && base != registry.bool_id;
        if is_ref {
            mask |= 1 << i;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use crate::io::CollectPrint;
    use crate::pipeline::run;

    /// spec.md §8 scenario 5: a nested function capturing an outer local.
    /// Regression test for the closure-lifting capture-symbol/slot bug —
    /// `inner`'s captured `a` must be loaded from `outer`'s own frame at the
    /// call site, not confused with `inner`'s own synthesized parameter.
    #[test]
    fn nested_closure_reads_the_captured_outer_local() {
        let mut out = CollectPrint::default();
        let src = "def outer()->Int: a = 10; def inner()->Int: return a+1; end; return inner(); end; print(outer())";
        run(src, &mut out).unwrap();
        assert_eq!(out.joined(), "11");
    }

    /// Regression test for the generic-function-body-never-checked bug: a
    /// generic top-level function's body must be name/type-checked (and
    /// therefore compile and run) exactly like a non-generic one's.
    #[test]
    fn generic_function_call_executes_without_an_unresolved_name_error() {
        let mut out = CollectPrint::default();
        let src = r#"def identity{T}(x: T)->T: return x; end; print(identity("hi"))"#;
        run(src, &mut out).unwrap();
        assert_eq!(out.joined(), "hi");
    }

    #[test]
    fn two_captures_and_an_own_parameter_do_not_collide_on_a_slot() {
        let mut out = CollectPrint::default();
        let src = "def outer()->Int: a = 1; b = 2; def inner(y: Int)->Int: return a+b+y; end; return inner(10); end; print(outer())";
        run(src, &mut out).unwrap();
        assert_eq!(out.joined(), "13");
    }
}
