//! Closure-lifting transform: rewrites nested functions that reference
//! non-local variables into top-level functions whose captured variables
//! become explicit leading parameters.
//!
//! Grounded on the same idea `function.rs`'s `free_var_enclosing_slots` /
//! `cell_var_count` / `cell_param_indices` fields encode for closures in
//! general: a captured variable becomes an explicit extra parameter/cell
//! slot rather than an implicit environment pointer.

use ahash::AHashMap;

use crate::ast::{Ast, CloneMode, Expr, FuncDecl, Stmt, StmtId};
use crate::symbol::{FuncSymbolId, ScopeId, SymbolTable, VarSymbolId};

/// Maps an original (captured) symbol identity to the rewritten parameter
/// symbol it now refers to inside a lifted function body.
#[derive(Default, Clone)]
pub struct LiftMap(AHashMap<VarSymbolId, VarSymbolId>);

impl LiftMap {
    pub fn extend(&self, captures: &[VarSymbolId], new_params: &[VarSymbolId]) -> Self {
        let mut map = self.0.clone();
        for (&from, &to) in captures.iter().zip(new_params) {
            map.insert(from, to);
        }
        Self(map)
    }

    pub fn retarget(&self, sym: VarSymbolId) -> VarSymbolId {
        self.0.get(&sym).copied().unwrap_or(sym)
    }
}

/// Threaded through one run of the lift transform.
pub struct LiftContext {
    /// The surrounding module's top-level scope; rewritten functions are
    /// registered here, flattening out nesting.
    pub lift_into: ScopeId,
    /// The symbol currently being lifted, if any (used for diagnostics and
    /// to detect self-recursive capture references).
    pub cur_lift_sym: Option<FuncSymbolId>,
    pub map: LiftMap,
}

impl LiftContext {
    pub fn new(lift_into: ScopeId) -> Self {
        Self {
            lift_into,
            cur_lift_sym: None,
            map: LiftMap::default(),
        }
    }
}

/// The capture set of a nested function: its non-local references, plus
/// transitively the capture sets of any nested functions it itself defines.
/// Order is first-occurrence, deduplicated — this becomes the prefix of the
/// rewritten parameter list, so it must be stable across repeated runs
/// (lifting idempotence, spec.md §8 invariant 4).
pub fn compute_capture_set(
    ast: &Ast,
    symtab: &SymbolTable,
    own_scope: ScopeId,
    body: &[StmtId],
) -> Vec<VarSymbolId> {
    let mut seen = Vec::new();
    for &s in body {
        collect_stmt(ast, symtab, own_scope, s, &mut seen);
    }
    seen
}

fn push_unique(seen: &mut Vec<VarSymbolId>, sym: VarSymbolId) {
    if !seen.contains(&sym) {
        seen.push(sym);
    }
}

fn collect_stmt(
    ast: &Ast,
    symtab: &SymbolTable,
    own_scope: ScopeId,
    id: StmtId,
    seen: &mut Vec<VarSymbolId>,
) {
    match ast.stmt(id) {
        Stmt::ExprStmt(e) => collect_expr(ast, symtab, own_scope, *e, seen),
        Stmt::Assign { target, value } => {
            collect_expr(ast, symtab, own_scope, *target, seen);
            collect_expr(ast, symtab, own_scope, *value, seen);
        }
        Stmt::While { cond, body } => {
            collect_expr(ast, symtab, own_scope, *cond, seen);
            for &s in body {
                collect_stmt(ast, symtab, own_scope, s, seen);
            }
        }
        Stmt::Return(e) => {
            if let Some(e) = e {
                collect_expr(ast, symtab, own_scope, *e, seen);
            }
        }
        Stmt::FuncDecl(f) => {
            // Type-parameterized (not yet instantiated) sub-definitions are
            // skipped; they are lifted lazily on each materialization.
            if f.type_params.is_empty() {
                for &s in &f.body {
                    collect_stmt(ast, symtab, own_scope, s, seen);
                }
            }
        }
        Stmt::ClassDecl(c) => {
            for &m in &c.methods {
                collect_stmt(ast, symtab, own_scope, m, seen);
            }
        }
    }
}

fn collect_expr(
    ast: &Ast,
    symtab: &SymbolTable,
    own_scope: ScopeId,
    id: crate::ast::ExprId,
    seen: &mut Vec<VarSymbolId>,
) {
    match ast.expr(id) {
        Expr::Var(sym) => {
            if symtab.scope_of(*sym) != own_scope {
                push_unique(seen, *sym);
            }
        }
        Expr::UnOp(_, inner) => collect_expr(ast, symtab, own_scope, *inner, seen),
        Expr::BinOp(_, lhs, rhs) => {
            collect_expr(ast, symtab, own_scope, *lhs, seen);
            collect_expr(ast, symtab, own_scope, *rhs, seen);
        }
        Expr::Call { args, .. } => {
            for &a in args {
                collect_expr(ast, symtab, own_scope, a, seen);
            }
        }
        Expr::MethodCall { receiver, args, .. } => {
            collect_expr(ast, symtab, own_scope, *receiver, seen);
            for &a in args {
                collect_expr(ast, symtab, own_scope, a, seen);
            }
        }
        Expr::AttrAccess { receiver, .. } => collect_expr(ast, symtab, own_scope, *receiver, seen),
        Expr::New { args, .. } => {
            for &a in args {
                collect_expr(ast, symtab, own_scope, a, seen);
            }
        }
        Expr::IntLit(_)
        | Expr::FloatLit(_)
        | Expr::BoolLit(_)
        | Expr::NilLit
        | Expr::StringLit(_)
        | Expr::Name(_) => {}
    }
}

/// Outcome of lifting one function declaration: the function's new home
/// scope always becomes `lift_into`; `captures` records, in order, the
/// ORIGINAL (pre-rename) symbols the caller must load to build the
/// capture-prefix argument list at each call site — not the synthesized
/// `__capture_*` parameters those values are bound to inside the lifted
/// body. Empty when the function had no non-local references (lifted
/// unchanged).
pub struct LiftedFunction {
    pub func: FuncSymbolId,
    pub captures: Vec<VarSymbolId>,
}

/// Applies step 1 of the transform algorithm to one function declaration
/// node already present in `ast`/`symtab`. Type-parameterized functions are
/// left untouched (skipped; lifted lazily on each materialization).
pub fn lift_function_decl(
    ast: &mut Ast,
    symtab: &mut SymbolTable,
    ctx: &mut LiftContext,
    own_scope: ScopeId,
    stmt_id: StmtId,
    func: FuncSymbolId,
    decl: &FuncDecl,
) -> LiftedFunction {
    if !decl.type_params.is_empty() {
        return LiftedFunction {
            func,
            captures: Vec::new(),
        };
    }

    let captures = compute_capture_set(ast, symtab, own_scope, &decl.body);
    if captures.is_empty() {
        return LiftedFunction {
            func,
            captures: Vec::new(),
        };
    }

    ctx.cur_lift_sym = Some(func);
    let new_params: Vec<VarSymbolId> = captures
        .iter()
        .map(|&orig| {
            let orig_sym = symtab.variable(orig).clone();
            symtab
                .define_variable(
                    ctx.lift_into,
                    &format!("__capture_{}", orig_sym.name),
                    orig_sym.declared_type,
                    crate::symbol::StorageClass::Unassigned,
                )
                .expect("synthesized capture parameter name is unique")
        })
        .collect();

    let extended = ctx.map.extend(&captures, &new_params);
    let mode = CloneMode::Lift(&extended);
    let new_body: Vec<StmtId> = decl
        .body
        .iter()
        .map(|&s| ast.clone_stmt(s, &mode, symtab))
        .collect();

    {
        let f = symtab.function_mut(func);
        let mut params = new_params.clone();
        params.extend_from_slice(&f.params);
        f.params = params;
    }

    // The clone above produced a fresh body with captured references
    // retargeted to the new leading parameters; write it back onto the
    // original declaration so later passes (codegen) compile the rewritten
    // version rather than the stale pre-lift one.
    if let Stmt::FuncDecl(d) = ast.stmt_mut(stmt_id) {
        d.body = new_body;
    }

    LiftedFunction { func, captures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::StorageClass;
    use crate::types::TypeRegistry;

    #[test]
    fn non_local_reference_is_captured() {
        let mut reg = TypeRegistry::new();
        let mut symtab = SymbolTable::new();
        let mut ast = Ast::new();

        let outer_scope = symtab.root_scope();
        let int_t = reg.instantiate(reg.int_id, vec![]).unwrap();
        let a = symtab
            .define_variable(outer_scope, "a", int_t, StorageClass::Local(0))
            .unwrap();

        let inner_scope = symtab.new_child_scope(outer_scope);
        let a_ref = ast.alloc_expr(Expr::Var(a));
        let body = vec![ast.alloc_stmt(Stmt::Return(Some(a_ref)))];

        let captures = compute_capture_set(&ast, &symtab, inner_scope, &body);
        assert_eq!(captures, vec![a]);
    }

    #[test]
    fn lifting_a_function_with_no_captures_is_a_no_op() {
        let mut reg = TypeRegistry::new();
        let mut symtab = SymbolTable::new();
        let mut ast = Ast::new();
        let scope = symtab.root_scope();
        let int_t = reg.instantiate(reg.int_id, vec![]).unwrap();
        let x = symtab
            .define_variable(scope, "x", int_t, StorageClass::Parameter(0))
            .unwrap();
        let x_ref = ast.alloc_expr(Expr::Var(x));
        let body = vec![ast.alloc_stmt(Stmt::Return(Some(x_ref)))];
        let func = symtab
            .define_function(
                scope,
                "f",
                crate::symbol::FuncSymbol {
                    name: "f".into(),
                    params: vec![x],
                    return_type: int_t,
                    type_params: vec![],
                    enclosing_class: None,
                    body_scope: scope,
                    body: None,
                    specializations: ahash::AHashMap::new(),
                },
            )
            .unwrap();
        let decl = FuncDecl {
            name: "f".into(),
            params: vec![],
            return_type_name: "Int".into(),
            type_params: vec![],
            body,
            symbol: Some(func),
        };
        let stmt_id = ast.alloc_stmt(Stmt::FuncDecl(decl.clone()));
        let mut ctx = LiftContext::new(scope);
        let lifted = lift_function_decl(&mut ast, &mut symtab, &mut ctx, scope, stmt_id, func, &decl);
        assert!(lifted.captures.is_empty());
    }

    #[test]
    fn lifted_captures_are_the_original_symbols_not_the_synthesized_params() {
        let mut reg = TypeRegistry::new();
        let mut symtab = SymbolTable::new();
        let mut ast = Ast::new();

        let outer_scope = symtab.root_scope();
        let int_t = reg.instantiate(reg.int_id, vec![]).unwrap();
        let a = symtab
            .define_variable(outer_scope, "a", int_t, StorageClass::Local(0))
            .unwrap();

        let inner_scope = symtab.new_child_scope(outer_scope);
        let a_ref = ast.alloc_expr(Expr::Var(a));
        let body = vec![ast.alloc_stmt(Stmt::Return(Some(a_ref)))];
        let func = symtab
            .define_function(
                inner_scope,
                "inner",
                crate::symbol::FuncSymbol {
                    name: "inner".into(),
                    params: vec![],
                    return_type: int_t,
                    type_params: vec![],
                    enclosing_class: None,
                    body_scope: inner_scope,
                    body: None,
                    specializations: ahash::AHashMap::new(),
                },
            )
            .unwrap();
        let decl = FuncDecl {
            name: "inner".into(),
            params: vec![],
            return_type_name: "Int".into(),
            type_params: vec![],
            body,
            symbol: Some(func),
        };
        let stmt_id = ast.alloc_stmt(Stmt::FuncDecl(decl.clone()));
        let mut ctx = LiftContext::new(outer_scope);
        let lifted = lift_function_decl(&mut ast, &mut symtab, &mut ctx, inner_scope, stmt_id, func, &decl);

        // The caller (`outer`) needs to know to load `a` at the call site;
        // the synthesized `__capture_a` parameter only makes sense inside
        // `inner`'s own rewritten body.
        assert_eq!(lifted.captures, vec![a]);
        assert_ne!(symtab.function(func).params, vec![a]);
    }
}
