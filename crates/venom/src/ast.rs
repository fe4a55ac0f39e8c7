//! Polymorphic AST: a sum over statement/expression kinds, uniform
//! traversal by child index, and three structural clone modes.
//!
//! Nodes live in flat arenas (`Ast::stmts` / `Ast::exprs`) and are addressed
//! by `StmtId` / `ExprId` handles rather than owned pointers, matching
//! spec.md §9's direction to express back-references as indices into an
//! arena rather than a deep inheritance hierarchy. Attributes attached by
//! later passes (resolved symbol, bound function, static type) live in
//! parallel side tables keyed by the same handles, not on the node itself.

use ahash::AHashMap;

use crate::symbol::{BoundFunction, ClassSymbolId, FuncSymbolId, VarSymbolId};
use crate::types::InstId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    FloatLit(u64), // bit pattern, so `Expr` stays `Eq`-comparable for template dedup
    BoolLit(bool),
    NilLit,
    StringLit(String),
    /// An unresolved identifier reference, as produced by the parser.
    Name(String),
    /// A resolved variable reference, produced by the name pass.
    Var(VarSymbolId),
    UnOp(UnOp, ExprId),
    BinOp(BinOp, ExprId, ExprId),
    /// A call to a free function, resolved to `BoundFunction` during type
    /// checking (stored in `Ast::bound_functions`, keyed by this node).
    Call { callee: String, args: Vec<ExprId> },
    /// A method call on a receiver, e.g. `b.get()`.
    MethodCall {
        receiver: ExprId,
        method: String,
        args: Vec<ExprId>,
    },
    /// Attribute read, e.g. `self.v`.
    AttrAccess { receiver: ExprId, attr: String },
    /// `ClassName{typeargs}.new(args)`. Type arguments stay as source-level
    /// names (like `Param::declared_type_name`) until the checker resolves
    /// them against whatever type-parameter environment is in scope for
    /// this clone (see `CloneMode::Template`'s doc comment).
    New {
        class: String,
        type_args: Vec<String>,
        args: Vec<ExprId>,
    },
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub declared_type_name: String,
    pub symbol: Option<VarSymbolId>,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type_name: String,
    pub type_params: Vec<String>,
    pub body: Vec<StmtId>,
    pub symbol: Option<FuncSymbolId>,
}

#[derive(Debug, Clone)]
pub struct AttrDecl {
    pub name: String,
    pub declared_type_name: String,
    pub symbol: Option<VarSymbolId>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<String>,
    pub type_params: Vec<String>,
    pub attrs: Vec<AttrDecl>,
    pub methods: Vec<StmtId>,
    pub symbol: Option<ClassSymbolId>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    ExprStmt(ExprId),
    /// Both first-assignment-as-declaration and plain reassignment; the
    /// name pass decides which by whether `target` already resolves in the
    /// current scope.
    Assign { target: ExprId, value: ExprId },
    While { cond: ExprId, body: Vec<StmtId> },
    Return(Option<ExprId>),
    FuncDecl(FuncDecl),
    ClassDecl(ClassDecl),
}

/// Substitution carried by a clone. `Semantic` performs no substitution and
/// is a defensive copy before a destructive pass. `Template` produces an
/// unresolved duplicate of a generic definition's body — resolved symbols
/// revert to plain names so a fresh name+type pass can re-bind them against
/// the concrete type-parameter environment bound for this specialization
/// (the "substitution" spec.md §4.3 describes is applied by that re-run of
/// the checker, not by this clone). `Lift` retargets non-local variable
/// references per `crate::lift::LiftMap`.
pub enum CloneMode<'a> {
    Semantic,
    Template,
    Lift(&'a crate::lift::LiftMap),
}

/// Owns every statement/expression node created during one compilation,
/// plus the attribute tables later passes fill in by `ExprId`.
#[derive(Default)]
pub struct Ast {
    stmts: Vec<Stmt>,
    exprs: Vec<Expr>,
    pub static_types: Vec<Option<InstId>>,
    pub bound_functions: AHashMap<ExprId, BoundFunction>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(u32::try_from(self.stmts.len()).expect("statement arena overflow"));
        self.stmts.push(stmt);
        id
    }

    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(u32::try_from(self.exprs.len()).expect("expression arena overflow"));
        self.exprs.push(expr);
        self.static_types.push(None);
        id
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn set_static_type(&mut self, id: ExprId, ty: InstId) {
        self.static_types[id.0 as usize] = Some(ty);
    }

    pub fn static_type(&self, id: ExprId) -> Option<InstId> {
        self.static_types[id.0 as usize]
    }

    /// `true` when traversing child expressions of `stmt` enters a fresh
    /// lexical scope (function and class bodies; loop bodies do not, in
    /// Venom — a `while` body shares its enclosing function's scope).
    pub fn needs_new_scope(stmt: &Stmt) -> bool {
        matches!(stmt, Stmt::FuncDecl(_) | Stmt::ClassDecl(_))
    }

    /// Clones a single expression subtree per `mode`, returning a fresh
    /// `ExprId` that shares no mutable node with the original (it may share
    /// interned types/symbols reachable only by value, e.g. `InstId`).
    /// `symtab` is only consulted by `CloneMode::Template`, to recover a
    /// resolved `Var`'s original name so the clone can be re-resolved fresh.
    pub fn clone_expr(&mut self, id: ExprId, mode: &CloneMode<'_>, symtab: &crate::symbol::SymbolTable) -> ExprId {
        let cloned = match self.expr(id).clone() {
            Expr::Var(sym) => match mode {
                CloneMode::Lift(map) => Expr::Var(map.retarget(sym)),
                CloneMode::Template => Expr::Name(symtab.variable(sym).name.clone()),
                CloneMode::Semantic => Expr::Var(sym),
            },
            Expr::UnOp(op, inner) => Expr::UnOp(op, self.clone_expr(inner, mode, symtab)),
            Expr::BinOp(op, lhs, rhs) => {
                let lhs = self.clone_expr(lhs, mode, symtab);
                let rhs = self.clone_expr(rhs, mode, symtab);
                Expr::BinOp(op, lhs, rhs)
            }
            Expr::Call { callee, args } => {
                let args = args.iter().map(|&a| self.clone_expr(a, mode, symtab)).collect();
                Expr::Call { callee, args }
            }
            Expr::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.clone_expr(receiver, mode, symtab);
                let args = args.iter().map(|&a| self.clone_expr(a, mode, symtab)).collect();
                Expr::MethodCall {
                    receiver,
                    method,
                    args,
                }
            }
            Expr::AttrAccess { receiver, attr } => {
                let receiver = self.clone_expr(receiver, mode, symtab);
                Expr::AttrAccess { receiver, attr }
            }
            Expr::New {
                class,
                type_args,
                args,
            } => {
                let args = args.iter().map(|&a| self.clone_expr(a, mode, symtab)).collect();
                Expr::New {
                    class,
                    type_args,
                    args,
                }
            }
            leaf => leaf,
        };
        self.alloc_expr(cloned)
    }

    /// Clones a statement subtree (and transitively its nested
    /// statements/expressions) per `mode`.
    pub fn clone_stmt(&mut self, id: StmtId, mode: &CloneMode<'_>, symtab: &crate::symbol::SymbolTable) -> StmtId {
        let cloned = match self.stmt(id).clone() {
            Stmt::ExprStmt(e) => Stmt::ExprStmt(self.clone_expr(e, mode, symtab)),
            Stmt::Assign { target, value } => Stmt::Assign {
                target: self.clone_expr(target, mode, symtab),
                value: self.clone_expr(value, mode, symtab),
            },
            Stmt::While { cond, body } => {
                let cond = self.clone_expr(cond, mode, symtab);
                let body = body.iter().map(|&s| self.clone_stmt(s, mode, symtab)).collect();
                Stmt::While { cond, body }
            }
            Stmt::Return(e) => Stmt::Return(e.map(|e| self.clone_expr(e, mode, symtab))),
            Stmt::FuncDecl(mut f) => {
                f.symbol = None;
                f.body = f.body.iter().map(|&s| self.clone_stmt(s, mode, symtab)).collect();
                Stmt::FuncDecl(f)
            }
            Stmt::ClassDecl(mut c) => {
                c.symbol = None;
                c.methods = c
                    .methods
                    .iter()
                    .map(|&s| self.clone_stmt(s, mode, symtab))
                    .collect();
                Stmt::ClassDecl(c)
            }
        };
        self.alloc_stmt(cloned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_clone_is_independent_of_the_original() {
        let mut ast = Ast::new();
        let one = ast.alloc_expr(Expr::IntLit(1));
        let two = ast.alloc_expr(Expr::IntLit(2));
        let sum = ast.alloc_expr(Expr::BinOp(BinOp::Add, one, two));
        let symtab = crate::symbol::SymbolTable::new();
        let cloned = ast.clone_expr(sum, &CloneMode::Semantic, &symtab);
        assert_ne!(cloned, sum);
        // Mutating the clone must not change the original subtree.
        *ast.expr_mut(cloned) = Expr::IntLit(99);
        assert!(matches!(ast.expr(sum), Expr::BinOp(BinOp::Add, _, _)));
    }

    #[test]
    fn needs_new_scope_only_for_func_and_class() {
        let func = Stmt::FuncDecl(FuncDecl {
            name: "f".into(),
            params: vec![],
            return_type_name: "Void".into(),
            type_params: vec![],
            body: vec![],
            symbol: None,
        });
        assert!(Ast::needs_new_scope(&func));
        let ret = Stmt::Return(None);
        assert!(!Ast::needs_new_scope(&ret));
    }
}
