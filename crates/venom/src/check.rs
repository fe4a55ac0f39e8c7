//! Semantic & type checker: two passes over the parsed AST.
//!
//! Pass 1 (name pass) builds the symbol table for statically-known
//! declarations (functions, classes, their parameters and attributes) and
//! recurses into nested scopes. Pass 2 (type pass) computes every
//! expression's `staticType`, resolves plain-assignment variable
//! declarations (Venom has no `var` keyword — see the Open Question
//! decision in DESIGN.md), instantiates generics at call sites, and records
//! each call's `BoundFunction`.

use ahash::AHashMap;

use crate::ast::{Ast, BinOp as AstBinOp, ClassDecl, Expr, ExprId, FuncDecl, Stmt, StmtId, UnOp as AstUnOp};
use crate::error::{VenomError, VenomResult};
use crate::symbol::{
    BoundFunction, ClassSymbol, ClassSymbolId, FuncSymbol, ScopeId, StorageClass, SymbolTable,
};
use crate::types::{InstId, TypeId, TypeRegistry};

pub struct Checker<'a> {
    pub registry: &'a mut TypeRegistry,
    pub symtab: &'a mut SymbolTable,
    pub ast: &'a mut Ast,
    /// Reverse lookup from a class's nominal `TypeId` back to its
    /// `ClassSymbol`, populated as classes are declared.
    class_by_type: AHashMap<TypeId, ClassSymbolId>,
    /// Stack of type-parameter environments (name -> bound `InstId`),
    /// pushed while checking a generic definition's own declaration/body
    /// and popped on exit. Innermost frame wins.
    type_param_env: Vec<AHashMap<String, InstId>>,
}

impl<'a> Checker<'a> {
    pub fn new(registry: &'a mut TypeRegistry, symtab: &'a mut SymbolTable, ast: &'a mut Ast) -> Self {
        Self {
            registry,
            symtab,
            ast,
            class_by_type: AHashMap::new(),
            type_param_env: Vec::new(),
        }
    }

    /// Runs both passes over a module's top-level statement list.
    pub fn check_module(&mut self, stmts: &[StmtId]) -> VenomResult<()> {
        let root = self.symtab.root_scope();
        self.name_pass(root, stmts)?;
        self.type_pass(root, stmts)?;
        Ok(())
    }

    fn resolve_type_name(&mut self, name: &str) -> VenomResult<InstId> {
        for frame in self.type_param_env.iter().rev() {
            if let Some(&bound) = frame.get(name) {
                return Ok(bound);
            }
        }
        let type_id = self
            .registry
            .lookup(name)
            .ok_or_else(|| VenomError::semantic(format!("unknown type '{name}'")))?;
        self.registry
            .instantiate(type_id, Vec::new())
            .map_err(|e| VenomError::semantic(format!("'{name}': {e}")))
    }

    // ---------------------------------------------------------------
    // Name pass
    // ---------------------------------------------------------------

    fn name_pass(&mut self, scope: ScopeId, stmts: &[StmtId]) -> VenomResult<()> {
        for &id in stmts {
            self.name_pass_stmt(scope, id)?;
        }
        Ok(())
    }

    fn name_pass_stmt(&mut self, scope: ScopeId, id: StmtId) -> VenomResult<()> {
        match self.ast.stmt(id).clone() {
            Stmt::FuncDecl(decl) => self.name_pass_func(scope, id, &decl, None, None),
            Stmt::ClassDecl(decl) => self.name_pass_class(scope, id, &decl),
            Stmt::While { body, .. } => self.name_pass(scope, &body),
            Stmt::ExprStmt(_) | Stmt::Assign { .. } | Stmt::Return(_) => Ok(()),
        }
    }

    fn name_pass_func(
        &mut self,
        scope: ScopeId,
        stmt_id: StmtId,
        decl: &FuncDecl,
        enclosing_class: Option<ClassSymbolId>,
        self_type: Option<InstId>,
    ) -> VenomResult<()> {
        let mut env = AHashMap::new();
        for tp in &decl.type_params {
            let type_id = self
                .registry
                .create_type(&mangled_type_param(stmt_id, tp), 0, vec![self.registry.object_id])
                .map_err(|e| VenomError::semantic(format!("{}: {e}", decl.name)))?;
            let inst = self
                .registry
                .instantiate(type_id, Vec::new())
                .expect("arity-0 instantiation always succeeds");
            env.insert(tp.clone(), inst);
        }
        self.type_param_env.push(env);

        let body_scope = self.symtab.new_child_scope(scope);
        let mut params = Vec::new();
        // `self` is always parameter 0 of a method, matching the calling
        // convention `CALL_VIRTUAL` uses (receiver pushed ahead of the
        // explicit arguments) and spec.md §4.5 point 3's treatment of
        // `self` as a captured-as-parameter value.
        if let Some(self_ty) = self_type {
            let sym = self
                .symtab
                .define_variable(body_scope, "self", self_ty, StorageClass::Parameter(0))
                .map_err(VenomError::semantic)?;
            params.push(sym);
        }
        for p in &decl.params {
            let ty = self.resolve_type_name(&p.declared_type_name)?;
            let idx = u32::try_from(params.len()).expect("parameter count overflow");
            let sym = self
                .symtab
                .define_variable(body_scope, &p.name, ty, StorageClass::Parameter(idx))
                .map_err(VenomError::semantic)?;
            params.push(sym);
        }
        let return_type = self.resolve_type_name(&decl.return_type_name)?;
        let type_params: Vec<InstId> = decl
            .type_params
            .iter()
            .map(|tp| self.type_param_env.last().expect("pushed above")[tp])
            .collect();

        let func = FuncSymbol {
            name: decl.name.clone(),
            params,
            return_type,
            type_params,
            enclosing_class,
            body_scope,
            body: Some(stmt_id),
            specializations: AHashMap::new(),
        };
        let func_id = self
            .symtab
            .define_function(scope, &decl.name, func)
            .map_err(VenomError::semantic)?;

        // Checked once against the placeholder types bound above, generic
        // or not; this codebase compiles a generic body exactly once (see
        // DESIGN.md's generics-simplification note) and never re-specializes
        // it per call site, so there is no later pass that picks up a
        // skipped body.
        self.name_pass(body_scope, &decl.body)?;
        self.type_param_env.pop();

        if let Stmt::FuncDecl(d) = self.ast.stmt_mut(stmt_id) {
            d.symbol = Some(func_id);
        }
        Ok(())
    }

    fn name_pass_class(&mut self, scope: ScopeId, stmt_id: StmtId, decl: &ClassDecl) -> VenomResult<()> {
        let mut env = AHashMap::new();
        for tp in &decl.type_params {
            let type_id = self
                .registry
                .create_type(&mangled_type_param(stmt_id, tp), 0, vec![self.registry.object_id])
                .map_err(VenomError::semantic)?;
            let inst = self
                .registry
                .instantiate(type_id, Vec::new())
                .expect("arity-0 instantiation always succeeds");
            env.insert(tp.clone(), inst);
        }
        self.type_param_env.push(env);

        let parent_class = match &decl.parent {
            Some(name) => Some(
                self.symtab
                    .lookup_class(scope, name, true)
                    .ok_or_else(|| VenomError::semantic(format!("undefined parent class '{name}'")))?,
            ),
            None => None,
        };
        let parent_type = parent_class.map(|c| self.class_type_id(c));

        let arity = decl.type_params.len();
        let class_type_id = self
            .registry
            .create_type(
                &decl.name,
                arity,
                parent_type.map_or_else(|| vec![self.registry.object_id], |p| vec![p]),
            )
            .map_err(VenomError::semantic)?;

        let class_scope = self.symtab.new_child_scope(scope);
        // Attribute indices are global across the inheritance chain, not
        // class-local: a subclass's heap layout is the parent's attrs
        // followed by its own, so a method inherited unmodified from the
        // parent still finds `self.v` at the index it was compiled against.
        let base = parent_class.map_or(0, |p| self.total_attr_count(p));
        let mut attrs = Vec::new();
        for a in &decl.attrs {
            let ty = self.resolve_type_name(&a.declared_type_name)?;
            let idx = base + u32::try_from(attrs.len()).expect("attribute count overflow");
            let sym = self
                .symtab
                .define_variable(class_scope, &a.name, ty, StorageClass::ClassAttribute(idx))
                .map_err(VenomError::semantic)?;
            attrs.push(sym);
        }

        let class_sym = ClassSymbol {
            name: decl.name.clone(),
            type_id: class_type_id,
            parents: parent_class.into_iter().collect(),
            type_params: decl
                .type_params
                .iter()
                .map(|tp| self.type_param_env.last().expect("pushed above")[tp])
                .collect(),
            attributes: attrs,
            methods: Vec::new(),
            vtable: AHashMap::new(),
        };
        let class_id = self
            .symtab
            .define_class(scope, &decl.name, class_sym)
            .map_err(VenomError::semantic)?;
        self.class_by_type.insert(class_type_id, class_id);

        let self_args = self.symtab.class(class_id).type_params.clone();
        let self_type = self
            .registry
            .instantiate(class_type_id, self_args)
            .map_err(VenomError::semantic)?;

        let mut methods = Vec::new();
        for &m in &decl.methods {
            let Stmt::FuncDecl(method_decl) = self.ast.stmt(m).clone() else {
                return Err(VenomError::semantic("class body member is not a method"));
            };
            self.name_pass_func(class_scope, m, &method_decl, Some(class_id), Some(self_type))?;
            if let Stmt::FuncDecl(d) = self.ast.stmt(m) {
                methods.push(d.symbol.expect("name_pass_func always assigns a symbol"));
            }
        }
        self.symtab.class_mut(class_id).methods = methods.clone();
        for (slot, &method) in methods.iter().enumerate() {
            let name = self.symtab.function(method).name.clone();
            self.symtab
                .class_mut(class_id)
                .vtable
                .insert(name, u32::try_from(slot).expect("vtable overflow"));
        }

        self.type_param_env.pop();
        if let Stmt::ClassDecl(d) = self.ast.stmt_mut(stmt_id) {
            d.symbol = Some(class_id);
        }
        Ok(())
    }

    fn class_type_id(&self, class: ClassSymbolId) -> TypeId {
        self.symtab.class(class).type_id
    }

    /// Total attribute count across `class`'s whole ancestor chain,
    /// including its own. Used to place a subclass's own attributes after
    /// its parent's in the flattened per-object layout.
    fn total_attr_count(&self, class: ClassSymbolId) -> u32 {
        let here = u32::try_from(self.symtab.class(class).attributes.len()).expect("attribute count overflow");
        let inherited = self
            .symtab
            .class(class)
            .parents
            .first()
            .map_or(0, |&p| self.total_attr_count(p));
        here + inherited
    }

    // ---------------------------------------------------------------
    // Type pass
    // ---------------------------------------------------------------

    fn type_pass(&mut self, scope: ScopeId, stmts: &[StmtId]) -> VenomResult<()> {
        for &id in stmts {
            self.type_pass_stmt(scope, id)?;
        }
        Ok(())
    }

    fn type_pass_stmt(&mut self, scope: ScopeId, id: StmtId) -> VenomResult<()> {
        match self.ast.stmt(id).clone() {
            Stmt::ExprStmt(e) => {
                self.type_pass_expr(scope, e, None)?;
                Ok(())
            }
            Stmt::Assign { target, value } => self.type_pass_assign(scope, target, value),
            Stmt::While { cond, body } => {
                let bool_t = self.registry.instantiate(self.registry.bool_id, vec![]).unwrap();
                self.type_pass_expr(scope, cond, Some(bool_t))?;
                self.type_pass(scope, &body)
            }
            Stmt::Return(e) => {
                if let Some(e) = e {
                    self.type_pass_expr(scope, e, None)?;
                }
                Ok(())
            }
            Stmt::FuncDecl(decl) => {
                let func_id = decl.symbol.expect("name pass always assigns a function symbol");
                let func = self.symtab.function(func_id).clone();
                let env: AHashMap<String, InstId> = decl
                    .type_params
                    .iter()
                    .cloned()
                    .zip(func.type_params.iter().copied())
                    .collect();
                self.type_param_env.push(env);
                let result = self.type_pass(func.body_scope, &decl.body);
                self.type_param_env.pop();
                result
            }
            Stmt::ClassDecl(decl) => {
                for &m in &decl.methods {
                    self.type_pass_stmt(scope, m)?;
                }
                Ok(())
            }
        }
    }

    /// First assignment to a not-yet-declared name defines it (Venom has no
    /// `var` keyword); later assignments require the rhs to conform to the
    /// already-fixed declared type.
    fn type_pass_assign(&mut self, scope: ScopeId, target: ExprId, value: ExprId) -> VenomResult<()> {
        if let Expr::Name(name) = self.ast.expr(target).clone() {
            if let Some(existing) = self.symtab.lookup_variable(scope, &name, true) {
                let declared = self.symtab.variable(existing).declared_type;
                let value_t = self.type_pass_expr(scope, value, Some(declared))?;
                self.require_subtype(value_t, declared, &name)?;
                *self.ast.expr_mut(target) = Expr::Var(existing);
                self.ast.set_static_type(target, declared);
                return Ok(());
            }
            let value_t = self.type_pass_expr(scope, value, None)?;
            let sym = self
                .symtab
                .define_variable(scope, &name, value_t, StorageClass::Unassigned)
                .map_err(VenomError::semantic)?;
            *self.ast.expr_mut(target) = Expr::Var(sym);
            self.ast.set_static_type(target, value_t);
            return Ok(());
        }
        // Attribute-target assignment, e.g. `self.v = x` (spelled `v = x`
        // inside a method, attribute resolved by name against `self`'s
        // class — see `type_pass_expr`'s `Expr::Name` arm).
        let target_t = self.type_pass_expr(scope, target, None)?;
        let value_t = self.type_pass_expr(scope, value, Some(target_t))?;
        self.require_subtype(value_t, target_t, "assignment target")
    }

    fn require_subtype(&self, sub: InstId, sup: InstId, site: &str) -> VenomResult<()> {
        if self.registry.is_subtype(sub, sup) {
            Ok(())
        } else {
            Err(VenomError::ty(format!(
                "{site}: expected {}, got {}",
                self.registry.stringify(sup),
                self.registry.stringify(sub)
            )))
        }
    }

    #[allow(clippy::too_many_lines)]
    fn type_pass_expr(&mut self, scope: ScopeId, id: ExprId, expected: Option<InstId>) -> VenomResult<InstId> {
        let ty = match self.ast.expr(id).clone() {
            Expr::IntLit(_) => self.registry.instantiate(self.registry.int_id, vec![]).unwrap(),
            Expr::FloatLit(_) => self.registry.instantiate(self.registry.float_id, vec![]).unwrap(),
            Expr::BoolLit(_) => self.registry.instantiate(self.registry.bool_id, vec![]).unwrap(),
            Expr::StringLit(_) => self.registry.instantiate(self.registry.string_id, vec![]).unwrap(),
            Expr::NilLit => match expected {
                Some(e) if self.is_reference_type(e) => e,
                _ => self.registry.instantiate(self.registry.object_id, vec![]).unwrap(),
            },
            Expr::Name(name) => {
                // A bare name the name pass never declared (i.e. not a
                // function/class parameter or attribute): resolve through
                // the active scope chain, or against `self`'s class
                // attributes when inside a method (spec.md §4.4's
                // attribute-access rule, applied implicitly).
                if let Some(sym) = self.symtab.lookup_variable(scope, &name, true) {
                    *self.ast.expr_mut(id) = Expr::Var(sym);
                    self.symtab.variable(sym).declared_type
                } else if let Some(selfv) = self.symtab.lookup_variable(scope, "self", true) {
                    let self_t = self.symtab.variable(selfv).declared_type;
                    let attr_t = self.attr_type(self_t, &name)?;
                    let self_ref = self.ast.alloc_expr(Expr::Var(selfv));
                    *self.ast.expr_mut(id) = Expr::AttrAccess {
                        receiver: self_ref,
                        attr: name.clone(),
                    };
                    attr_t
                } else {
                    return Err(VenomError::semantic(format!("undefined name '{name}'")));
                }
            }
            Expr::Var(sym) => self.symtab.variable(sym).declared_type,
            Expr::UnOp(op, inner) => {
                let inner_t = self.type_pass_expr(scope, inner, None)?;
                match op {
                    AstUnOp::Neg => inner_t,
                    AstUnOp::Not => self.registry.instantiate(self.registry.bool_id, vec![]).unwrap(),
                }
            }
            Expr::BinOp(op, lhs, rhs) => {
                let lhs_t = self.type_pass_expr(scope, lhs, None)?;
                let rhs_t = self.type_pass_expr(scope, rhs, Some(lhs_t))?;
                self.require_subtype(rhs_t, lhs_t, "binary operator operand")?;
                match op {
                    AstBinOp::Lt
                    | AstBinOp::Le
                    | AstBinOp::Gt
                    | AstBinOp::Ge
                    | AstBinOp::Eq
                    | AstBinOp::Ne
                    | AstBinOp::And
                    | AstBinOp::Or => self.registry.instantiate(self.registry.bool_id, vec![]).unwrap(),
                    AstBinOp::Add | AstBinOp::Sub | AstBinOp::Mul | AstBinOp::Div | AstBinOp::Mod => lhs_t,
                }
            }
            Expr::Call { callee, args } => self.type_pass_call(scope, id, &callee, &args)?,
            Expr::MethodCall {
                receiver,
                method,
                args,
            } => self.type_pass_method_call(scope, id, receiver, &method, &args)?,
            Expr::AttrAccess { receiver, attr } => {
                let recv_t = self.type_pass_expr(scope, receiver, None)?;
                self.attr_type(recv_t, &attr)?
            }
            Expr::New {
                class,
                type_args,
                args,
            } => self.type_pass_new(scope, &class, &type_args, &args)?,
        };
        self.ast.set_static_type(id, ty);
        Ok(ty)
    }

    fn is_reference_type(&self, t: InstId) -> bool {
        let base = self.registry.inst_of(t).base;
        base != self.registry.int_id && base != self.registry.float_id && base != self.registry.bool_id
    }

    fn type_pass_call(&mut self, scope: ScopeId, call_id: ExprId, callee: &str, args: &[ExprId]) -> VenomResult<InstId> {
        let func_id = self
            .symtab
            .lookup_function(scope, callee, true)
            .ok_or_else(|| VenomError::semantic(format!("undefined function '{callee}'")))?;

        let mut arg_types = Vec::with_capacity(args.len());
        for &a in args {
            arg_types.push(self.type_pass_expr(scope, a, None)?);
        }

        let func = self.symtab.function(func_id).clone();
        if args.len() != func.params.len() {
            return Err(VenomError::semantic(format!(
                "'{callee}' expects {} argument(s), got {}",
                func.params.len(),
                args.len()
            )));
        }

        // Infer type arguments positionally: any parameter whose declared
        // type is itself one of the function's placeholders binds that
        // placeholder to the argument's actual static type.
        let mut inferred: AHashMap<InstId, InstId> = AHashMap::new();
        for (&param, &arg_t) in func.params.iter().zip(&arg_types) {
            let param_t = self.symtab.variable(param).declared_type;
            if func.type_params.contains(&param_t) {
                inferred.insert(param_t, arg_t);
            } else {
                self.require_subtype(arg_t, param_t, callee)?;
            }
        }
        let type_args: Vec<InstId> = func
            .type_params
            .iter()
            .map(|tp| {
                inferred.get(tp).copied().ok_or_else(|| {
                    VenomError::ty(format!("could not infer type argument for '{callee}'"))
                })
            })
            .collect::<VenomResult<_>>()?;

        let bound = BoundFunction::new(func_id, type_args.clone());
        self.ast.bound_functions.insert(call_id, bound);

        if func.type_params.is_empty() {
            Ok(func.return_type)
        } else {
            Ok(self.registry.translate(func.return_type, &inferred))
        }
    }

    fn type_pass_method_call(
        &mut self,
        scope: ScopeId,
        call_id: ExprId,
        receiver: ExprId,
        method: &str,
        args: &[ExprId],
    ) -> VenomResult<InstId> {
        let recv_t = self.type_pass_expr(scope, receiver, None)?;
        let class_id = self.class_of(recv_t)?;
        let func_id = self
            .resolve_method(class_id, method)
            .ok_or_else(|| VenomError::semantic(format!("no method '{method}' on this receiver")))?;

        let mut arg_types = Vec::with_capacity(args.len());
        for &a in args {
            arg_types.push(self.type_pass_expr(scope, a, None)?);
        }
        let func = self.symtab.function(func_id).clone();
        // First parameter is `self` (captured-as-parameter per spec.md
        // §4.5 point 3), so skip it when matching explicit call arguments.
        let explicit_params = &func.params[1.min(func.params.len())..];
        if args.len() != explicit_params.len() {
            return Err(VenomError::semantic(format!(
                "'{method}' expects {} argument(s), got {}",
                explicit_params.len(),
                args.len()
            )));
        }
        for (&param, &arg_t) in explicit_params.iter().zip(&arg_types) {
            let param_t = self.symtab.variable(param).declared_type;
            self.require_subtype(arg_t, param_t, method)?;
        }
        let bound = BoundFunction::new(func_id, Vec::new());
        self.ast.bound_functions.insert(call_id, bound);
        Ok(func.return_type)
    }

    fn type_pass_new(
        &mut self,
        scope: ScopeId,
        class_name: &str,
        type_arg_names: &[String],
        args: &[ExprId],
    ) -> VenomResult<InstId> {
        let class_id = self
            .symtab
            .lookup_class(scope, class_name, true)
            .ok_or_else(|| VenomError::semantic(format!("undefined class '{class_name}'")))?;
        let type_args: Vec<InstId> = type_arg_names
            .iter()
            .map(|n| self.resolve_type_name(n))
            .collect::<VenomResult<_>>()?;

        let class_type = self.symtab.class(class_id).type_id;
        let instantiated = self
            .registry
            .instantiate(class_type, type_args)
            .map_err(|e| VenomError::semantic(format!("{class_name}: {e}")))?;

        if let Some(init) = self.resolve_method(class_id, "init") {
            let init_func = self.symtab.function(init).clone();
            let explicit_params = &init_func.params[1.min(init_func.params.len())..];
            if args.len() != explicit_params.len() {
                return Err(VenomError::semantic(format!(
                    "'{class_name}.new' expects {} argument(s), got {}",
                    explicit_params.len(),
                    args.len()
                )));
            }
            for (&param, &arg) in explicit_params.iter().zip(args) {
                let param_t = self.symtab.variable(param).declared_type;
                let arg_t = self.type_pass_expr(scope, arg, Some(param_t))?;
                self.require_subtype(arg_t, param_t, class_name)?;
            }
        }
        Ok(instantiated)
    }

    fn class_of(&self, t: InstId) -> VenomResult<ClassSymbolId> {
        let base = self.registry.inst_of(t).base;
        self.class_by_type
            .get(&base)
            .copied()
            .ok_or_else(|| VenomError::ty(format!("{} is not a class type", self.registry.stringify(t))))
    }

    fn resolve_method(&self, class: ClassSymbolId, name: &str) -> Option<crate::symbol::FuncSymbolId> {
        let class_sym = self.symtab.class(class);
        if let Some(&slot) = class_sym.vtable.get(name) {
            return Some(class_sym.methods[slot as usize]);
        }
        class_sym
            .parents
            .first()
            .and_then(|&parent| self.resolve_method(parent, name))
    }

    fn attr_type(&self, receiver_t: InstId, attr: &str) -> VenomResult<InstId> {
        let class_id = self.class_of(receiver_t)?;
        self.attr_type_in(class_id, attr)
    }

    fn attr_type_in(&self, class: ClassSymbolId, attr: &str) -> VenomResult<InstId> {
        let class_sym = self.symtab.class(class);
        for &a in &class_sym.attributes {
            if self.symtab.variable(a).name == attr {
                return Ok(self.symtab.variable(a).declared_type);
            }
        }
        if let Some(&parent) = class_sym.parents.first() {
            return self.attr_type_in(parent, attr);
        }
        Err(VenomError::semantic(format!("no attribute '{attr}' on this class")))
    }
}

fn mangled_type_param(stmt_id: StmtId, name: &str) -> String {
    format!("{name}@{}", stmt_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FuncDecl, Param};

    #[test]
    fn scenario_four_function_call_type_checks() {
        let mut registry = TypeRegistry::new();
        let mut symtab = SymbolTable::new();
        let mut ast = Ast::new();

        // def f(x:Int)->Int: return x*x; end; print(f(5))
        let x_ref1 = ast.alloc_expr(Expr::Name("x".into()));
        let x_ref2 = ast.alloc_expr(Expr::Name("x".into()));
        let mul = ast.alloc_expr(Expr::BinOp(AstBinOp::Mul, x_ref1, x_ref2));
        let ret = ast.alloc_stmt(Stmt::Return(Some(mul)));
        let func_stmt = ast.alloc_stmt(Stmt::FuncDecl(FuncDecl {
            name: "f".into(),
            params: vec![Param {
                name: "x".into(),
                declared_type_name: "Int".into(),
                symbol: None,
            }],
            return_type_name: "Int".into(),
            type_params: vec![],
            body: vec![ret],
            symbol: None,
        }));

        let five = ast.alloc_expr(Expr::IntLit(5));
        let call = ast.alloc_expr(Expr::Call {
            callee: "f".into(),
            args: vec![five],
        });
        let call_stmt = ast.alloc_stmt(Stmt::ExprStmt(call));

        let mut checker = Checker::new(&mut registry, &mut symtab, &mut ast);
        checker.check_module(&[func_stmt, call_stmt]).unwrap();

        let int_t = checker.registry.instantiate(checker.registry.int_id, vec![]).unwrap();
        assert_eq!(checker.ast.static_type(call), Some(int_t));
    }

    #[test]
    fn reassignment_with_wrong_type_is_a_type_violation() {
        let mut registry = TypeRegistry::new();
        let mut symtab = SymbolTable::new();
        let mut ast = Ast::new();

        let one = ast.alloc_expr(Expr::IntLit(1));
        let x_target = ast.alloc_expr(Expr::Name("x".into()));
        let first = ast.alloc_stmt(Stmt::Assign {
            target: x_target,
            value: one,
        });

        let flag = ast.alloc_expr(Expr::BoolLit(true));
        let x_target2 = ast.alloc_expr(Expr::Name("x".into()));
        let second = ast.alloc_stmt(Stmt::Assign {
            target: x_target2,
            value: flag,
        });

        let mut checker = Checker::new(&mut registry, &mut symtab, &mut ast);
        let err = checker.check_module(&[first, second]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeViolation);
    }
}
