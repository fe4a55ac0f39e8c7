//! Symbol table: a tree of lexical scopes, and the symbol kinds they hold.

use crate::ast::StmtId;
use crate::types::{InstId, TypeId};
use ahash::AHashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarSymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncSymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassSymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleSymbolId(pub u32);

/// Where a variable's cell lives at runtime. Assigned by the code generator,
/// not the checker; `Unassigned` is the value until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Unassigned,
    Local(u32),
    Parameter(u32),
    ClassAttribute(u32),
    ModuleGlobal(u32),
}

#[derive(Debug, Clone)]
pub struct VarSymbol {
    pub name: String,
    pub declared_type: InstId,
    pub owning_scope: ScopeId,
    pub storage: StorageClass,
}

#[derive(Debug, Clone, Default)]
pub struct Specialization {
    /// Concrete argument tuple this specialization was generated for.
    pub args: Vec<InstId>,
    /// The lifted/codegen-ready body produced for this argument tuple.
    pub body: Option<StmtId>,
}

#[derive(Debug, Clone)]
pub struct FuncSymbol {
    pub name: String,
    pub params: Vec<VarSymbolId>,
    pub return_type: InstId,
    /// Type-parameter placeholders, in declaration order.
    pub type_params: Vec<InstId>,
    pub enclosing_class: Option<ClassSymbolId>,
    /// The scope created for this function's own parameters and locals
    /// (`name_pass_func`'s `body_scope`). Stored here so later passes (the
    /// lift transform, codegen) can recover it without re-deriving it from
    /// whichever parameter happens to be first — a derivation that breaks
    /// down for a capture-only nested function with no explicit parameters.
    pub body_scope: ScopeId,
    pub body: Option<StmtId>,
    /// Keyed by the concrete argument tuple used at a call site.
    pub specializations: AHashMap<Vec<InstId>, Specialization>,
}

impl FuncSymbol {
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ClassSymbol {
    pub name: String,
    /// This class's own nominal `TypeId`, so later passes (codegen's
    /// receiver-type resolution) can map an `InstId` back to a class without
    /// keeping a parallel reverse index of their own.
    pub type_id: TypeId,
    pub parents: Vec<ClassSymbolId>,
    pub type_params: Vec<InstId>,
    pub attributes: Vec<VarSymbolId>,
    pub methods: Vec<FuncSymbolId>,
    /// Method slot index by name, flattened across the inheritance chain;
    /// filled in by the code generator/linker.
    pub vtable: AHashMap<String, u32>,
}

#[derive(Debug, Clone)]
pub struct ModuleSymbol {
    pub name: String,
    pub top_scope: ScopeId,
}

/// A `(FuncSymbol, [InstantiatedType])` pair identifying a specific
/// specialization request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundFunction {
    pub symbol: FuncSymbolId,
    pub args: Vec<InstId>,
}

impl BoundFunction {
    pub fn new(symbol: FuncSymbolId, args: Vec<InstId>) -> Self {
        Self { symbol, args }
    }

    pub fn is_fully_instantiated(&self, reg: &crate::types::TypeRegistry, ground: impl Fn(InstId) -> bool) -> bool {
        let _ = reg;
        self.args.iter().all(|&a| ground(a))
    }

    /// Deterministically mangles the symbol name and argument tuple into the
    /// code-generation name, e.g. `Box__Int` for `Box{Int}`.
    pub fn create_func_name(&self, base_name: &str, reg: &crate::types::TypeRegistry) -> String {
        if self.args.is_empty() {
            return base_name.to_owned();
        }
        let mangled: Vec<String> = self.args.iter().map(|&a| reg.stringify(a)).collect();
        format!("{base_name}__{}", mangled.join("_"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    Duplicate { kind: SymbolKind, name: String },
    Undefined { kind: SymbolKind, name: String },
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate { name, .. } => write!(f, "'{name}' already declared in this scope"),
            Self::Undefined { name, .. } => write!(f, "undefined name '{name}'"),
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    variables: AHashMap<String, VarSymbolId>,
    functions: AHashMap<String, FuncSymbolId>,
    classes: AHashMap<String, ClassSymbolId>,
    modules: AHashMap<String, ModuleSymbolId>,
}

/// Tree of lexical scopes. Each node holds four sub-maps (variables,
/// functions, classes, modules) keyed by name, plus a back-reference to its
/// parent. Lookup walks parents.
pub struct SymbolTable {
    scopes: Vec<Scope>,
    variables: Vec<VarSymbol>,
    functions: Vec<FuncSymbol>,
    classes: Vec<ClassSymbol>,
    modules: Vec<ModuleSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            variables: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            modules: Vec::new(),
        }
    }

    pub fn root_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn new_child_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(u32::try_from(self.scopes.len()).expect("scope table overflow"));
        self.scopes.push(Scope {
            parent: Some(parent),
            ..Scope::default()
        });
        id
    }

    pub fn define_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        declared_type: InstId,
        storage: StorageClass,
    ) -> Result<VarSymbolId, SymbolError> {
        if self.scopes[scope.0 as usize].variables.contains_key(name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Variable,
                name: name.to_owned(),
            });
        }
        let id = VarSymbolId(u32::try_from(self.variables.len()).expect("variable table overflow"));
        self.variables.push(VarSymbol {
            name: name.to_owned(),
            declared_type,
            owning_scope: scope,
            storage,
        });
        self.scopes[scope.0 as usize].variables.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn define_function(&mut self, scope: ScopeId, name: &str, func: FuncSymbol) -> Result<FuncSymbolId, SymbolError> {
        if self.scopes[scope.0 as usize].functions.contains_key(name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Function,
                name: name.to_owned(),
            });
        }
        let id = FuncSymbolId(u32::try_from(self.functions.len()).expect("function table overflow"));
        self.functions.push(func);
        self.scopes[scope.0 as usize].functions.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn define_class(&mut self, scope: ScopeId, name: &str, class: ClassSymbol) -> Result<ClassSymbolId, SymbolError> {
        if self.scopes[scope.0 as usize].classes.contains_key(name) {
            return Err(SymbolError::Duplicate {
                kind: SymbolKind::Class,
                name: name.to_owned(),
            });
        }
        let id = ClassSymbolId(u32::try_from(self.classes.len()).expect("class table overflow"));
        self.classes.push(class);
        self.scopes[scope.0 as usize].classes.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn define_module(&mut self, scope: ScopeId, name: &str, module: ModuleSymbol) -> Result<ModuleSymbolId, SymbolError> {
        let id = ModuleSymbolId(u32::try_from(self.modules.len()).expect("module table overflow"));
        self.modules.push(module);
        self.scopes[scope.0 as usize].modules.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn lookup_variable(&self, scope: ScopeId, name: &str, recursive: bool) -> Option<VarSymbolId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(&id) = self.scopes[s.0 as usize].variables.get(name) {
                return Some(id);
            }
            if !recursive {
                return None;
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    pub fn lookup_function(&self, scope: ScopeId, name: &str, recursive: bool) -> Option<FuncSymbolId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(&id) = self.scopes[s.0 as usize].functions.get(name) {
                return Some(id);
            }
            if !recursive {
                return None;
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    pub fn lookup_class(&self, scope: ScopeId, name: &str, recursive: bool) -> Option<ClassSymbolId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(&id) = self.scopes[s.0 as usize].classes.get(name) {
                return Some(id);
            }
            if !recursive {
                return None;
            }
            cur = self.scopes[s.0 as usize].parent;
        }
        None
    }

    /// Declaring scope of a variable's owner, used by the lift pass to
    /// decide whether a reference is non-local to the nearest enclosing
    /// function scope.
    pub fn scope_of(&self, var: VarSymbolId) -> ScopeId {
        self.variables[var.0 as usize].owning_scope
    }

    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    pub fn variable(&self, id: VarSymbolId) -> &VarSymbol {
        &self.variables[id.0 as usize]
    }

    pub fn variable_mut(&mut self, id: VarSymbolId) -> &mut VarSymbol {
        &mut self.variables[id.0 as usize]
    }

    pub fn function(&self, id: FuncSymbolId) -> &FuncSymbol {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncSymbolId) -> &mut FuncSymbol {
        &mut self.functions[id.0 as usize]
    }

    pub fn class(&self, id: ClassSymbolId) -> &ClassSymbol {
        &self.classes[id.0 as usize]
    }

    pub fn class_mut(&mut self, id: ClassSymbolId) -> &mut ClassSymbol {
        &mut self.classes[id.0 as usize]
    }

    pub fn module(&self, id: ModuleSymbolId) -> &ModuleSymbol {
        &self.modules[id.0 as usize]
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn func_count(&self) -> usize {
        self.functions.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    #[test]
    fn duplicate_declaration_in_same_scope_is_an_error() {
        let mut reg = TypeRegistry::new();
        let mut table = SymbolTable::new();
        let root = table.root_scope();
        let int_t = reg.instantiate(reg.int_id, vec![]).unwrap();
        table
            .define_variable(root, "x", int_t, StorageClass::Unassigned)
            .unwrap();
        let err = table
            .define_variable(root, "x", int_t, StorageClass::Unassigned)
            .unwrap_err();
        assert_eq!(
            err,
            SymbolError::Duplicate {
                kind: SymbolKind::Variable,
                name: "x".to_owned()
            }
        );
    }

    #[test]
    fn lookup_walks_parent_chain() {
        let mut reg = TypeRegistry::new();
        let mut table = SymbolTable::new();
        let root = table.root_scope();
        let int_t = reg.instantiate(reg.int_id, vec![]).unwrap();
        table
            .define_variable(root, "outer", int_t, StorageClass::Unassigned)
            .unwrap();
        let child = table.new_child_scope(root);
        assert!(table.lookup_variable(child, "outer", true).is_some());
        assert!(table.lookup_variable(child, "outer", false).is_none());
    }
}
