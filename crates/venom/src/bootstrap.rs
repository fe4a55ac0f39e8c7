//! Bootstrap: registers the handful of names every program can use without
//! declaring them first — currently just the `print` builtin — into a
//! fresh `TypeRegistry`/`SymbolTable` pair before a module's own statements
//! are name/type checked.
//!
//! Grounded on the teacher's own builtins module, which seeds a runtime
//! namespace with native callables ahead of loading any user code; `print`
//! here plays the same role `ouros`'s handful of always-available builtins
//! do there, just a single entry instead of a whole stdlib surface.

use ahash::AHashMap;

use crate::symbol::{FuncSymbol, ScopeId, StorageClass, SymbolTable};
use crate::types::TypeRegistry;

/// Registers builtins into `symtab`/`registry` and returns the module's
/// root scope, ready for a parsed statement list to be checked against.
///
/// `print` is given a real `FuncSymbol` (one `Object`-typed parameter,
/// `Object`-typed return) purely so `check.rs`'s name/type passes resolve
/// calls to it like any other function; it carries no body, and the code
/// generator (`codegen.rs`'s `emit_call`) recognizes the name directly
/// rather than ever compiling one.
pub fn bootstrap(registry: &mut TypeRegistry, symtab: &mut SymbolTable) -> ScopeId {
    let root = symtab.root_scope();
    let object_t = registry
        .instantiate(registry.object_id, Vec::new())
        .expect("Object is a zero-arity builtin type");

    let print_scope = symtab.new_child_scope(root);
    let value_param = symtab
        .define_variable(print_scope, "value", object_t, StorageClass::Parameter(0))
        .expect("print's own scope is fresh");

    let print_func = FuncSymbol {
        name: "print".into(),
        params: vec![value_param],
        return_type: object_t,
        type_params: Vec::new(),
        enclosing_class: None,
        body_scope: print_scope,
        body: None,
        specializations: AHashMap::new(),
    };
    symtab
        .define_function(root, "print", print_func)
        .expect("print is the first name defined at root scope");

    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_is_resolvable_as_a_one_argument_function() {
        let mut registry = TypeRegistry::new();
        let mut symtab = SymbolTable::new();
        let root = bootstrap(&mut registry, &mut symtab);
        let func = symtab.lookup_function(root, "print", false).expect("registered at root scope");
        assert_eq!(symtab.function(func).params.len(), 1);
        assert!(symtab.function(func).body.is_none());
    }
}
