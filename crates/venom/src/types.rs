//! Type registry: named declarations and hash-consed instantiations.

use ahash::AHashMap;
use std::fmt;

/// Identifies a named `Type` declaration within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Identifies a hash-consed `InstantiatedType` within one `TypeRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// A named declaration with an arity. Builtin types are registered by
/// `TypeRegistry::new` before any user code is processed.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub arity: usize,
    /// Declared parent types, by `TypeId`. Empty for `Object` and the value
    /// types (`Int`, `Float`, `Bool`).
    pub parents: Vec<TypeId>,
    /// Cached instantiation for arity-0 types (created lazily on first use).
    cached_zero_arity: Option<InstId>,
}

/// An applied type: a `Type` plus ground type arguments. Structurally equal
/// instantiations share an `InstId` within one `TypeRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstantiatedType {
    pub base: TypeId,
    pub args: Vec<InstId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRegistryError {
    DuplicateName,
    ArityMismatch { expected: usize, got: usize },
    UnknownType,
}

impl fmt::Display for TypeRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName => write!(f, "type already declared"),
            Self::ArityMismatch { expected, got } => {
                write!(f, "expected {expected} type argument(s), got {got}")
            }
            Self::UnknownType => write!(f, "unknown type"),
        }
    }
}

/// Owns every named `Type` and every `InstantiatedType` created during one
/// compilation. Instantiation is hash-consed: `instantiate(t, args)` called
/// twice with structurally equal arguments returns the same `InstId`.
pub struct TypeRegistry {
    types: Vec<Type>,
    by_name: AHashMap<String, TypeId>,
    insts: Vec<InstantiatedType>,
    by_inst: AHashMap<InstantiatedType, InstId>,
    pub object_id: TypeId,
    pub int_id: TypeId,
    pub float_id: TypeId,
    pub bool_id: TypeId,
    pub string_id: TypeId,
    pub void_id: TypeId,
    pub list_id: TypeId,
    pub map_id: TypeId,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            types: Vec::new(),
            by_name: AHashMap::new(),
            insts: Vec::new(),
            by_inst: AHashMap::new(),
            object_id: TypeId(0),
            int_id: TypeId(0),
            float_id: TypeId(0),
            bool_id: TypeId(0),
            string_id: TypeId(0),
            void_id: TypeId(0),
            list_id: TypeId(0),
            map_id: TypeId(0),
        };
        reg.object_id = reg.create_type("Object", 0, vec![]).unwrap();
        reg.int_id = reg.create_type("Int", 0, vec![reg.object_id]).unwrap();
        reg.float_id = reg.create_type("Float", 0, vec![reg.object_id]).unwrap();
        reg.bool_id = reg.create_type("Bool", 0, vec![reg.object_id]).unwrap();
        reg.string_id = reg.create_type("String", 0, vec![reg.object_id]).unwrap();
        reg.void_id = reg.create_type("Void", 0, vec![]).unwrap();
        reg.list_id = reg.create_type("List", 1, vec![reg.object_id]).unwrap();
        reg.map_id = reg.create_type("Map", 2, vec![reg.object_id]).unwrap();
        reg
    }

    pub fn create_type(
        &mut self,
        name: &str,
        arity: usize,
        parents: Vec<TypeId>,
    ) -> Result<TypeId, TypeRegistryError> {
        if self.by_name.contains_key(name) {
            return Err(TypeRegistryError::DuplicateName);
        }
        let id = TypeId(u32::try_from(self.types.len()).expect("type table overflow"));
        self.types.push(Type {
            name: name.to_owned(),
            arity,
            parents,
            cached_zero_arity: None,
        });
        self.by_name.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn type_of(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// Hash-consed instantiation. Arity-0 types reuse a single cached
    /// instance; higher arities are consed by structural equality.
    pub fn instantiate(
        &mut self,
        base: TypeId,
        args: Vec<InstId>,
    ) -> Result<InstId, TypeRegistryError> {
        let arity = self.types[base.0 as usize].arity;
        if args.len() != arity {
            return Err(TypeRegistryError::ArityMismatch {
                expected: arity,
                got: args.len(),
            });
        }
        if arity == 0 {
            if let Some(cached) = self.types[base.0 as usize].cached_zero_arity {
                return Ok(cached);
            }
            let id = self.intern(InstantiatedType { base, args });
            self.types[base.0 as usize].cached_zero_arity = Some(id);
            return Ok(id);
        }
        Ok(self.intern(InstantiatedType { base, args }))
    }

    fn intern(&mut self, it: InstantiatedType) -> InstId {
        if let Some(&id) = self.by_inst.get(&it) {
            return id;
        }
        let id = InstId(u32::try_from(self.insts.len()).expect("instantiation table overflow"));
        self.by_inst.insert(it.clone(), id);
        self.insts.push(it);
        id
    }

    /// Replaces type-parameter placeholders per `substitution`, returning a
    /// fresh (hash-consed) instantiation.
    pub fn translate(
        &mut self,
        it: InstId,
        substitution: &AHashMap<InstId, InstId>,
    ) -> InstId {
        if let Some(&replacement) = substitution.get(&it) {
            return replacement;
        }
        let inst = self.insts[it.0 as usize].clone();
        let args: Vec<InstId> = inst
            .args
            .iter()
            .map(|a| self.translate(*a, substitution))
            .collect();
        if args == inst.args {
            return it;
        }
        self.intern(InstantiatedType {
            base: inst.base,
            args,
        })
    }

    pub fn inst_of(&self, id: InstId) -> &InstantiatedType {
        &self.insts[id.0 as usize]
    }

    /// Nominal subtyping plus invariant generic parameters; `Object` is the
    /// top of the reference hierarchy. Venom classes have at most one parent
    /// (spec.md §9 Open Questions), so ancestry is a linear walk.
    pub fn is_subtype(&self, sub: InstId, sup: InstId) -> bool {
        if sub == sup {
            return true;
        }
        let sup_inst = &self.insts[sup.0 as usize];
        if sup_inst.base == self.object_id {
            return true;
        }
        let sub_inst = self.insts[sub.0 as usize].clone();
        if sub_inst.base == sup_inst.base {
            return sub_inst.args == sup_inst.args;
        }
        self.type_of(sub_inst.base)
            .parents
            .first()
            .is_some_and(|&parent| self.is_base_subtype(parent, sup_inst.base))
    }

    /// Ancestry walk over bare `TypeId`s, ignoring generic arguments — used
    /// only to decide whether `sub`'s declared parent chain reaches `sup`'s
    /// base type before falling back to a by-argument comparison in
    /// `is_subtype`.
    fn is_base_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup || sup == self.object_id {
            return true;
        }
        self.type_of(sub)
            .parents
            .first()
            .is_some_and(|&parent| self.is_base_subtype(parent, sup))
    }

    pub fn stringify(&self, id: InstId) -> String {
        let inst = &self.insts[id.0 as usize];
        let ty = self.type_of(inst.base);
        if inst.args.is_empty() {
            return ty.name.clone();
        }
        let args: Vec<String> = inst.args.iter().map(|a| self.stringify(*a)).collect();
        format!("{}<{}>", ty.name, args.join(", "))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing_is_stable() {
        let mut reg = TypeRegistry::new();
        let list_of_int_a = reg.instantiate(reg.list_id, vec![reg.instantiate(reg.int_id, vec![]).unwrap()]).unwrap();
        let list_of_int_b = reg.instantiate(reg.list_id, vec![reg.instantiate(reg.int_id, vec![]).unwrap()]).unwrap();
        assert_eq!(list_of_int_a, list_of_int_b);
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut reg = TypeRegistry::new();
        let err = reg.instantiate(reg.list_id, vec![]).unwrap_err();
        assert_eq!(err, TypeRegistryError::ArityMismatch { expected: 1, got: 0 });
    }

    #[test]
    fn object_is_supertype_of_everything() {
        let mut reg = TypeRegistry::new();
        let int_t = reg.instantiate(reg.int_id, vec![]).unwrap();
        let object_t = reg.instantiate(reg.object_id, vec![]).unwrap();
        assert!(reg.is_subtype(int_t, object_t));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = TypeRegistry::new();
        assert_eq!(
            reg.create_type("Int", 0, vec![]).unwrap_err(),
            TypeRegistryError::DuplicateName
        );
    }
}
