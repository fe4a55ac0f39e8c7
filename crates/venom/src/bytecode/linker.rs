//! Linker: assembles a module's instruction stream into a `FuncDescMap` and
//! a `ClassObjMap`, and injects the builtins during bootstrap.
//!
//! Grounded on `bytecode/mod.rs`/`bytecode/vm/call.rs`'s function-descriptor
//! and class-object-map concept — ouros resolves callables and classes
//! through similar lookup tables, though its tables additionally carry a
//! great deal of Python-object-model machinery this core has no use for.

use ahash::AHashMap;

use crate::bytecode::op::Op;
use crate::heap::{ClassObj, ClassObjId, FuncDescId};

/// Metadata for one callable: its code (bytecode-backed functions only),
/// argument count, a bitmask of which argument slots are `Ref`-typed (so the
/// VM knows which arguments to decref on an early return path), and whether
/// it is a native (Rust-implemented) function rather than bytecode.
#[derive(Debug, Clone)]
pub struct FuncDesc {
    pub name: String,
    pub arg_count: u32,
    pub ref_arg_mask: u64,
    pub native: bool,
    /// Index into `Linker::bodies`; unused (zero) for native functions.
    pub code: Vec<Op>,
}

#[derive(Debug, Default)]
pub struct FuncDescMap {
    descs: Vec<FuncDesc>,
    by_name: AHashMap<String, FuncDescId>,
}

impl FuncDescMap {
    pub fn insert(&mut self, desc: FuncDesc) -> FuncDescId {
        let id = FuncDescId(u32::try_from(self.descs.len()).expect("function descriptor table overflow"));
        self.by_name.insert(desc.name.clone(), id);
        self.descs.push(desc);
        id
    }

    pub fn get(&self, id: FuncDescId) -> &FuncDesc {
        &self.descs[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<FuncDescId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FuncDesc> {
        self.descs.iter()
    }
}

#[derive(Debug, Default)]
pub struct ClassObjMap {
    classes: Vec<ClassObj>,
    by_name: AHashMap<String, ClassObjId>,
}

impl ClassObjMap {
    pub fn insert(&mut self, class: ClassObj) -> ClassObjId {
        let id = ClassObjId(u32::try_from(self.classes.len()).expect("class object table overflow"));
        self.by_name.insert(class.name.clone(), id);
        self.classes.push(class);
        id
    }

    pub fn get(&self, id: ClassObjId) -> &ClassObj {
        &self.classes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ClassObjId) -> &mut ClassObj {
        &mut self.classes[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassObjId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassObj> {
        self.classes.iter()
    }
}

/// The linked artifact handed to the VM: the module's own entry code, the
/// function-descriptor and class-object tables the bootstrap step populated
/// with builtins before user code was linked in, the string constant pool
/// (spec.md §6: "constants live in a per-module constant pool"), and the
/// builtin `String` class every pooled constant is materialized as an
/// instance of.
#[derive(Debug)]
pub struct LinkedModule {
    pub entry: Vec<Op>,
    pub funcs: FuncDescMap,
    pub classes: ClassObjMap,
    pub constants: Vec<String>,
    pub string_class: ClassObjId,
}

pub struct Linker {
    funcs: FuncDescMap,
    classes: ClassObjMap,
    constants: Vec<String>,
    string_class: ClassObjId,
}

impl Linker {
    pub fn new() -> Self {
        let mut classes = ClassObjMap::default();
        let string_class = classes.insert(ClassObj {
            name: "String".into(),
            attr_count: 0,
            init_desc: None,
            release_desc: None,
            ctor_desc: None,
            vtable: Vec::new(),
        });
        Self {
            funcs: FuncDescMap::default(),
            classes,
            constants: Vec::new(),
            string_class,
        }
    }

    pub fn define_func(&mut self, desc: FuncDesc) -> FuncDescId {
        self.funcs.insert(desc)
    }

    pub fn define_class(&mut self, class: ClassObj) -> ClassObjId {
        self.classes.insert(class)
    }

    pub fn funcs(&self) -> &FuncDescMap {
        &self.funcs
    }

    pub fn funcs_mut(&mut self) -> &mut FuncDescMap {
        &mut self.funcs
    }

    pub fn classes(&self) -> &ClassObjMap {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassObjMap {
        &mut self.classes
    }

    pub fn string_class(&self) -> ClassObjId {
        self.string_class
    }

    /// Interns a string literal into the constant pool, returning the index
    /// `Op::PushCellRef` addresses it by. Unlike `FuncDescMap`/`ClassObjMap`
    /// this never deduplicates by value — two occurrences of the same
    /// literal get two pool entries, matching the teacher's own
    /// `CodeBuilder::emit` treatment of other operand tables (append-only,
    /// no interning pass).
    pub fn intern_string(&mut self, s: String) -> u32 {
        let idx = u32::try_from(self.constants.len()).expect("constant pool overflow");
        self.constants.push(s);
        idx
    }

    pub fn finish(self, entry: Vec<Op>) -> LinkedModule {
        LinkedModule {
            entry,
            funcs: self.funcs,
            classes: self.classes,
            constants: self.constants,
            string_class: self.string_class,
        }
    }
}

impl Default for Linker {
    fn default() -> Self {
        Self::new()
    }
}
