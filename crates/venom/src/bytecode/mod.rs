//! The bytecode stage: instruction set, emitter, and linker.

pub mod builder;
pub mod linker;
pub mod op;

pub use builder::CodeBuilder;
pub use linker::{ClassObjMap, FuncDesc, FuncDescMap, LinkedModule, Linker};
pub use op::{ArithOp, CellKind, Label, Op};
