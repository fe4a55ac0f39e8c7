//! Tagged cells: the 64-bit runtime value that is the unit of stack slot,
//! local slot, and argument passing.
//!
//! `Cell` deliberately does not implement `Clone`/`Copy` for the `Ref`
//! variant's sake: duplicating a cell that points at a heap object is a
//! refcounted operation, not a bitwise copy, so callers must go through
//! [`Cell::dup`] rather than an implicit clone. This mirrors the teacher
//! repo's own `Value` type, which withholds `Clone` for the same reason.

use crate::heap::{Heap, HeapId};

#[derive(Debug, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// A pointer to a heap object, or [`HeapId::NULL`] for the nil literal —
    /// nil is represented as a null reference rather than a fifth tag, since
    /// spec.md §3 lists exactly {Int, Float, Bool, Ref} as the tagged-cell
    /// kinds.
    Ref(HeapId),
}

impl Cell {
    pub const NIL: Self = Self::Ref(HeapId::NULL);

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Ref(id) if id.is_null())
    }

    /// Duplicates a cell for a new stack/local slot. For `Ref`, increments
    /// the target's refcount — this is the only legal way to produce a
    /// second cell pointing at the same heap object.
    pub fn dup(&self, heap: &mut Heap) -> Self {
        match self {
            Self::Int(v) => Self::Int(*v),
            Self::Float(v) => Self::Float(*v),
            Self::Bool(v) => Self::Bool(*v),
            Self::Ref(id) => {
                heap.inc_ref(*id);
                Self::Ref(*id)
            }
        }
    }

    /// Releases a cell: for `Ref`, decrements the target's refcount,
    /// invoking the class's release descriptor through [`Heap::dec_ref`] if
    /// it reaches zero. Must be called on every cell a frame or the operand
    /// stack drops.
    pub fn release(self, heap: &mut Heap) {
        if let Self::Ref(id) = self {
            heap.dec_ref(id);
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Bool(_) => "Bool",
            Self::Ref(_) => "Ref",
        }
    }
}

#[cfg(feature = "ref-count-panic")]
impl Drop for Cell {
    fn drop(&mut self) {
        if let Self::Ref(id) = self {
            if !id.is_null() {
                panic!("Cell::Ref({id:?}) dropped without going through Cell::release");
            }
        }
    }
}

/// Stringifies a cell per spec.md §6's `print` rules: nil prints `"Nil"`,
/// bools print `"True"`/`"False"`, floats always show at least one
/// fractional digit. `Ref` objects other than nil stringify through the
/// class's stringify vtable slot, resolved by the VM — this function only
/// covers the cases reachable without a heap lookup.
pub fn stringify_immediate(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Int(v) => Some(v.to_string()),
        Cell::Bool(v) => Some(if *v { "True".to_owned() } else { "False".to_owned() }),
        Cell::Float(v) => Some(stringify_float(*v)),
        Cell::Ref(id) if id.is_null() => Some("Nil".to_owned()),
        Cell::Ref(_) => None,
    }
}

/// `ryu` always emits a decimal point, so `0.0` already stringifies as
/// `"0.0"` rather than `"0"` — satisfying spec.md §9's float-stringification
/// open question (the integer special case) without extra handling. Digits
/// beyond that are whatever `ryu`'s shortest round-trip representation
/// produces, matching the open question's "default precision of the host
/// number-to-string" policy.
pub fn stringify_float(v: f64) -> String {
    let mut buf = ryu::Buffer::new();
    buf.format(v).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_stringifies_as_nil() {
        assert_eq!(stringify_immediate(&Cell::NIL), Some("Nil".to_owned()));
    }

    #[test]
    fn zero_float_keeps_fractional_digit() {
        assert_eq!(stringify_float(0.0), "0.0");
    }

    #[test]
    fn bools_use_python_style_capitalization() {
        assert_eq!(stringify_immediate(&Cell::Bool(true)), Some("True".to_owned()));
        assert_eq!(stringify_immediate(&Cell::Bool(false)), Some("False".to_owned()));
    }
}
