//! Reference-counted heap: the allocator behind every `Cell::Ref`.
//!
//! Grounded on the teacher's `Heap<T>` (`allocate`/`inc_ref`/`dec_ref`/`get`/
//! `get_mut`, free-list slot reuse on deallocation). Venom's VM is
//! single-threaded (spec.md §5), so refcounts are plain `u32` rather than
//! the teacher's `AtomicUsize` — there is no cross-thread sharing to
//! synchronize against here.

use crate::value::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(pub u32);

impl HeapId {
    pub const NULL: Self = Self(u32::MAX);

    pub fn is_null(&self) -> bool {
        self.0 == u32::MAX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassObjId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncDescId(pub u32);

/// Per-class object: name, attribute-slot count, the three descriptor
/// references the VM needs on allocation/release/call, and a vtable of
/// method descriptors indexed by slot.
#[derive(Debug, Clone)]
pub struct ClassObj {
    pub name: String,
    pub attr_count: usize,
    pub init_desc: Option<FuncDescId>,
    pub release_desc: Option<FuncDescId>,
    pub ctor_desc: Option<FuncDescId>,
    pub vtable: Vec<FuncDescId>,
}

/// Backing data for a heap object that isn't plain attribute slots. Only
/// the builtin `String` class uses this today — a Venom `String` instance
/// is a zero-attribute `HeapObject` carrying its bytes here instead.
#[derive(Debug, Clone)]
pub enum NativePayload {
    Str(String),
}

/// Header + body of one heap object: refcount, class-object pointer,
/// attribute slots (cells), and optional native payload for builtin types
/// that don't store their data as `Cell` attributes.
pub struct HeapObject {
    pub refcount: u32,
    pub class: ClassObjId,
    pub attrs: Vec<Cell>,
    pub native: Option<NativePayload>,
}

#[derive(Default)]
pub struct HeapStats {
    pub live_objects: usize,
    pub total_allocated: u64,
}

pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    free_list: Vec<u32>,
    classes: Vec<ClassObj>,
    total_allocated: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            classes: Vec::new(),
            total_allocated: 0,
        }
    }

    pub fn register_class(&mut self, class: ClassObj) -> ClassObjId {
        let id = ClassObjId(u32::try_from(self.classes.len()).expect("class table overflow"));
        self.classes.push(class);
        id
    }

    pub fn class(&self, id: ClassObjId) -> &ClassObj {
        &self.classes[id.0 as usize]
    }

    pub fn class_mut(&mut self, id: ClassObjId) -> &mut ClassObj {
        &mut self.classes[id.0 as usize]
    }

    /// Allocates a new heap object with refcount 1, reusing a free-list slot
    /// when one is available.
    pub fn allocate(&mut self, class: ClassObjId, attrs: Vec<Cell>) -> HeapId {
        self.allocate_obj(HeapObject {
            refcount: 1,
            class,
            attrs,
            native: None,
        })
    }

    /// Allocates a native-backed object (currently only `String` constants)
    /// with no attribute slots.
    pub fn allocate_native(&mut self, class: ClassObjId, native: NativePayload) -> HeapId {
        self.allocate_obj(HeapObject {
            refcount: 1,
            class,
            attrs: Vec::new(),
            native: Some(native),
        })
    }

    fn allocate_obj(&mut self, obj: HeapObject) -> HeapId {
        self.total_allocated += 1;
        if let Some(slot) = self.free_list.pop() {
            self.slots[slot as usize] = Some(obj);
            HeapId(slot)
        } else {
            let id = u32::try_from(self.slots.len()).expect("heap overflow");
            self.slots.push(Some(obj));
            HeapId(id)
        }
    }

    pub fn inc_ref(&mut self, id: HeapId) {
        if id.is_null() {
            return;
        }
        self.slots[id.0 as usize]
            .as_mut()
            .expect("inc_ref on freed heap id")
            .refcount += 1;
    }

    /// Decrements the target's refcount. On reaching zero, recursively
    /// releases every `Ref` attribute cell (the class's release descriptor,
    /// in bytecode-level terms — see `vm::run`'s `DECREF` handling for the
    /// user-method-dispatching counterpart of this), then frees the slot.
    pub fn dec_ref(&mut self, id: HeapId) {
        if id.is_null() {
            return;
        }
        let remaining = {
            let obj = self.slots[id.0 as usize]
                .as_mut()
                .expect("dec_ref on freed heap id");
            obj.refcount -= 1;
            obj.refcount
        };
        if remaining == 0 {
            let obj = self.slots[id.0 as usize]
                .take()
                .expect("heap slot vanished during dec_ref");
            self.free_list.push(id.0);
            for attr in obj.attrs {
                if let Cell::Ref(child) = attr {
                    self.dec_ref(child);
                }
            }
        }
    }

    pub fn get(&self, id: HeapId) -> &HeapObject {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("get on freed heap id")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapObject {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("get_mut on freed heap id")
    }

    pub fn live_refcount(&self, id: HeapId) -> Option<u32> {
        self.slots.get(id.0 as usize)?.as_ref().map(|o| o.refcount)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live_objects: self.slots.iter().filter(|s| s.is_some()).count(),
            total_allocated: self.total_allocated,
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_class(heap: &mut Heap) -> ClassObjId {
        heap.register_class(ClassObj {
            name: "Box".into(),
            attr_count: 1,
            init_desc: None,
            release_desc: None,
            ctor_desc: None,
            vtable: Vec::new(),
        })
    }

    #[test]
    fn refcount_reaching_zero_frees_the_slot() {
        let mut heap = Heap::new();
        let class = dummy_class(&mut heap);
        let id = heap.allocate(class, vec![Cell::Int(7)]);
        assert_eq!(heap.live_refcount(id), Some(1));
        heap.dec_ref(id);
        assert_eq!(heap.live_refcount(id), None);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new();
        let class = dummy_class(&mut heap);
        let first = heap.allocate(class, vec![Cell::Int(1)]);
        heap.dec_ref(first);
        let second = heap.allocate(class, vec![Cell::Int(2)]);
        assert_eq!(first, second);
    }

    #[test]
    fn releasing_a_container_recursively_drops_ref_attributes() {
        let mut heap = Heap::new();
        let class = dummy_class(&mut heap);
        let inner = heap.allocate(class, vec![Cell::Int(1)]);
        let outer = heap.allocate(class, vec![Cell::Ref(inner)]);
        assert_eq!(heap.live_refcount(inner), Some(1));
        heap.dec_ref(outer);
        assert_eq!(heap.live_refcount(inner), None);
    }
}
