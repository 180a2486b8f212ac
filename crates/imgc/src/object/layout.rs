//! Type Layout - Tells the GC where pointer fields are located within objects
//!
//! The collector never looks at a live type system. Everything it needs to
//! know about an object (size, which words are references, whether it is a
//! weak reference or owns a finalizer) comes from a [`TypeLayoutProvider`]
//! injected when the collector is created. [`TypeTable`] is the provider
//! used in practice: a table of [`TypeInfo`] entries indexed by type id.
//!
//! # Layout
//!
//! ```text
//! Struct:   [header][ field 0 | field 1 | ... ]            size bytes
//! Array:    [header][ fixed part (length word) ][ item 0 | item 1 | ... ]
//! WeakRef:  [header][ ... weak pointer ... ]               never traced
//! ```
//!
//! All offsets are relative to the first byte after the header.
//!
//! # Example
//!
//! ```rust
//! use imgc::object::{TypeInfo, TypeTable};
//!
//! let mut table = TypeTable::new();
//! // Node { next: ref, value: i64 }
//! let node = table.register(TypeInfo::struct_type("Node", 16, vec![0]));
//! assert_eq!(table.get(node).map(|info| info.name.as_str()), Some("Node"));
//! ```

use crate::object::header::{header, TypeId, HEADER_SIZE, MIN_OBJECT_SIZE};
use crate::util::{read_word, Alignment, WORD};

/// Shape of an object, keyed by its type id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Fixed-size object
    Struct {
        /// Payload bytes (header excluded)
        size: usize,
        /// Offsets of reference fields
        gc_offsets: Vec<usize>,
    },

    /// Variable-length object: a fixed part followed by `length` items
    Array {
        /// Bytes of the fixed part, which holds the length word
        fixed_size: usize,
        /// Offset of the length word inside the fixed part
        length_offset: usize,
        /// Bytes per item
        item_size: usize,
        /// Reference fields in the fixed part
        gc_offsets: Vec<usize>,
        /// Reference fields inside each item
        item_gc_offsets: Vec<usize>,
    },

    /// Fixed-size object holding one weak pointer
    WeakRef {
        /// Payload bytes (header excluded)
        size: usize,
        /// Offset of the weak pointer
        weakptr_offset: usize,
    },
}

/// Everything the collector knows about one type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Human-readable name, used in diagnostics only
    pub name: String,
    /// Object shape
    pub layout: Layout,
    /// Objects of this type are queued for finalization when unreachable
    pub has_finalizer: bool,
}

impl TypeInfo {
    /// Fixed-size type with `size` payload bytes
    pub fn struct_type(name: impl Into<String>, size: usize, gc_offsets: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            layout: Layout::Struct { size, gc_offsets },
            has_finalizer: false,
        }
    }

    /// Array whose fixed part is just the length word
    pub fn array_type(name: impl Into<String>, item_size: usize, item_gc_offsets: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            layout: Layout::Array {
                fixed_size: WORD,
                length_offset: 0,
                item_size,
                gc_offsets: Vec::new(),
                item_gc_offsets,
            },
            has_finalizer: false,
        }
    }

    /// Weak reference with a single pointer field
    pub fn weakref_type(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: Layout::WeakRef {
                size: WORD,
                weakptr_offset: 0,
            },
            has_finalizer: false,
        }
    }

    /// Mark the type as owning a finalizer
    pub fn with_finalizer(mut self) -> Self {
        self.has_finalizer = true;
        self
    }

    /// Check if objects carry a length word
    #[inline]
    pub fn is_varsize(&self) -> bool {
        matches!(self.layout, Layout::Array { .. })
    }

    #[inline]
    pub fn is_weakref(&self) -> bool {
        matches!(self.layout, Layout::WeakRef { .. })
    }

    /// Check if tracing can find any strong reference
    pub fn has_gc_pointers(&self) -> bool {
        match &self.layout {
            Layout::Struct { gc_offsets, .. } => !gc_offsets.is_empty(),
            Layout::Array {
                gc_offsets,
                item_gc_offsets,
                ..
            } => !gc_offsets.is_empty() || !item_gc_offsets.is_empty(),
            Layout::WeakRef { .. } => false,
        }
    }

    /// Check if the items of an array contain references
    pub fn has_gc_items(&self) -> bool {
        matches!(&self.layout, Layout::Array { item_gc_offsets, .. } if !item_gc_offsets.is_empty())
    }

    /// Payload bytes of the fixed part
    pub fn fixed_payload(&self) -> usize {
        match &self.layout {
            Layout::Struct { size, .. } | Layout::WeakRef { size, .. } => *size,
            Layout::Array { fixed_size, .. } => *fixed_size,
        }
    }

    /// Total object size (header included) for `payload` bytes
    #[inline]
    pub fn total_size_for_payload(payload: usize) -> usize {
        Alignment::word_align(HEADER_SIZE + payload).max(MIN_OBJECT_SIZE)
    }

    /// Total size of an array of `length` items, or `None` on overflow
    pub fn varsize_total_size(&self, length: usize) -> Option<usize> {
        match &self.layout {
            Layout::Array {
                fixed_size,
                item_size,
                ..
            } => {
                let items = item_size.checked_mul(length)?;
                let payload = fixed_size.checked_add(items)?;
                payload.checked_add(HEADER_SIZE + WORD)?;
                Some(Self::total_size_for_payload(payload))
            }
            _ => Some(Self::total_size_for_payload(self.fixed_payload())),
        }
    }

    /// Address of the length word of an array object
    #[inline]
    pub fn length_slot(&self, obj: usize) -> Option<usize> {
        match &self.layout {
            Layout::Array { length_offset, .. } => Some(obj + HEADER_SIZE + length_offset),
            _ => None,
        }
    }

    /// Address of the weak pointer of a weakref object
    #[inline]
    pub fn weakptr_slot(&self, obj: usize) -> Option<usize> {
        match &self.layout {
            Layout::WeakRef { weakptr_offset, .. } => Some(obj + HEADER_SIZE + weakptr_offset),
            _ => None,
        }
    }

    /// Address of item `index` of an array object
    #[inline]
    pub fn item_address(&self, obj: usize, index: usize) -> Option<usize> {
        match &self.layout {
            Layout::Array {
                fixed_size,
                item_size,
                ..
            } => Some(obj + HEADER_SIZE + fixed_size + index * item_size),
            _ => None,
        }
    }

    /// Number of items of an array object (0 for other layouts)
    ///
    /// # Safety
    /// `obj` must be a live object of this type.
    #[inline]
    pub unsafe fn length(&self, obj: usize) -> usize {
        match self.length_slot(obj) {
            Some(slot) => read_word(slot),
            None => 0,
        }
    }

    /// Total size of a live object (header included)
    ///
    /// # Safety
    /// `obj` must be a live object of this type.
    pub unsafe fn object_size(&self, obj: usize) -> usize {
        let length = self.length(obj);
        self.varsize_total_size(length)
            .unwrap_or_else(|| Self::total_size_for_payload(self.fixed_payload()))
    }

    /// Call `f` with the address of every strong reference slot of `obj`
    ///
    /// # Safety
    /// `obj` must be a live object of this type.
    pub unsafe fn for_each_ref(&self, obj: usize, mut f: impl FnMut(usize)) {
        let data = obj + HEADER_SIZE;
        match &self.layout {
            Layout::Struct { gc_offsets, .. } => {
                for offset in gc_offsets {
                    f(data + offset);
                }
            }
            Layout::Array {
                gc_offsets,
                item_gc_offsets,
                ..
            } => {
                for offset in gc_offsets {
                    f(data + offset);
                }
                if !item_gc_offsets.is_empty() {
                    self.for_each_item_ref(obj, 0, self.length(obj), f);
                }
            }
            Layout::WeakRef { .. } => {}
        }
    }

    /// Call `f` for the reference slots of items `start..stop` only
    ///
    /// Used when rescanning single cards of a large array.
    ///
    /// # Safety
    /// `obj` must be a live array of this type and `stop <= length`.
    pub unsafe fn for_each_item_ref(
        &self,
        obj: usize,
        start: usize,
        stop: usize,
        mut f: impl FnMut(usize),
    ) {
        if let Layout::Array {
            fixed_size,
            item_size,
            item_gc_offsets,
            ..
        } = &self.layout
        {
            let mut item = obj + HEADER_SIZE + fixed_size + start * item_size;
            for _ in start..stop {
                for offset in item_gc_offsets {
                    f(item + offset);
                }
                item += item_size;
            }
        }
    }
}

/// Capability interface the collector uses to inspect objects
///
/// Implementations must be immutable once handed to a collector: a type id
/// that resolved once must always resolve to the same layout.
pub trait TypeLayoutProvider: Send + Sync {
    /// Look up a type id
    fn type_info(&self, type_id: TypeId) -> Option<&TypeInfo>;

    /// Look up the type of a live object
    ///
    /// # Safety
    /// `obj` must be the address of a live object.
    unsafe fn info_of(&self, obj: usize) -> Option<&TypeInfo> {
        self.type_info(header(obj).type_id())
    }
}

/// Table of types indexed by type id
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
}

impl TypeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self { types: Vec::new() }
    }

    /// Add a type and return its id
    pub fn register(&mut self, info: TypeInfo) -> TypeId {
        let id = self.types.len() as TypeId;
        self.types.push(info);
        id
    }

    /// Look up a type id
    pub fn get(&self, type_id: TypeId) -> Option<&TypeInfo> {
        self.types.get(type_id as usize)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeLayoutProvider for TypeTable {
    fn type_info(&self, type_id: TypeId) -> Option<&TypeInfo> {
        self.get(type_id)
    }
}
