// arena.rs - Index-addressed object pools shared by the tree, the trie
// and the matcher.
//
// Nodes refer to each other by dense `u32` indices instead of pointers.
// An arena is owned by the structure that uses it and is cleared as a
// whole; individual slots are never freed.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A dense index into an [`Arena`].
pub trait ArenaIndex: Copy + Eq {
    fn from_usize(index: usize) -> Self;
    fn to_usize(self) -> usize;
}

/// Declare a `u32` newtype usable as an arena index.
macro_rules! arena_index {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis struct $name(u32);

        impl $crate::arena::ArenaIndex for $name {
            #[inline]
            fn from_usize(index: usize) -> Self {
                debug_assert!(index <= u32::MAX as usize);
                $name(index as u32)
            }
            #[inline]
            fn to_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                $name(raw)
            }

            /// Raw slot number.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}
pub(crate) use arena_index;

/// Growable pool of `T` addressed by `I`.
#[derive(Clone)]
pub struct Arena<I, T> {
    items: Vec<T>,
    _index: PhantomData<fn() -> I>,
}

impl<I: ArenaIndex, T> Arena<I, T> {
    pub fn new() -> Self {
        Arena {
            items: Vec::new(),
            _index: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
            _index: PhantomData,
        }
    }

    /// Store `value` and return its index.
    #[inline]
    pub fn alloc(&mut self, value: T) -> I {
        let id = I::from_usize(self.items.len());
        self.items.push(value);
        id
    }

    /// Index the next `alloc` will return.
    #[inline]
    pub fn next_index(&self) -> I {
        I::from_usize(self.items.len())
    }

    #[inline]
    pub fn get(&self, id: I) -> Option<&T> {
        self.items.get(id.to_usize())
    }

    #[inline]
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.items.get_mut(id.to_usize())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every element, keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Release memory beyond what the current elements need.
    pub fn shrink_to_fit(&mut self) {
        self.items.shrink_to_fit();
    }

    /// Bytes reserved by the pool (not counting heap data owned by elements).
    pub fn memory_size(&self) -> usize {
        self.items.capacity() * std::mem::size_of::<T>()
    }

    /// Iterate `(index, element)` in allocation order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (I, &T)> + ExactSizeIterator {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (I::from_usize(i), item))
    }

    /// Iterate elements in allocation order.
    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<I: ArenaIndex, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaIndex, T> Index<I> for Arena<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, id: I) -> &T {
        &self.items[id.to_usize()]
    }
}

impl<I: ArenaIndex, T> IndexMut<I> for Arena<I, T> {
    #[inline]
    fn index_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.to_usize()]
    }
}

impl<I: ArenaIndex, T: fmt::Debug> fmt::Debug for Arena<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

// === Byte storage ===

/// A byte range inside a [`ByteArena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    start: u32,
    len: u32,
}

impl Span {
    pub const EMPTY: Span = Span { start: 0, len: 0 };

    #[inline]
    pub fn len(self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Append-only literal buffer; every stored string is addressed by a [`Span`].
#[derive(Clone, Debug, Default)]
pub struct ByteArena {
    buf: Vec<u8>,
}

impl ByteArena {
    pub fn new() -> Self {
        ByteArena { buf: Vec::new() }
    }

    /// Copy `bytes` into the arena.
    pub fn push(&mut self, bytes: &[u8]) -> Span {
        if bytes.is_empty() {
            return Span::EMPTY;
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(bytes);
        Span {
            start: start as u32,
            len: bytes.len() as u32,
        }
    }

    /// Store the concatenation of already stored spans.
    pub fn concat(&mut self, parts: &[Span]) -> Span {
        let start = self.buf.len();
        for part in parts {
            let from = part.start as usize;
            self.buf.extend_from_within(from..from + part.len());
        }
        let len = self.buf.len() - start;
        if len == 0 {
            return Span::EMPTY;
        }
        Span {
            start: start as u32,
            len: len as u32,
        }
    }

    #[inline]
    pub fn get(&self, span: Span) -> &[u8] {
        let start = span.start as usize;
        &self.buf[start..start + span.len()]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn shrink_to_fit(&mut self) {
        self.buf.shrink_to_fit();
    }

    pub fn memory_size(&self) -> usize {
        self.buf.capacity()
    }
}
