use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

pub mod ident;
pub use ident::*;

pub mod source_engine;
pub use source_engine::*;

pub mod span;
pub use span::*;

pub type FxIndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<FxHasher>>;
pub type FxIndexSet<K> = indexmap::IndexSet<K, BuildHasherDefault<FxHasher>>;

/// A unique ID for a source file registered with the [SourceEngine].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceId {
    id: u32,
}

impl SourceId {
    pub fn new(id: u32) -> Self {
        SourceId { id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.id)
    }
}

pub trait Spanned {
    fn span(&self) -> Span;
}

impl<T: Spanned> Spanned for Box<T> {
    fn span(&self) -> Span {
        (**self).span()
    }
}
