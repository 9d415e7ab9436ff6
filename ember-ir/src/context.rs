//! The main handle to an IR instance.
//!
//! [`Context`] contains several [slotmap](https://github.com/orlp/slotmap) collections to maintain
//! the IR ECS.
//!
//! It is passed around as a mutable reference to many of the Ember IR APIs.

use rustc_hash::FxHashMap;
use slotmap::{DefaultKey, SlotMap};

use crate::{
    block::BlockContent,
    function::FunctionContent,
    irtype::{Type, TypeContent},
    package::{PackageContent, PackageIterator},
    value::ValueContent,
};

/// The main IR context handle.
///
/// Every package, function, block and value is stored here.  Types are interned so two equal
/// [`TypeContent`]s always share one [`Type`] handle.
pub struct Context {
    pub(crate) packages: SlotMap<DefaultKey, PackageContent>,
    pub(crate) functions: SlotMap<DefaultKey, FunctionContent>,
    pub(crate) blocks: SlotMap<DefaultKey, BlockContent>,
    pub(crate) values: SlotMap<DefaultKey, ValueContent>,
    pub(crate) types: SlotMap<DefaultKey, TypeContent>,
    pub(crate) type_map: FxHashMap<TypeContent, Type>,

    next_unique_sym_tag: u64,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let mut context = Context {
            packages: SlotMap::new(),
            functions: SlotMap::new(),
            blocks: SlotMap::new(),
            values: SlotMap::new(),
            types: SlotMap::new(),
            type_map: FxHashMap::default(),
            next_unique_sym_tag: 0,
        };
        Type::create_basic_types(&mut context);
        context
    }

    /// Return an iterator for every package in this context.
    pub fn package_iter(&self) -> PackageIterator {
        PackageIterator::new(self)
    }

    /// Get a globally unique symbol.
    ///
    /// The name will be in the form `"anon_N"`, where `N` is an incrementing decimal.
    pub fn get_unique_name(&mut self) -> String {
        format!("anon_{}", self.get_unique_id())
    }

    /// Get a globally unique symbol id.
    pub fn get_unique_id(&mut self) -> u64 {
        let sym = self.next_unique_sym_tag;
        self.next_unique_sym_tag += 1;
        sym
    }
}

use std::fmt::{Display, Error, Formatter};

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", crate::printer::to_string(self))
    }
}

impl From<Context> for String {
    fn from(context: Context) -> Self {
        crate::printer::to_string(&context)
    }
}
