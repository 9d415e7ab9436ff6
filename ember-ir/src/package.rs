//! A scope containing a collection of [`Function`]s, one per compiled source unit.
//!
//! The first function in a package is the unit's `main` function; every closure built from the
//! unit follows it in creation order.

use rustc_hash::FxHashMap;

use crate::{
    context::Context,
    function::{Function, FunctionIterator},
    value::Value,
};

/// A wrapper around an [ECS](https://github.com/orlp/slotmap) handle into the [`Context`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Package(pub slotmap::DefaultKey);

#[doc(hidden)]
pub struct PackageContent {
    pub name: String,
    pub functions: Vec<Function>,
}

impl Package {
    /// Return a new package handle.
    pub fn new(context: &mut Context, name: &str) -> Package {
        let content = PackageContent {
            name: name.to_owned(),
            functions: Vec::new(),
        };
        Package(context.packages.insert(content))
    }

    pub fn get_name<'a>(&self, context: &'a Context) -> &'a str {
        &context.packages[self.0].name
    }

    /// The unit's top-level function, if it has been created.
    pub fn get_main(&self, context: &Context) -> Option<Function> {
        context.packages[self.0].functions.first().copied()
    }

    /// Return an iterator over each of the [`Function`]s in this package, in creation order.
    pub fn function_iter(&self, context: &Context) -> FunctionIterator {
        FunctionIterator::new(context, self)
    }

    /// Replace every use of `old_val` with `new_val` in every function of this package.
    pub fn replace_value(&self, context: &mut Context, old_val: Value, new_val: Value) {
        let mut replace_map = FxHashMap::default();
        replace_map.insert(old_val, new_val);
        for function in self.function_iter(context) {
            function.replace_values(context, &replace_map);
        }
    }
}

/// An iterator over each [`Package`] in a [`Context`].
pub struct PackageIterator {
    packages: Vec<slotmap::DefaultKey>,
    next: usize,
}

impl PackageIterator {
    /// Return a new [`Package`] iterator.
    pub fn new(context: &Context) -> PackageIterator {
        // Copy all the current package indices, so they may be modified in the context during
        // iteration.
        PackageIterator {
            packages: context.packages.iter().map(|(key, _)| key).collect(),
            next: 0,
        }
    }
}

impl Iterator for PackageIterator {
    type Item = Package;

    fn next(&mut self) -> Option<Package> {
        if self.next < self.packages.len() {
            let idx = self.next;
            self.next += 1;
            Some(Package(self.packages[idx]))
        } else {
            None
        }
    }
}
