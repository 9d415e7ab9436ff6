use rustc_hash::FxHashMap;

/// A variable of the function being built, see [`super::ssa::SsaState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(super) struct VarId(pub(super) usize);

/// Source names visible at the current point of a function, one map per nested syntax block.
///
/// The first map is the function scope, which outlives every block.
pub(super) struct LexicalMap {
    symbol_map: Vec<FxHashMap<String, VarId>>,
}

impl LexicalMap {
    pub(super) fn new() -> Self {
        LexicalMap {
            symbol_map: vec![FxHashMap::default()],
        }
    }

    pub(super) fn enter_scope(&mut self) -> &mut Self {
        self.symbol_map.push(FxHashMap::default());
        self
    }

    pub(super) fn leave_scope(&mut self) -> &mut Self {
        assert!(self.symbol_map.len() > 1);
        self.symbol_map.pop();
        self
    }

    pub(super) fn get(&self, symbol: &str) -> Option<VarId> {
        self.symbol_map
            .iter()
            .rev()
            .find_map(|scope| scope.get(symbol).copied())
    }

    /// Bind `symbol` in the innermost scope, shadowing any outer binding.
    pub(super) fn insert(&mut self, symbol: String, var: VarId) {
        self.symbol_map
            .last_mut()
            .expect("LexicalMap should always have at least the function scope.")
            .insert(symbol, var);
    }

    pub(super) fn insert_function_scope(&mut self, symbol: String, var: VarId) {
        self.symbol_map[0].insert(symbol, var);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_expire() {
        let mut map = LexicalMap::new();
        map.insert("a".to_owned(), VarId(0));
        map.enter_scope().insert("a".to_owned(), VarId(1));
        map.insert_function_scope("b".to_owned(), VarId(2));
        assert_eq!(map.get("a"), Some(VarId(1)));

        map.leave_scope();
        assert_eq!(map.get("a"), Some(VarId(0)));
        assert_eq!(map.get("b"), Some(VarId(2)));
        assert_eq!(map.get("c"), None);
    }

    #[test]
    #[should_panic]
    fn function_scope_cannot_be_left() {
        LexicalMap::new().leave_scope();
    }
}
