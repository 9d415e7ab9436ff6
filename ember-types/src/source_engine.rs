use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use rustc_hash::FxHashMap;

use crate::SourceId;

/// Maps file paths to small integer [SourceId]s and back.
///
/// The internal maps sit behind `RwLock`s so the engine can be shared by reference.
#[derive(Debug, Default)]
pub struct SourceEngine {
    next_id: RwLock<u32>,
    source_map: RwLock<FxHashMap<PathBuf, SourceId>>,
    path_map: RwLock<FxHashMap<SourceId, PathBuf>>,
}

impl SourceEngine {
    /// Return the ID registered for `path`, registering a fresh one if needed.
    pub fn get_source_id(&self, path: &Path) -> SourceId {
        if let Some(source_id) = self.source_map.read().unwrap().get(path) {
            return *source_id;
        }

        let mut next_id = self.next_id.write().unwrap();
        let mut source_map = self.source_map.write().unwrap();
        // Another writer may have registered the path between the two locks.
        if let Some(source_id) = source_map.get(path) {
            return *source_id;
        }
        let source_id = SourceId::new(*next_id);
        *next_id += 1;
        source_map.insert(path.to_path_buf(), source_id);
        self.path_map
            .write()
            .unwrap()
            .insert(source_id, path.to_path_buf());
        source_id
    }

    pub fn get_path(&self, source_id: &SourceId) -> Option<PathBuf> {
        self.path_map.read().unwrap().get(source_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_per_path() {
        let engine = SourceEngine::default();
        let a = engine.get_source_id(Path::new("a.em"));
        let b = engine.get_source_id(Path::new("b.em"));
        assert_ne!(a, b);
        assert_eq!(engine.get_source_id(Path::new("a.em")), a);
        assert_eq!(engine.get_path(&b), Some(PathBuf::from("b.em")));
    }
}
