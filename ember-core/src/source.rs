use std::{
    fmt::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use sha2::{Digest, Sha256};

/// The text of a loaded source file.
#[derive(Clone, Debug)]
pub struct SourceFile {
    /// The path the file was found at, used as its identity.
    pub path: PathBuf,
    pub text: Arc<str>,
    /// Hex SHA-256 of `text`.
    pub hash: String,
}

impl SourceFile {
    pub fn new(path: PathBuf, text: Arc<str>) -> Self {
        let hash = content_hash(&text);
        SourceFile { path, text, hash }
    }
}

/// Finds the files named by `include` statements.
pub trait SourceLoader {
    /// Load `path`, as written in the including file.  The error is a reason fit for a
    /// diagnostic.
    fn load(&self, path: &str) -> Result<SourceFile, String>;
}

/// Loads files from disk, resolving relative paths against `root`.
#[derive(Clone, Debug)]
pub struct FsSourceLoader {
    root: PathBuf,
}

impl FsSourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsSourceLoader { root: root.into() }
    }
}

impl SourceLoader for FsSourceLoader {
    fn load(&self, path: &str) -> Result<SourceFile, String> {
        let path = Path::new(path);
        let full_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let text = std::fs::read_to_string(&full_path).map_err(|err| err.to_string())?;
        Ok(SourceFile::new(full_path, Arc::from(text)))
    }
}

/// Hex encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest
        .iter()
        .fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a = 1"), content_hash("a = 2"));
    }

    #[test]
    fn loads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.em"), "x = 1\n").unwrap();
        let loader = FsSourceLoader::new(dir.path());

        let file = loader.load("lib.em").unwrap();
        assert_eq!(&*file.text, "x = 1\n");
        assert_eq!(file.hash, content_hash("x = 1\n"));
        assert!(loader.load("missing.em").is_err());
    }
}
