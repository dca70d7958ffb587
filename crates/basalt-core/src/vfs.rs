//! Virtual file system interface consumed by the definition loader.
//!
//! The real asset pipeline lives outside this workspace; the loader only
//! needs to enumerate declaration files below a folder and read them as
//! text, and the writer needs to know whether a definition is backed by
//! a physical file it may rewrite.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BasaltResult;

/// Provenance of a loaded definition: which file it came from and
/// whether that file physically exists on disk (as opposed to living
/// inside an archive or being generated in memory).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfo {
    /// Folder the file was found under, e.g. "materials/".
    pub top_dir: String,
    /// Path relative to `top_dir`, e.g. "rocks.mtr". Empty for
    /// definitions that were never loaded from a file.
    pub name: String,
    /// True when the file is a plain file on disk that can be rewritten.
    pub is_physical: bool,
}

impl FileInfo {
    pub fn new(top_dir: impl Into<String>, name: impl Into<String>, is_physical: bool) -> Self {
        Self {
            top_dir: top_dir.into(),
            name: name.into(),
            is_physical,
        }
    }

    /// Relative path below the VFS root, `top_dir` joined with `name`.
    pub fn full_path(&self) -> String {
        if self.top_dir.is_empty() {
            return self.name.clone();
        }
        format!("{}/{}", self.top_dir.trim_end_matches('/'), self.name)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// The file enumeration/read interface the loader consumes.
pub trait Vfs: Send + Sync {
    /// Invoke `callback` for every file with the given extension below
    /// `folder`, passing the file's provenance record.
    fn for_each_file(&self, folder: &str, extension: &str, callback: &mut dyn FnMut(&FileInfo));

    /// Read the file identified by a relative path as UTF-8 text.
    fn read_text_file(&self, relative_path: &str) -> BasaltResult<String>;
}

/// Plain directory-backed VFS used by the loader in tests and by
/// standalone tooling. Walks the tree below a root directory.
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn visit_dir(
        &self,
        dir: &Path,
        folder: &str,
        extension: &str,
        callback: &mut dyn FnMut(&FileInfo),
    ) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.visit_dir(&path, folder, extension, callback);
            } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                let base = self.root.join(folder);
                if let Ok(relative) = path.strip_prefix(&base) {
                    let info = FileInfo::new(folder, relative.to_string_lossy(), true);
                    callback(&info);
                }
            }
        }
    }
}

impl Vfs for DiskFileSystem {
    fn for_each_file(&self, folder: &str, extension: &str, callback: &mut dyn FnMut(&FileInfo)) {
        let base = self.root.join(folder);
        self.visit_dir(&base, folder, extension, callback);
    }

    fn read_text_file(&self, relative_path: &str) -> BasaltResult<String> {
        Ok(fs::read_to_string(self.root.join(relative_path))?)
    }
}
