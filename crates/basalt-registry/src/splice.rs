//! Splice-based file rewriting support: the insertion-point pattern
//! for a declaration name and a temp-file writer that atomically
//! replaces the target once the new contents are complete.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use basalt_core::{BasaltError, BasaltResult};
use regex::{Regex, RegexBuilder};

/// The line pattern locating a declaration in its source file:
/// optional leading whitespace, an optional type keyword, the name and
/// an optional opening brace, matched case-insensitively.
pub fn decl_name_pattern(name: &str) -> BasaltResult<Regex> {
    let pattern = format!(
        r"^\s*(?:material\s+)?{}\s*(\{{.*)?$",
        regex::escape(name)
    );

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| BasaltError::Other(format!("invalid declaration pattern: {}", err)))
}

/// Writes into `<target>.tmp` next to the target file and renames it
/// over the target on commit. If anything fails before the commit
/// completes, the original file stays untouched and the temp file is
/// cleaned up.
pub struct TempFileWriter {
    target: PathBuf,
    temp_path: PathBuf,
    stream: Option<BufWriter<File>>,
}

impl TempFileWriter {
    pub fn create(target: &Path) -> BasaltResult<Self> {
        let mut temp_os = target.as_os_str().to_owned();
        temp_os.push(".tmp");
        let temp_path = PathBuf::from(temp_os);

        let file = File::create(&temp_path).map_err(|err| {
            BasaltError::save(
                format!("cannot open temporary file: {}", err),
                temp_path.clone(),
            )
        })?;

        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            stream: Some(BufWriter::new(file)),
        })
    }

    pub fn stream(&mut self) -> &mut dyn Write {
        self.stream
            .as_mut()
            .expect("temp file stream is present until commit")
    }

    /// Flush and atomically move the temp file over the target.
    pub fn commit(mut self) -> BasaltResult<()> {
        let stream = self
            .stream
            .take()
            .expect("temp file stream is present until commit");

        stream.into_inner().map_err(|err| {
            BasaltError::save(
                format!("cannot flush temporary file: {}", err),
                self.temp_path.clone(),
            )
        })?;

        fs::rename(&self.temp_path, &self.target).map_err(|err| {
            BasaltError::save(
                format!("cannot replace target file: {}", err),
                self.target.clone(),
            )
        })?;

        // Successful rename, nothing left to clean up
        self.temp_path = PathBuf::new();
        Ok(())
    }
}

impl Drop for TempFileWriter {
    fn drop(&mut self) {
        drop(self.stream.take());
        if !self.temp_path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
