//! Disk access confined to a session's working root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::Error;

/// The on-disk project a session edits. Every path handed in is relative to
/// `root` and may not escape it.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Working root.
    root: PathBuf,
}

impl Workspace {
    /// A workspace rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        return Self { root: root.into() };
    }

    /// Copy `relative` to `<relative>.bak` and return the original text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, or `Error::WriteFailed`
    /// if the backup cannot be written.
    pub fn backup(&self, relative: &Path) -> Result<String, Error> {
        let original = self.read(relative)?;
        let mut backup = relative.as_os_str().to_owned();
        backup.push(".bak");
        self.write(Path::new(&backup), &original)?;
        tracing::debug!(file = %relative.display(), "backup written");
        return Ok(original);
    }

    /// Whether `relative` exists under the root.
    pub fn exists(&self, relative: &Path) -> bool {
        return self.resolve(relative).is_ok_and(|p| return p.is_file());
    }

    /// Read a file under the root.
    ///
    /// # Errors
    ///
    /// Returns `Error::PathOutsideRoot` or `Error::Io`.
    pub fn read(&self, relative: &Path) -> Result<String, Error> {
        let path = self.resolve(relative)?;
        return Ok(fs::read_to_string(path)?);
    }

    /// Write a file under the root, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `Error::PathOutsideRoot` or `Error::WriteFailed`.
    pub fn write(&self, relative: &Path, content: &str) -> Result<(), Error> {
        let path = self.resolve(relative)?;
        let write_failed = |source: std::io::Error| {
            return Error::WriteFailed {
                path: relative.to_path_buf(),
                source,
            };
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        fs::write(&path, content).map_err(write_failed)?;
        return Ok(());
    }

    /// Join a relative path onto the root, rejecting anything that could
    /// leave it.
    fn resolve(&self, relative: &Path) -> Result<PathBuf, Error> {
        let escapes = relative.as_os_str().is_empty()
            || relative
                .components()
                .any(|c| return !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::PathOutsideRoot {
                path: relative.to_path_buf(),
            });
        }
        return Ok(self.root.join(relative));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write(Path::new("src/pages/About.tsx"), "x").unwrap();
        assert_eq!(ws.read(Path::new("src/pages/About.tsx")).unwrap(), "x");
        assert!(ws.exists(Path::new("src/pages/About.tsx")));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        for bad in ["../x.ts", "/etc/passwd", "src/../../x.ts", ""] {
            assert!(matches!(ws.write(Path::new(bad), "x"), Err(Error::PathOutsideRoot { .. })), "{bad}");
        }
    }

    #[test]
    fn backup_copies_original() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        ws.write(Path::new("src/index.css"), "a {}").unwrap();
        assert_eq!(ws.backup(Path::new("src/index.css")).unwrap(), "a {}");
        assert_eq!(ws.read(Path::new("src/index.css.bak")).unwrap(), "a {}");
    }
}
