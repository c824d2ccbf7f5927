//! The filesystem capability consumed by file-backed resources.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// What exists at a probed path.
#[derive(Clone, Debug, PartialEq)]
pub enum FsEntry {
    Missing,

    /// A regular file. `mode` carries the Unix permission bits when the implementation tracks
    /// them; implementations that don't report `None`.
    File { mode: Option<u32> },

    Directory,

    /// A symlink and the target it points at, unresolved.
    Symlink { target: PathBuf },
}

/// Blocking filesystem access.
///
/// Creating parent directories is this capability's responsibility, not the resources':
/// [write](Self::write), [create_dir](Self::create_dir), and [symlink](Self::symlink) must
/// create any missing parents themselves.
pub trait Filesystem {
    /// Inspects `path` without following symlinks.
    fn probe(&self, path: &str) -> io::Result<FsEntry>;

    /// Reads the file at `path`. Returns `None` if nothing exists there.
    fn read(&self, path: &str) -> io::Result<Option<String>>;

    /// Writes `content` to the file at `path`, replacing any existing content.
    fn write(&self, path: &str, content: &str) -> io::Result<()>;

    /// Creates the directory at `path`, recursively.
    fn create_dir(&self, path: &str) -> io::Result<()>;

    /// Creates a symlink at `path` pointing at `target`. Fails if `path` already exists.
    fn symlink(&self, path: &str, target: &str) -> io::Result<()>;

    /// Sets the Unix permission bits of `path`.
    fn set_mode(&self, path: &str, mode: u32) -> io::Result<()>;

    /// Removes whatever exists at `path`; a directory is removed with its entire tree.
    fn remove(&self, path: &str) -> io::Result<()>;
}

/// Expands a leading `~` to the current user's home directory.
///
/// Only the `~` and `~/...` forms are expanded; `~user/...` is passed through untouched, as is
/// any path that does not start with a tilde.
pub fn expand(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = home::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// The real, production [Filesystem]: `std::fs` with `~` expansion on every path.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn probe(&self, path: &str) -> io::Result<FsEntry> {
        let path = expand(path);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(FsEntry::Missing),
            Err(err) => return Err(err),
        };

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            Ok(FsEntry::Symlink { target })
        } else if file_type.is_dir() {
            Ok(FsEntry::Directory)
        } else {
            Ok(FsEntry::File {
                mode: Some(metadata.permissions().mode() & 0o777),
            })
        }
    }

    fn read(&self, path: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(expand(path)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write(&self, path: &str, content: &str) -> io::Result<()> {
        let path = expand(path);
        create_parents(&path)?;
        fs::write(path, content)
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(expand(path))
    }

    fn symlink(&self, path: &str, target: &str) -> io::Result<()> {
        let path = expand(path);
        create_parents(&path)?;
        std::os::unix::fs::symlink(expand(target), path)
    }

    fn set_mode(&self, path: &str, mode: u32) -> io::Result<()> {
        fs::set_permissions(expand(path), fs::Permissions::from_mode(mode))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let path = expand(path);
        let metadata = fs::symlink_metadata(&path)?;
        if metadata.file_type().is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }
}

fn create_parents(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
