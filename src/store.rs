// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Project-root confinement and atomic file writes.
//!
//! Every path a client supplies is relative to one [`ProjectRoot`]; anything
//! that would land outside it — absolute paths, `..` traversal, or a symlink
//! pointing elsewhere — is refused before any filesystem access happens.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub enum StoreError {
    /// The supplied path would resolve outside the project root.
    Escape { path: PathBuf },
    /// The target exists but is a symlink; writing through it could escape
    /// the root.
    SymlinkRefused { path: PathBuf },
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Escape { path } => {
                write!(f, "path escapes the project root: {}", path.display())
            }
            Self::SymlinkRefused { path } => {
                write!(f, "refusing to write through symlink: {}", path.display())
            }
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A canonicalized directory all file operations are confined to.
#[derive(Debug)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    /// Creates the directory if needed and canonicalizes it so later
    /// prefix checks compare real paths.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let root = fs::canonicalize(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves a client-supplied relative path to an absolute path inside
    /// the root.
    ///
    /// The check is both lexical (no `..` may pop past the root, absolute
    /// paths are rejected outright) and physical (the nearest existing
    /// ancestor must canonicalize to somewhere under the root, which catches
    /// symlinked directories).
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let supplied = Path::new(relative);
        if supplied.is_absolute() {
            return Err(StoreError::Escape { path: supplied.to_path_buf() });
        }

        let mut normalized = PathBuf::new();
        for component in supplied.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(StoreError::Escape { path: supplied.to_path_buf() });
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::Escape { path: supplied.to_path_buf() });
                }
            }
        }

        let candidate = self.root.join(&normalized);

        if let Ok(metadata) = fs::symlink_metadata(&candidate) {
            if metadata.file_type().is_symlink() {
                return Err(StoreError::SymlinkRefused { path: candidate });
            }
        }

        // Canonicalize the nearest existing ancestor; a symlinked parent
        // directory could otherwise smuggle the file outside the root.
        let mut ancestor = candidate.as_path();
        loop {
            if ancestor.exists() {
                let real = fs::canonicalize(ancestor).map_err(|source| StoreError::Io {
                    path: ancestor.to_path_buf(),
                    source,
                })?;
                if !real.starts_with(&self.root) {
                    return Err(StoreError::Escape { path: supplied.to_path_buf() });
                }
                break;
            }
            match ancestor.parent() {
                Some(parent) => ancestor = parent,
                None => break,
            }
        }

        Ok(candidate)
    }

    pub fn read(&self, relative: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(relative)?;
        fs::read(&path).map_err(|source| StoreError::Io { path, source })
    }

    /// Writes a file atomically: the content lands in a unique sibling temp
    /// file first and is renamed into place, so readers never observe a
    /// partial file and a failed write leaves the original untouched.
    pub fn write_atomic(&self, relative: &str, contents: &str) -> Result<PathBuf, StoreError> {
        let path = self.resolve(relative)?;
        let io_err = |at: &Path| {
            let at = at.to_path_buf();
            move |source| StoreError::Io { path: at, source }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out".to_owned());
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or(0);
        let temp = path.with_file_name(format!(
            ".proteus.tmp.{file_name}.{}.{nanos}",
            std::process::id()
        ));

        fs::write(&temp, contents).map_err(io_err(&temp))?;
        if let Err(source) = rename_overwrite(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::Io { path, source });
        }
        Ok(path)
    }
}

fn rename_overwrite(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        #[cfg(windows)]
        Err(_) if to.exists() => {
            fs::remove_file(to)?;
            fs::rename(from, to)
        }
        Err(err) => Err(err),
    }
}
