//! Build context packaging
//!
//! A build context is the source directory tree, archived as an uncompressed
//! tar stream the engine can consume. Paths inside the archive are relative
//! to the context root.

use crate::error::{DockyardError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Build file expected at the root of every context
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Packaged build context
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Context directory
    pub root: PathBuf,
    /// Tar archive of the directory tree
    pub archive: Bytes,
    /// Number of archived entries (files, directories and links)
    pub entries: usize,
}

impl BuildContext {
    /// Whether the context carries a build file at its root
    pub fn has_dockerfile(&self) -> bool {
        self.root.join(DOCKERFILE_NAME).is_file()
    }

    /// Consume the context, keeping only the archive
    pub fn into_archive(self) -> Bytes {
        self.archive
    }
}

/// Archive `source_dir` into a build context
///
/// The whole tree is walked. Regular files and directories are archived at
/// their path relative to the root; symbolic links are stored as links and
/// never followed; sockets, FIFOs and devices are skipped. The archive is
/// staged in an anonymous temporary file that disappears when this returns.
pub fn package(source_dir: &Path) -> Result<BuildContext> {
    let root = source_dir
        .canonicalize()
        .map_err(|e| archive_error(source_dir, e))?;

    if !root.is_dir() {
        return Err(archive_error(
            source_dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let staged = tempfile::tempfile().map_err(|e| archive_error(&root, e))?;
    let mut builder = tar::Builder::new(staged);
    builder.follow_symlinks(false);

    let mut entries = 0;
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_error(&root, e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(&root)
            .map_err(|e| DockyardError::Internal(e.to_string()))?;

        if relative.as_os_str().is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder
                .append_dir(relative, entry.path())
                .map_err(|e| archive_error(entry.path(), e))?;
        } else if file_type.is_file() || file_type.is_symlink() {
            builder
                .append_path_with_name(entry.path(), relative)
                .map_err(|e| archive_error(entry.path(), e))?;
        } else {
            debug!("Skipping special file {}", entry.path().display());
            continue;
        }
        entries += 1;
    }

    let staged = builder.into_inner().map_err(|e| archive_error(&root, e))?;
    let archive = read_staged(staged).map_err(|e| archive_error(&root, e))?;

    debug!(
        "Packaged {} entries ({} bytes) from {}",
        entries,
        archive.len(),
        root.display()
    );

    Ok(BuildContext {
        root,
        archive,
        entries,
    })
}

fn read_staged(mut staged: File) -> std::io::Result<Bytes> {
    staged.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    staged.read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}

fn archive_error(path: &Path, source: std::io::Error) -> DockyardError {
    DockyardError::Archive {
        path: path.to_path_buf(),
        source,
    }
}
