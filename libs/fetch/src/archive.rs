//! Tarball unpacking.
//!
//! Handles plain and gzip-compressed tar archives. Failures here mean the
//! configured version or URL is wrong, so nothing in this module retries.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};

use crate::error::UnpackError;

/// Unpack `archive` into `dest`, dropping `strip_components` leading path
/// components from every entry. Returns the number of entries written.
pub fn unpack(archive: &Path, dest: &Path, strip_components: usize) -> Result<usize, UnpackError> {
    let open_err = |source| UnpackError::Open {
        archive: archive.to_path_buf(),
        source,
    };

    let gzip = is_gzip(archive).map_err(open_err)?;
    let file = File::open(archive).map_err(open_err)?;
    let reader = BufReader::new(file);

    fs::create_dir_all(dest).map_err(|source| UnpackError::Extract {
        entry: PathBuf::new(),
        dest: dest.to_path_buf(),
        source,
    })?;

    let count = if gzip {
        extract(archive, &mut Archive::new(GzDecoder::new(reader)), dest, strip_components)?
    } else {
        extract(archive, &mut Archive::new(reader), dest, strip_components)?
    };

    info!(
        archive = %archive.display(),
        dest = %dest.display(),
        entries = count,
        "archive unpacked"
    );

    Ok(count)
}

fn extract<R: Read>(
    archive_path: &Path,
    archive: &mut Archive<R>,
    dest: &Path,
    strip_components: usize,
) -> Result<usize, UnpackError> {
    let corrupt = |e: std::io::Error| UnpackError::Corrupt {
        archive: archive_path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut count = 0;
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();

        // Check for path traversal
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            warn!(path = %path.display(), "Skipping entry escaping the destination");
            continue;
        }

        let stripped: PathBuf = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .skip(strip_components)
            .collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }

        if let Some(link) = escaping_link(&entry) {
            warn!(
                path = %path.display(),
                link = %link.display(),
                "Skipping link pointing outside the destination"
            );
            continue;
        }

        // create_dir_all and unpack both follow symlinks already on disk.
        if let Some(ancestor) = symlinked_ancestor(dest, &stripped) {
            warn!(
                path = %path.display(),
                ancestor = %ancestor.display(),
                "Skipping entry below a symlink"
            );
            continue;
        }

        let target = dest.join(&stripped);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| UnpackError::Extract {
                entry: path.clone(),
                dest: target.clone(),
                source,
            })?;
        }

        debug!(entry = %path.display(), target = %target.display(), "extracting");
        entry.unpack(&target).map_err(|source| UnpackError::Extract {
            entry: path.clone(),
            dest: target.clone(),
            source,
        })?;
        count += 1;
    }

    Ok(count)
}

/// Link target of a hard link, or of a symlink that leaves the unpack root.
fn escaping_link<R: Read>(entry: &tar::Entry<'_, R>) -> Option<PathBuf> {
    let kind = entry.header().entry_type();
    if !kind.is_symlink() && !kind.is_hard_link() {
        return None;
    }

    let link = match entry.link_name() {
        Ok(Some(link)) => link.into_owned(),
        _ => return Some(PathBuf::new()),
    };
    // Hard links resolve against the working directory, not `dest`.
    let escapes = kind.is_hard_link()
        || link
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    escapes.then_some(link)
}

/// First existing ancestor of `relative` under `dest` that is a symlink.
fn symlinked_ancestor(dest: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = dest.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Some(current),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    None
}

fn is_gzip(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}
