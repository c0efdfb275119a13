//! File-level backup and restore of the embedded store
//!
//! These helpers only move bytes around. Closing and reopening the store
//! around them is the embedded driver's job, and exclusion of concurrent
//! storage calls is the facade's.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vitals_core::{Result, StoreError};

/// Suffix of the copy of the live store kept while a restore is in flight
pub const ASIDE_SUFFIX: &str = "pre-restore";

/// Suffix of the staged copy of the restore source
pub const STAGING_SUFFIX: &str = "restore-tmp";

/// Suffix of a backup that has not been fully written yet
pub const PARTIAL_SUFFIX: &str = "partial";

/// Copy the store file to `dest`, byte for byte.
///
/// The copy is written beside `dest` and renamed into place, so `dest` is
/// either the previous file or a complete snapshot. Returns the bytes written.
pub fn write_snapshot(store: &Path, dest: &Path) -> Result<u64> {
    if same_file(store, dest) {
        return Err(StoreError::validation(
            "backup destination is the live store file",
        ));
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let partial = sibling(dest, PARTIAL_SUFFIX);
    let written = match copy_synced(store, &partial) {
        Ok(n) => n,
        Err(e) => {
            remove_quietly(&partial);
            return Err(e.into());
        }
    };
    if let Err(e) = fs::rename(&partial, dest) {
        remove_quietly(&partial);
        return Err(e.into());
    }

    debug!("Wrote {} byte snapshot to {}", written, dest.display());
    Ok(written)
}

/// Validate a restore source before anything is closed
pub fn check_source(src: &Path, store: &Path) -> Result<()> {
    let meta = fs::metadata(src).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("backup file does not exist: {}", src.display()),
            ))
        } else {
            StoreError::Io(e)
        }
    })?;

    if !meta.is_file() {
        return Err(StoreError::validation(format!(
            "backup source is not a regular file: {}",
            src.display()
        )));
    }
    if same_file(src, store) {
        return Err(StoreError::validation(
            "backup source is the live store file",
        ));
    }
    Ok(())
}

/// A restore whose new file is in place but not yet confirmed.
///
/// The previous store file (if there was one) is kept aside until either
/// [`StagedRestore::commit`] or [`StagedRestore::rollback`] is called.
#[derive(Debug)]
pub struct StagedRestore {
    store: PathBuf,
    aside: Option<PathBuf>,
}

/// Put `src` in place of the store file, keeping the old file aside.
///
/// The store must be closed. On error the store file is unchanged.
pub fn stage_restore(store: &Path, src: &Path) -> Result<StagedRestore> {
    let aside = sibling(store, ASIDE_SUFFIX);
    let had_original = store.exists();

    if had_original {
        if let Err(e) = copy_synced(store, &aside) {
            remove_quietly(&aside);
            return Err(e.into());
        }
    }

    let staging = sibling(store, STAGING_SUFFIX);
    let staged = copy_synced(src, &staging).and_then(|_| fs::rename(&staging, store));
    if let Err(e) = staged {
        remove_quietly(&staging);
        remove_quietly(&aside);
        return Err(e.into());
    }

    Ok(StagedRestore {
        store: store.to_path_buf(),
        aside: had_original.then_some(aside),
    })
}

impl StagedRestore {
    /// Keep the restored file and drop the copy of the old one
    pub fn commit(self) -> Result<()> {
        if let Some(aside) = &self.aside {
            fs::remove_file(aside)?;
        }
        Ok(())
    }

    /// Put the old store file back
    pub fn rollback(self) -> Result<()> {
        match &self.aside {
            Some(aside) => fs::rename(aside, &self.store)?,
            None => fs::remove_file(&self.store)?,
        }
        Ok(())
    }
}

fn copy_synced(from: &Path, to: &Path) -> io::Result<u64> {
    let mut src = File::open(from)?;
    let mut dst = File::create(to)?;
    let written = io::copy(&mut src, &mut dst)?;
    dst.sync_all()?;
    Ok(written)
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
