//! Scratch files for spooling downloads before decoding.
//!
//! Every spool file carries the same name prefix so that leftovers from a
//! crashed run can be identified and removed later.

use std::env;
use std::io;
use std::path::Path;

use log::warn;
use tempfile::{Builder, NamedTempFile};

pub(crate) const SCRATCH_PREFIX: &str = "era5_data_";

/// A scratch file in the process temp directory.
pub(crate) fn scratch_file(suffix: &str) -> io::Result<NamedTempFile> {
    Builder::new()
        .prefix(SCRATCH_PREFIX)
        .suffix(suffix)
        .tempfile_in(env::temp_dir())
}

/// Removes stale spool files left behind by earlier runs.
///
/// Scratch files are normally deleted as soon as their download is decoded,
/// but a crash or a file lock can leave them behind. Call this after
/// consuming a dataset (or at startup) to reclaim the space. Returns the
/// number of files removed.
pub fn sweep_scratch_files() -> usize {
    sweep_dir(&env::temp_dir())
}

fn sweep_dir(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("could not list temp directory '{}': {err}", dir.display());
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(SCRATCH_PREFIX) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => warn!(
                "could not delete scratch file '{}': {err}",
                entry.path().display()
            ),
        }
    }
    removed
}
