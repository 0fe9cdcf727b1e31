use std::path::{Path, PathBuf};

use tracing::warn;

/// Kernel, initrd and the boot arguments the installer needs.
///
/// The files live in the scratch dir and belong to the caller, who must
/// delete them once the guest has been booted (see [`KernelImages::remove`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelImages {
    pub kernel: PathBuf,
    pub initrd: PathBuf,
    pub args: String,
}

impl KernelImages {
    pub fn paths(&self) -> [&Path; 2] {
        [&self.kernel, &self.initrd]
    }

    /// Delete both files, logging failures.
    pub fn remove(&self) {
        for path in self.paths() {
            remove_scratch_file(path);
        }
    }
}

/// A bootable ISO fetched from the install tree. Owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootDisk {
    pub iso: PathBuf,
}

impl BootDisk {
    pub fn remove(&self) {
        remove_scratch_file(&self.iso);
    }
}

pub(crate) fn remove_scratch_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove temporary file");
    }
}
