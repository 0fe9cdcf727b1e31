//! Installer facade tying location handling, acquisition and temp-file
//! bookkeeping together for a single guest install.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::acquire::{acquire_boot_disk_at, acquire_kernel_at};
use crate::config::AcquireOptions;
use crate::error::{Error, Result};
use crate::location::{InstallLocation, LocationResolver};
use crate::media::{KernelImages, remove_scratch_file};

const MBR_SIZE: usize = 512;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xaa];

/// Kernel and initrd the caller already has on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootFiles {
    pub kernel: PathBuf,
    pub initrd: PathBuf,
}

/// What the guest should boot from for the install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMedia {
    Cdrom(PathBuf),
    Kernel(KernelImages),
}

/// One guest install: where the media comes from and which temporary files
/// must go away afterwards.
#[derive(Debug)]
pub struct DistroInstaller {
    resolver: LocationResolver,
    options: AcquireOptions,
    location: Option<InstallLocation>,
    boot: Option<BootFiles>,
    extra_args: Option<String>,
    cdrom: bool,
    tmpfiles: Vec<PathBuf>,
    install_disk: Option<PathBuf>,
}

impl DistroInstaller {
    pub fn new(options: AcquireOptions) -> Self {
        Self::with_resolver(LocationResolver::new(), options)
    }

    pub fn with_resolver(resolver: LocationResolver, options: AcquireOptions) -> Self {
        Self {
            resolver,
            options,
            location: None,
            boot: None,
            extra_args: None,
            cdrom: false,
            tmpfiles: Vec::new(),
            install_disk: None,
        }
    }

    /// Local file/device (boot.iso), local directory (tree), or an HTTP,
    /// FTP or NFS source for either.
    pub fn set_location(&mut self, raw: &str) -> Result<()> {
        self.location = Some(self.resolver.resolve(raw)?);
        Ok(())
    }

    pub fn set_volume_location(&mut self, pool: &str, volume: &str) -> Result<()> {
        self.location = Some(self.resolver.resolve_volume(pool, volume)?);
        Ok(())
    }

    pub fn location(&self) -> Option<&InstallLocation> {
        self.location.as_ref()
    }

    pub fn set_boot(&mut self, boot: BootFiles) {
        self.boot = Some(boot);
    }

    pub fn set_extra_args(&mut self, args: impl Into<String>) {
        self.extra_args = Some(args.into());
    }

    pub fn set_cdrom(&mut self, cdrom: bool) {
        self.cdrom = cdrom;
    }

    /// Local media to attach read-only to the guest during install.
    pub fn install_disk(&self) -> Option<&Path> {
        self.install_disk.as_deref()
    }

    /// Files fetched on the caller's behalf and not yet cleaned up.
    pub fn temp_files(&self) -> &[PathBuf] {
        &self.tmpfiles
    }

    /// Work out the install media, fetching what is needed. Leftovers from
    /// an earlier `prepare` are removed first.
    pub async fn prepare(&mut self) -> Result<InstallMedia> {
        self.cleanup();
        self.install_disk = None;

        if self.cdrom {
            self.prepare_cdrom().await
        } else {
            self.prepare_kernel_and_initrd().await
        }
    }

    fn require_location(&self) -> Result<&InstallLocation> {
        self.location
            .as_ref()
            .ok_or_else(|| Error::invalid_location("", "no install location set"))
    }

    async fn prepare_cdrom(&mut self) -> Result<InstallMedia> {
        let location = self.require_location()?.clone();
        if location.is_local_media()
            && let Some(path) = location.local_path()
        {
            debug!(path = %path.display(), "using local media as install CD-ROM");
            return Ok(InstallMedia::Cdrom(path.to_path_buf()));
        }

        let disk = acquire_boot_disk_at(&location, &self.options).await?;
        self.tmpfiles.push(disk.iso.clone());
        Ok(InstallMedia::Cdrom(disk.iso))
    }

    async fn prepare_kernel_and_initrd(&mut self) -> Result<InstallMedia> {
        let images = match self.boot.clone() {
            Some(boot) => KernelImages {
                kernel: boot.kernel,
                initrd: boot.initrd,
                args: self.extra_args.clone().unwrap_or_default(),
            },
            None => {
                let location = self.require_location()?.clone();
                let mut images = acquire_kernel_at(&location, &self.options).await?;
                self.tmpfiles.push(images.kernel.clone());
                self.tmpfiles.push(images.initrd.clone());
                images.args = join_args(self.extra_args.as_deref(), &images.args);
                images
            }
        };

        if let Some(location) = &self.location
            && location.is_local_media()
        {
            self.install_disk = location.local_path().map(Path::to_path_buf);
        }

        Ok(InstallMedia::Kernel(images))
    }

    /// Delete every fetched temporary file.
    pub fn cleanup(&mut self) {
        for path in self.tmpfiles.drain(..) {
            remove_scratch_file(&path);
        }
    }
}

/// User arguments first, then the installer's own.
fn join_args(extra: Option<&str>, distro: &str) -> String {
    [extra.unwrap_or_default().trim(), distro.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the installed disk carries an MBR boot signature.
///
/// Unprivileged callers may not be able to read block devices; that is
/// treated as success.
pub fn post_install_check(disk: &Path) -> io::Result<bool> {
    let mut file = match File::open(disk) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && !nix::unistd::geteuid().is_root() => {
            debug!(disk = %disk.display(), "cannot open guest disk as non-root; skipping check");
            return Ok(true);
        }
        Err(e) => return Err(e),
    };

    let mut buf = Vec::with_capacity(MBR_SIZE);
    file.by_ref().take(MBR_SIZE as u64).read_to_end(&mut buf)?;
    Ok(buf.len() == MBR_SIZE && buf[MBR_SIZE - 2..] == BOOT_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extra_args_come_first() {
        assert_eq!(join_args(Some("console=ttyS0"), "method=http://x/"), "console=ttyS0 method=http://x/");
        assert_eq!(join_args(None, "method=http://x/"), "method=http://x/");
        assert_eq!(join_args(Some("ks=foo"), ""), "ks=foo");
    }

    #[test]
    fn boot_signature_is_detected() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.img");
        let mut mbr = vec![0u8; MBR_SIZE];
        mbr[510] = 0x55;
        mbr[511] = 0xaa;
        std::fs::write(&good, &mbr).unwrap();
        assert!(post_install_check(&good).unwrap());

        let blank = dir.path().join("blank.img");
        std::fs::write(&blank, vec![0u8; 4096]).unwrap();
        assert!(!post_install_check(&blank).unwrap());

        let short = dir.path().join("short.img");
        std::fs::write(&short, [0x55, 0xaa]).unwrap();
        assert!(!post_install_check(&short).unwrap());
    }

    #[tokio::test]
    async fn local_iso_is_used_directly_as_cdrom() {
        let dir = TempDir::new().unwrap();
        let iso = dir.path().join("boot.iso");
        std::fs::write(&iso, b"iso").unwrap();

        let mut installer = DistroInstaller::new(AcquireOptions::default());
        installer.set_cdrom(true);
        installer.set_location(iso.to_str().unwrap()).unwrap();
        let media = installer.prepare().await.unwrap();

        assert_eq!(media, InstallMedia::Cdrom(std::fs::canonicalize(&iso).unwrap()));
        assert!(installer.temp_files().is_empty());
    }

    #[tokio::test]
    async fn supplied_boot_files_skip_acquisition() {
        let mut installer = DistroInstaller::new(AcquireOptions::default());
        installer.set_boot(BootFiles {
            kernel: "/boot/vmlinuz".into(),
            initrd: "/boot/initrd.img".into(),
        });
        installer.set_extra_args("console=ttyS0");

        let media = installer.prepare().await.unwrap();
        let InstallMedia::Kernel(images) = media else {
            panic!("expected kernel media");
        };
        assert_eq!(images.kernel, PathBuf::from("/boot/vmlinuz"));
        assert_eq!(images.args, "console=ttyS0");
        assert!(installer.install_disk().is_none());
    }
}
