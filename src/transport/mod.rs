//! Uniform fetch abstraction over the supported install-source protocols.
//!
//! Every transport follows the same lifecycle: `prepare_location` once,
//! any number of `has_file` / `fetch_file` calls with paths relative to the
//! install tree root, then `cleanup_location`, which is idempotent and safe
//! after a partially failed prepare.

mod direct;
mod ftp;
mod http;
mod local;
mod mounted;

pub use direct::DirectTransport;
pub use ftp::FtpTransport;
pub use http::HttpTransport;
pub use mounted::{MountSource, MountedTransport};

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;
use crate::location::InstallLocation;
use crate::progress::ProgressSink;

/// Closed set of transports, selected from the location's scheme.
#[derive(Debug)]
pub enum Transport {
    Http(HttpTransport),
    Ftp(FtpTransport),
    Mounted(MountedTransport),
    Direct(DirectTransport),
}

impl Transport {
    /// Pick the transport for `location`. HTTP and FTP map to their own
    /// transports, local directories are read in place and everything else
    /// (NFS, ISO/IMG files, block devices) is mounted under `scratch_dir`.
    pub fn for_location(location: &InstallLocation, settings: &Settings) -> Result<Self> {
        let scratch = settings.scratch_dir().to_path_buf();
        Ok(match location {
            InstallLocation::Http(url) => Transport::Http(HttpTransport::new(url.clone(), settings.user_agent())?),
            InstallLocation::Ftp(url) => {
                let (user, password) = settings.ftp_credentials();
                Transport::Ftp(FtpTransport::new(url.clone(), user, password))
            }
            InstallLocation::Nfs { .. } => {
                let source = location.nfs_mount_source().unwrap_or_default();
                Transport::Mounted(MountedTransport::new(MountSource::Nfs(source), scratch))
            }
            InstallLocation::DirectoryTree(path) => Transport::Direct(DirectTransport::new(path.clone())),
            InstallLocation::LocalPath(path) => {
                Transport::Mounted(MountedTransport::new(MountSource::Loop(path.clone()), scratch))
            }
            InstallLocation::BlockDevice(path) => {
                Transport::Mounted(MountedTransport::new(MountSource::Device(path.clone()), scratch))
            }
            InstallLocation::PoolVolume { path, .. } => Self::for_local_path(path, scratch),
        })
    }

    fn for_local_path(path: &Path, scratch: PathBuf) -> Self {
        match fs::metadata(path).map(|m| m.file_type()) {
            Ok(ft) if ft.is_dir() => Transport::Direct(DirectTransport::new(path.to_path_buf())),
            Ok(ft) if ft.is_block_device() => {
                Transport::Mounted(MountedTransport::new(MountSource::Device(path.to_path_buf()), scratch))
            }
            _ => Transport::Mounted(MountedTransport::new(MountSource::Loop(path.to_path_buf()), scratch)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transport::Http(_) => "http",
            Transport::Ftp(_) => "ftp",
            Transport::Mounted(_) => "mounted",
            Transport::Direct(_) => "direct",
        }
    }

    /// Establish readiness: probe the URL, log in, mount, or check the tree.
    pub async fn prepare_location(&mut self) -> Result<()> {
        match self {
            Transport::Http(t) => t.prepare_location().await,
            Transport::Ftp(t) => t.prepare_location().await,
            Transport::Mounted(t) => t.prepare_location().await,
            Transport::Direct(t) => t.prepare_location().await,
        }
    }

    /// Whether `rel` exists below the tree root. Directories count.
    pub async fn has_file(&mut self, rel: &str) -> Result<bool> {
        match self {
            Transport::Http(t) => t.has_file(rel).await,
            Transport::Ftp(t) => t.has_file(rel).await,
            Transport::Mounted(t) => t.has_file(rel).await,
            Transport::Direct(t) => t.has_file(rel).await,
        }
    }

    /// Copy `rel` to `dest`, reporting progress as bytes arrive.
    pub async fn fetch_file(&mut self, rel: &str, dest: &Path, progress: &Arc<dyn ProgressSink>) -> Result<()> {
        match self {
            Transport::Http(t) => t.fetch_file(rel, dest, progress).await,
            Transport::Ftp(t) => t.fetch_file(rel, dest, progress).await,
            Transport::Mounted(t) => t.fetch_file(rel, dest, progress).await,
            Transport::Direct(t) => t.fetch_file(rel, dest, progress).await,
        }
    }

    /// Release whatever `prepare_location` acquired. Never fails; problems
    /// are logged.
    pub fn cleanup_location(&mut self) {
        match self {
            Transport::Http(_) | Transport::Direct(_) => {}
            Transport::Ftp(t) => t.cleanup_location(),
            Transport::Mounted(t) => t.cleanup_location(),
        }
    }
}

/// Join a tree-relative path onto a local root, refusing to escape it.
pub(crate) fn local_join(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel.trim_start_matches('/'));
    if rel
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return None;
    }
    Some(root.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_join_rejects_parent_components() {
        let root = Path::new("/srv/tree");
        assert_eq!(
            local_join(root, "images/pxeboot/vmlinuz"),
            Some(PathBuf::from("/srv/tree/images/pxeboot/vmlinuz"))
        );
        assert_eq!(local_join(root, "/.treeinfo"), Some(PathBuf::from("/srv/tree/.treeinfo")));
        assert_eq!(local_join(root, "../etc/shadow"), None);
    }

    #[test]
    fn scheme_dispatch() {
        let settings = Settings::default();
        let http = InstallLocation::Http(url::Url::parse("http://mirror/os/").unwrap());
        assert_eq!(Transport::for_location(&http, &settings).unwrap().name(), "http");

        let ftp = InstallLocation::Ftp(url::Url::parse("ftp://mirror/os/").unwrap());
        assert_eq!(Transport::for_location(&ftp, &settings).unwrap().name(), "ftp");

        let nfs = InstallLocation::Nfs {
            server: "srv".into(),
            export: "/os".into(),
        };
        assert_eq!(Transport::for_location(&nfs, &settings).unwrap().name(), "mounted");

        let iso = InstallLocation::LocalPath(PathBuf::from("/isos/boot.iso"));
        assert_eq!(Transport::for_location(&iso, &settings).unwrap().name(), "mounted");

        let tree = InstallLocation::DirectoryTree(PathBuf::from("/srv/tree"));
        assert_eq!(Transport::for_location(&tree, &settings).unwrap().name(), "direct");
    }
}
