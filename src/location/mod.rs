//! Parsing and normalisation of user supplied install locations.
//!
//! Accepted inputs are existing local files, block devices and directories,
//! `http://` and `ftp://` URLs, NFS sources in either the RFC form
//! (`nfs://server/path`) or the mount form (`nfs:server:/path`), and
//! storage-pool volume references. NFS sources are always carried in the
//! mount form. Resolution never touches the network.

mod pools;

pub use pools::{StaticPools, StoragePools};

use std::fmt;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const NFS_URI_PREFIX: &str = "nfs://";
const NFS_MOUNT_PREFIX: &str = "nfs:";

/// A validated, normalised install location. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallLocation {
    /// Existing regular file, typically an ISO or disk image.
    LocalPath(PathBuf),
    /// Existing block device such as a CD-ROM drive.
    BlockDevice(PathBuf),
    /// Existing directory holding an unpacked install tree.
    DirectoryTree(PathBuf),
    Http(Url),
    Ftp(Url),
    /// NFS export, rendered as `nfs:server:/export`.
    Nfs { server: String, export: String },
    /// Volume inside a storage pool, resolved to its backing path.
    PoolVolume {
        pool: String,
        volume: String,
        path: PathBuf,
    },
}

impl InstallLocation {
    /// Local filesystem path backing this location, if any.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            InstallLocation::LocalPath(p)
            | InstallLocation::BlockDevice(p)
            | InstallLocation::DirectoryTree(p) => Some(p),
            InstallLocation::PoolVolume { path, .. } => Some(path),
            InstallLocation::Http(_) | InstallLocation::Ftp(_) | InstallLocation::Nfs { .. } => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            InstallLocation::Http(_) | InstallLocation::Ftp(_) | InstallLocation::Nfs { .. }
        )
    }

    /// A local file or device that could be attached to the guest as-is.
    pub fn is_local_media(&self) -> bool {
        match self {
            InstallLocation::LocalPath(_) | InstallLocation::BlockDevice(_) => true,
            InstallLocation::PoolVolume { path, .. } => !path.is_dir(),
            _ => false,
        }
    }

    /// `nfs:server:/export` for NFS, `None` otherwise.
    pub fn nfs_mount_source(&self) -> Option<String> {
        match self {
            InstallLocation::Nfs { server, export } => Some(format!("{server}:{export}")),
            _ => None,
        }
    }
}

impl fmt::Display for InstallLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallLocation::LocalPath(p)
            | InstallLocation::BlockDevice(p)
            | InstallLocation::DirectoryTree(p) => write!(f, "{}", p.display()),
            InstallLocation::Http(u) | InstallLocation::Ftp(u) => f.write_str(u.as_str()),
            InstallLocation::Nfs { server, export } => write!(f, "{NFS_MOUNT_PREFIX}{server}:{export}"),
            InstallLocation::PoolVolume { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

/// Rewrite `nfs://server/path` into `nfs:server:/path`.
///
/// The colon is inserted directly before the first slash after the server
/// unless one is already there.
pub fn normalize_nfs_uri(raw: &str) -> Result<String> {
    let rest = raw
        .strip_prefix(NFS_URI_PREFIX)
        .ok_or_else(|| Error::invalid_location(raw, "not an nfs:// URI"))?;
    let mut val = format!("{NFS_MOUNT_PREFIX}{rest}");

    let index = match val[NFS_MOUNT_PREFIX.len()..].find('/') {
        Some(i) => i + NFS_MOUNT_PREFIX.len(),
        None => return Err(Error::invalid_location(raw, "Invalid NFS format: No path specified.")),
    };
    if val.as_bytes()[index - 1] != b':' {
        val.insert(index, ':');
    }
    Ok(val)
}

fn parse_nfs_mount_form(raw: &str) -> Result<InstallLocation> {
    let body = &raw[NFS_MOUNT_PREFIX.len()..];
    let (server, path) = body
        .split_once(":/")
        .ok_or_else(|| Error::invalid_location(raw, "Invalid NFS format: No path specified."))?;
    if server.is_empty() {
        return Err(Error::invalid_location(raw, "Invalid NFS format: No server specified."));
    }
    Ok(InstallLocation::Nfs {
        server: server.to_string(),
        export: format!("/{path}"),
    })
}

fn classify_local(path: &Path) -> Result<InstallLocation> {
    let canonical = fs::canonicalize(path).map_err(|e| Error::io(path, e))?;
    let meta = fs::metadata(&canonical).map_err(|e| Error::io(&canonical, e))?;
    let file_type = meta.file_type();

    Ok(if file_type.is_dir() {
        InstallLocation::DirectoryTree(canonical)
    } else if file_type.is_block_device() {
        InstallLocation::BlockDevice(canonical)
    } else {
        InstallLocation::LocalPath(canonical)
    })
}

fn effective_user_is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Turns raw user input into an [`InstallLocation`].
#[derive(Clone)]
pub struct LocationResolver {
    privileged: bool,
    pools: Option<Arc<dyn StoragePools>>,
}

impl fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationResolver")
            .field("privileged", &self.privileged)
            .field("pools", &self.pools.is_some())
            .finish()
    }
}

impl Default for LocationResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationResolver {
    /// Resolver whose NFS privilege policy follows the effective uid.
    pub fn new() -> Self {
        Self {
            privileged: effective_user_is_root(),
            pools: None,
        }
    }

    /// Override the privilege decision used for NFS sources.
    pub fn with_privilege(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_pools(mut self, pools: Arc<dyn StoragePools>) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Resolve a raw location string.
    pub fn resolve(&self, raw: &str) -> Result<InstallLocation> {
        if raw.is_empty() {
            return Err(Error::invalid_location(raw, "location must not be empty"));
        }

        let location = if Path::new(raw).exists() {
            let loc = classify_local(Path::new(raw))?;
            debug!(location = %loc, "install location is a local file/path");
            loc
        } else if raw.starts_with(NFS_URI_PREFIX) {
            parse_nfs_mount_form(&normalize_nfs_uri(raw)?)?
        } else if raw.starts_with(NFS_MOUNT_PREFIX) {
            parse_nfs_mount_form(raw)?
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw).map_err(|e| Error::invalid_location(raw, e.to_string()))?;
            InstallLocation::Http(url)
        } else if raw.starts_with("ftp://") {
            let url = Url::parse(raw).map_err(|e| Error::invalid_location(raw, e.to_string()))?;
            InstallLocation::Ftp(url)
        } else {
            return Err(Error::invalid_location(
                raw,
                "Install media location must be an NFS, HTTP or FTP network install source, or an existing local file/device",
            ));
        };

        if matches!(location, InstallLocation::Nfs { .. }) && !self.privileged {
            return Err(Error::invalid_location(raw, "NFS installations are only supported as root"));
        }

        Ok(location)
    }

    /// Resolve a `(pool, volume)` reference through the configured pools.
    pub fn resolve_volume(&self, pool: &str, volume: &str) -> Result<InstallLocation> {
        let reference = format!("{pool}/{volume}");
        let pools = self
            .pools
            .as_ref()
            .ok_or_else(|| Error::invalid_location(&reference, "no storage pools available"))?;

        if !pools.has_pool(pool) {
            return Err(Error::invalid_location(&reference, format!("no storage pool named '{pool}'")));
        }
        let path = pools.volume_path(pool, volume).ok_or_else(|| {
            Error::invalid_location(&reference, format!("pool '{pool}' has no volume named '{volume}'"))
        })?;

        Ok(InstallLocation::PoolVolume {
            pool: pool.to_string(),
            volume: volume.to_string(),
            path,
        })
    }
}
