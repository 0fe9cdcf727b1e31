use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::local::{copy_with_progress, path_exists};
use super::local_join;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;

const MOUNTPOINT_PREFIX: &str = "virtinstmnt.";
const REAP_ATTEMPTS: u32 = 50;
const REAP_INTERVAL: Duration = Duration::from_millis(100);

/// What gets mounted and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// `server:/export`, mounted over the network.
    Nfs(String),
    /// ISO or disk image file, attached through a loop device.
    Loop(PathBuf),
    /// Block device such as an optical drive.
    Device(PathBuf),
}

impl MountSource {
    fn describe(&self) -> String {
        match self {
            MountSource::Nfs(s) => format!("nfs:{s}"),
            MountSource::Loop(p) | MountSource::Device(p) => p.display().to_string(),
        }
    }

    fn mount_args(&self, mountpoint: &Path) -> Vec<String> {
        let (opts, src) = match self {
            MountSource::Nfs(s) => ("ro", s.clone()),
            MountSource::Loop(p) => ("ro,loop", p.display().to_string()),
            MountSource::Device(p) => ("ro", p.display().to_string()),
        };
        vec!["-o".into(), opts.into(), src, mountpoint.display().to_string()]
    }
}

/// Mounts the source read-only on a private directory in the scratch area
/// and reads files from there.
#[derive(Debug)]
pub struct MountedTransport {
    source: MountSource,
    scratch_dir: PathBuf,
    mountpoint: Option<PathBuf>,
    mounted: bool,
    /// `mount` process whose caller went away before it finished.
    pending_mount: Option<Child>,
}

impl MountedTransport {
    pub fn new(source: MountSource, scratch_dir: PathBuf) -> Self {
        Self {
            source,
            scratch_dir,
            mountpoint: None,
            mounted: false,
            pending_mount: None,
        }
    }

    pub fn source(&self) -> &MountSource {
        &self.source
    }

    /// Directory the source is mounted on, once prepared.
    pub fn mountpoint(&self) -> Option<&Path> {
        self.mountpoint.as_deref()
    }

    fn root(&self, what: &str) -> Result<&Path> {
        match (self.mounted, self.mountpoint.as_deref()) {
            (true, Some(p)) => Ok(p),
            _ => Err(Error::fetch_failed(what, anyhow!("install media is not mounted"))),
        }
    }

    pub async fn prepare_location(&mut self) -> Result<()> {
        let location = self.source.describe();
        if !nix::unistd::geteuid().is_root() {
            return Err(Error::unavailable(
                location,
                anyhow!("mounting install media requires root privileges"),
            ));
        }

        let mountpoint = tempfile::Builder::new()
            .prefix(MOUNTPOINT_PREFIX)
            .tempdir_in(&self.scratch_dir)
            .map_err(|e| Error::io(&self.scratch_dir, e))?
            .keep();
        self.mountpoint = Some(mountpoint.clone());

        let args = self.source.mount_args(&mountpoint);
        debug!(?args, "mounting install media");
        let spawned = Command::new("mount")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.cleanup_location();
                return Err(Error::unavailable(location, e));
            }
        };

        // Kept on self until it exits so cleanup can reap it if this future
        // is dropped mid-mount.
        let stderr_pipe = child.stderr.take();
        let child = self.pending_mount.insert(child);
        let status = child.wait().await;
        self.pending_mount = None;

        let mut stderr = String::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut stderr).await;
        }

        match status {
            Ok(status) if status.success() => {}
            Ok(_) => {
                self.cleanup_location();
                return Err(Error::unavailable(
                    location.clone(),
                    anyhow!("Mounting location '{location}' failed: {}", stderr.trim()),
                ));
            }
            Err(e) => {
                self.cleanup_location();
                return Err(Error::unavailable(location, e));
            }
        }

        info!(source = %location, mountpoint = %mountpoint.display(), "mounted install media");
        self.mounted = true;
        Ok(())
    }

    pub async fn has_file(&mut self, rel: &str) -> Result<bool> {
        let root = self.root(rel)?;
        match local_join(root, rel) {
            Some(path) => path_exists(&path, rel).await,
            None => Ok(false),
        }
    }

    pub async fn fetch_file(&mut self, rel: &str, dest: &Path, progress: &Arc<dyn ProgressSink>) -> Result<()> {
        let root = self.root(rel)?;
        let src = local_join(root, rel)
            .ok_or_else(|| Error::fetch_failed(rel, anyhow!("path escapes the install tree")))?;
        copy_with_progress(&src, dest, rel, progress).await
    }

    /// Unmount and remove the private mountpoint. Runs synchronously so it
    /// can be driven from `Drop`.
    ///
    /// The `mounted` flag is not trusted here: a `mount` interrupted by
    /// cancellation may still have attached the filesystem, so the
    /// mountpoint itself is checked.
    pub fn cleanup_location(&mut self) {
        if let Some(mut child) = self.pending_mount.take() {
            reap_interrupted_mount(&mut child);
        }

        let Some(mountpoint) = self.mountpoint.clone() else {
            self.mounted = false;
            return;
        };

        if looks_mounted(&mountpoint) {
            match StdCommand::new("umount").arg(&mountpoint).status() {
                Ok(status) if status.success() => {
                    debug!(mountpoint = %mountpoint.display(), "unmounted install media");
                }
                Ok(status) => warn!(mountpoint = %mountpoint.display(), %status, "umount failed"),
                Err(e) => warn!(mountpoint = %mountpoint.display(), error = %e, "could not run umount"),
            }
        }

        // A still-mounted directory must not be removed; leave it for the
        // operator rather than deleting through the mount.
        if looks_mounted(&mountpoint) {
            self.mounted = true;
            return;
        }
        self.mounted = false;
        self.mountpoint = None;
        if let Err(e) = fs::remove_dir(&mountpoint)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(mountpoint = %mountpoint.display(), error = %e, "failed to remove mountpoint");
        }
    }
}

/// Kill a `mount` that outlived its caller and wait for it to exit, so the
/// mount state is settled before it is inspected.
fn reap_interrupted_mount(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "interrupted mount already gone");
    }
    for _ in 0..REAP_ATTEMPTS {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(REAP_INTERVAL),
            Err(e) => {
                warn!(error = %e, "could not wait for interrupted mount");
                return;
            }
        }
    }
    warn!("interrupted mount did not exit in time");
}

/// Whether `path` sits on a different device than its parent. An
/// unreadable mountpoint (e.g. a stale NFS handle) counts as mounted.
fn looks_mounted(path: &Path) -> bool {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => return e.kind() != std::io::ErrorKind::NotFound,
    };
    match path.parent().map(fs::metadata) {
        Some(Ok(parent)) => parent.dev() != meta.dev(),
        _ => false,
    }
}

impl Drop for MountedTransport {
    fn drop(&mut self) {
        self.cleanup_location();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_mounts_are_read_only() {
        let src = MountSource::Loop(PathBuf::from("/isos/boot.iso"));
        assert_eq!(
            src.mount_args(Path::new("/var/tmp/virtinstmnt.x")),
            vec!["-o", "ro,loop", "/isos/boot.iso", "/var/tmp/virtinstmnt.x"]
        );
    }

    #[test]
    fn nfs_mounts_use_server_colon_path() {
        let src = MountSource::Nfs("server:/export".into());
        assert_eq!(src.mount_args(Path::new("/mnt/x"))[2], "server:/export");
        assert_eq!(src.describe(), "nfs:server:/export");
    }

    #[test]
    fn cleanup_without_prepare_is_noop() {
        let mut t = MountedTransport::new(MountSource::Device(PathBuf::from("/dev/sr0")), std::env::temp_dir());
        t.cleanup_location();
        t.cleanup_location();
        assert!(t.mountpoint().is_none());
    }

    #[tokio::test]
    async fn reads_fail_before_mount() {
        let mut t = MountedTransport::new(MountSource::Loop(PathBuf::from("/nonexistent.iso")), std::env::temp_dir());
        assert!(t.has_file(".treeinfo").await.is_err());
    }

    #[test]
    fn plain_directory_is_not_a_mount() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!looks_mounted(dir.path()));
        assert!(!looks_mounted(&dir.path().join("gone")));
    }

    #[test]
    fn cleanup_removes_mountpoint_left_by_an_unfinished_prepare() {
        let scratch = tempfile::TempDir::new().unwrap();
        let mountpoint = scratch.path().join("virtinstmnt.test");
        std::fs::create_dir(&mountpoint).unwrap();

        let mut t = MountedTransport::new(MountSource::Loop(PathBuf::from("/isos/boot.iso")), scratch.path().into());
        t.mountpoint = Some(mountpoint.clone());

        t.cleanup_location();
        assert!(!mountpoint.exists());
        assert!(t.mountpoint().is_none());
        t.cleanup_location();
    }

    #[tokio::test]
    async fn cleanup_reaps_a_mount_that_outlived_its_caller() {
        let scratch = tempfile::TempDir::new().unwrap();
        let mountpoint = scratch.path().join("virtinstmnt.test");
        std::fs::create_dir(&mountpoint).unwrap();

        let mut t = MountedTransport::new(MountSource::Loop(PathBuf::from("/isos/boot.iso")), scratch.path().into());
        t.mountpoint = Some(mountpoint.clone());
        t.pending_mount = Some(Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap());

        t.cleanup_location();
        assert!(t.pending_mount.is_none());
        assert!(!mountpoint.exists());
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
