use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use tempfile::TempPath;

use crate::config::AcquireOptions;
use crate::distro::treeinfo::{TREEINFO, TreeInfo};
use crate::error::{Error, Result};
use crate::location::InstallLocation;
use crate::progress::{NoProgress, ProgressSink};
use crate::transport::Transport;

/// Lifecycle of one acquisition. Any state may jump straight to
/// `TransportCleanedUp` when an error is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Created,
    LocationResolved,
    TransportPrepared,
    DistroMatched,
    Extracted,
    TransportCleanedUp,
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcquisitionState::Created => "created",
            AcquisitionState::LocationResolved => "location-resolved",
            AcquisitionState::TransportPrepared => "transport-prepared",
            AcquisitionState::DistroMatched => "distro-matched",
            AcquisitionState::Extracted => "extracted",
            AcquisitionState::TransportCleanedUp => "transport-cleaned-up",
        };
        f.write_str(s)
    }
}

/// An active transport binding for one install location.
///
/// Owned by a single acquisition. Dropping the session releases the
/// transport, so cleanup also happens when the owning future is cancelled.
pub struct FetchSession {
    location: InstallLocation,
    transport: Transport,
    scratch_dir: PathBuf,
    progress: Arc<dyn ProgressSink>,
    state: AcquisitionState,
    /// `.treeinfo` of the tree once looked up; the inner `None` means absent.
    treeinfo: Option<Option<TreeInfo>>,
}

impl FetchSession {
    /// Select the transport for `location`. No I/O happens here.
    pub fn open(location: InstallLocation, options: &AcquireOptions) -> Result<Self> {
        let transport = Transport::for_location(&location, &options.settings)?;
        let mut session = Self {
            location,
            transport,
            scratch_dir: options.scratch_dir().to_path_buf(),
            progress: Arc::clone(&options.progress),
            state: AcquisitionState::Created,
            treeinfo: None,
        };
        session.advance(AcquisitionState::LocationResolved);
        Ok(session)
    }

    /// Session over `location` with default settings and no progress output.
    pub fn with_defaults(location: InstallLocation, scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let options = AcquireOptions::default()
            .with_scratch_dir(scratch_dir)
            .with_progress(Arc::new(NoProgress));
        Self::open(location, &options)
    }

    pub fn location(&self) -> &InstallLocation {
        &self.location
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: AcquisitionState) {
        debug!(location = %self.location, from = %self.state, to = %next, "acquisition state change");
        self.state = next;
    }

    pub async fn prepare(&mut self) -> Result<()> {
        self.transport.prepare_location().await?;
        self.advance(AcquisitionState::TransportPrepared);
        Ok(())
    }

    pub async fn has_file(&mut self, rel: &str) -> Result<bool> {
        self.transport.has_file(rel).await
    }

    fn ensure_scratch_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| Error::io(&self.scratch_dir, e))
    }

    fn scratch_file(&self, rel: &str) -> Result<tempfile::NamedTempFile> {
        self.ensure_scratch_dir()?;
        let base = rel.rsplit('/').find(|s| !s.is_empty()).unwrap_or("download");
        tempfile::Builder::new()
            .prefix(&format!("virtinst-{base}."))
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| Error::io(&self.scratch_dir, e))
    }

    /// Fetch `rel` into a fresh file in the scratch dir. The file is deleted
    /// when the returned path is dropped, so an abandoned acquisition leaves
    /// nothing behind; call [`TempPath::keep`] to hand it over.
    pub async fn fetch_temp(&mut self, rel: &str) -> Result<TempPath> {
        let tmp = self.scratch_file(rel)?.into_temp_path();
        self.transport.fetch_file(rel, &tmp, &self.progress).await?;
        debug!(file = rel, path = %tmp.display(), "fetched file");
        Ok(tmp)
    }

    /// Fetch `rel` into a fresh file in the scratch dir and hand ownership
    /// of that file to the caller.
    pub async fn acquire_file(&mut self, rel: &str) -> Result<PathBuf> {
        let tmp = self.fetch_temp(rel).await?;
        persist(tmp)
    }

    /// Parsed `.treeinfo` of the tree, fetched at most once per session.
    pub async fn treeinfo(&mut self) -> Result<Option<&TreeInfo>> {
        if self.treeinfo.is_none() {
            let parsed = if self.has_file(TREEINFO).await? {
                Some(TreeInfo::parse(&self.read_text(TREEINFO).await?))
            } else {
                None
            };
            self.treeinfo = Some(parsed);
        }
        Ok(self.treeinfo.as_ref().and_then(Option::as_ref))
    }

    /// Fetch a small index file and return its text. The scratch copy is
    /// deleted before returning.
    pub async fn read_text(&mut self, rel: &str) -> Result<String> {
        let tmp = self.scratch_file(rel)?;
        let quiet: Arc<dyn ProgressSink> = Arc::new(NoProgress);
        self.transport.fetch_file(rel, tmp.path(), &quiet).await?;
        let bytes = tokio::fs::read(tmp.path())
            .await
            .map_err(|e| Error::io(tmp.path(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Release the transport. Idempotent and infallible.
    pub fn cleanup(&mut self) {
        if self.state == AcquisitionState::TransportCleanedUp {
            return;
        }
        self.transport.cleanup_location();
        self.advance(AcquisitionState::TransportCleanedUp);
    }
}

/// Stop `tmp` from deleting itself and return its path.
pub(crate) fn persist(tmp: TempPath) -> Result<PathBuf> {
    tmp.keep().map_err(|e| {
        let path = e.path.to_path_buf();
        Error::io(path, e.error)
    })
}

impl Drop for FetchSession {
    fn drop(&mut self) {
        if self.state != AcquisitionState::TransportCleanedUp {
            warn!(location = %self.location, state = %self.state, "session dropped without cleanup; releasing now");
            self.cleanup();
        }
    }
}

impl fmt::Debug for FetchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchSession")
            .field("location", &self.location)
            .field("transport", &self.transport)
            .field("scratch_dir", &self.scratch_dir)
            .field("state", &self.state)
            .finish()
    }
}
