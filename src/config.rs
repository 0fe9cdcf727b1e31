use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::distro::DistroFamily;
use crate::error::{Error, Result};
use crate::progress::{NoProgress, ProgressSink};

/// Environment variable consulted by [`Settings::from_env`].
pub const SETTINGS_ENV: &str = "VIRT_INSTALL_SOURCE_SETTINGS";

pub const DEFAULT_SCRATCH_DIR: &str = "/var/tmp";
pub const DEFAULT_USER_AGENT: &str = "virt-install-source/0.1";

/// Persisted, user-overridable knobs; serde is confined to this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub(crate) scratch_dir: PathBuf,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) user_agent: String,
    pub(crate) ftp_user: String,
    pub(crate) ftp_password: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ftp_user: "anonymous".to_string(),
            ftp_password: "anonymous@".to_string(),
        }
    }
}

impl Settings {
    /// Load from a JSON file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&data)
    }

    /// Load from a JSON string. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid settings JSON: {e}")))
    }

    /// Load from an env var containing JSON, falling back to defaults when
    /// the variable is unset.
    pub fn from_env(var: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(s) => Self::from_json_str(&s),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(e) => Err(Error::Config(format!("unreadable env var {var}: {e}"))),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn ftp_credentials(&self) -> (&str, &str) {
        (&self.ftp_user, &self.ftp_password)
    }
}

/// Caller hints that steer distro detection and path selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireHints {
    /// Hypervisor/OS type flavor, e.g. `xen` for paravirt kernels.
    pub os_type: Option<String>,
    /// Restrict detection to a single family.
    pub distro: Option<DistroFamily>,
    /// Guest architecture; defaults to the host's.
    pub arch: Option<String>,
}

impl AcquireHints {
    pub fn is_paravirt(&self) -> bool {
        self.os_type.as_deref() == Some("xen")
    }

    pub fn arch(&self) -> String {
        self.arch
            .clone()
            .unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }
}

/// Explicit configuration handed to every acquisition call.
#[derive(Clone)]
pub struct AcquireOptions {
    pub settings: Settings,
    pub hints: AcquireHints,
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
    /// Deadline set in code; wins over `settings.timeout_secs`.
    timeout: Option<Duration>,
}

impl AcquireOptions {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            hints: AcquireHints::default(),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.scratch_dir = dir.into();
        self
    }

    pub fn with_hints(mut self, hints: AcquireHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Deadline for a whole acquisition, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.or_else(|| self.settings.timeout())
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        self.settings.scratch_dir()
    }
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl std::fmt::Debug for AcquireOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquireOptions")
            .field("settings", &self.settings)
            .field("hints", &self.hints)
            .field("timeout", &self.timeout())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
