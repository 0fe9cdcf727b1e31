use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::progress::ProgressSink;

const FTP_DEFAULT_PORT: u16 = 21;
const COPY_CHUNK: usize = 64 * 1024;

/// Fetches tree files over a single FTP control connection.
///
/// The control connection is blocking, so every operation runs on the
/// blocking pool and hands the stream back when done.
pub struct FtpTransport {
    url: Url,
    user: String,
    password: String,
    base_dir: String,
    stream: Option<FtpStream>,
}

impl std::fmt::Debug for FtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpTransport")
            .field("url", &self.url.as_str())
            .field("base_dir", &self.base_dir)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl FtpTransport {
    pub fn new(url: Url, user: &str, password: &str) -> Self {
        // Credentials embedded in the URL win over the configured ones.
        let user = if url.username().is_empty() { user.to_string() } else { url.username().to_string() };
        let password = url.password().map(str::to_string).unwrap_or_else(|| password.to_string());
        let base_dir = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Self {
            url,
            user,
            password,
            base_dir,
            stream: None,
        }
    }

    fn address(&self) -> Result<String> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| Error::unavailable(self.url.as_str(), anyhow!("FTP URL has no host")))?;
        Ok(format!("{host}:{}", self.url.port().unwrap_or(FTP_DEFAULT_PORT)))
    }

    fn take_stream(&mut self, what: &str) -> Result<FtpStream> {
        self.stream
            .take()
            .ok_or_else(|| Error::fetch_failed(what, anyhow!("FTP session is not connected")))
    }

    pub async fn prepare_location(&mut self) -> Result<()> {
        let address = self.address()?;
        let (user, password, base_dir) = (self.user.clone(), self.password.clone(), self.base_dir.clone());

        let connected = tokio::task::spawn_blocking(move || -> anyhow::Result<FtpStream> {
            let mut stream = FtpStream::connect(&address).with_context(|| format!("connect to {address}"))?;
            stream.login(user.as_str(), password.as_str()).context("FTP login")?;
            stream.transfer_type(FileType::Binary).context("switch to binary mode")?;
            stream.cwd(base_dir.as_str()).with_context(|| format!("change directory to {base_dir}"))?;
            Ok(stream)
        })
        .await
        .map_err(|e| Error::unavailable(self.url.as_str(), e))?
        .map_err(|e| Error::unavailable(self.url.as_str(), e))?;

        debug!(url = %self.url, "FTP session established");
        self.stream = Some(connected);
        Ok(())
    }

    pub async fn has_file(&mut self, rel: &str) -> Result<bool> {
        let mut stream = self.take_stream(rel)?;
        let (rel_owned, base_dir) = (rel.trim_start_matches('/').to_string(), self.base_dir.clone());

        let (stream, found) = tokio::task::spawn_blocking(move || -> (Option<FtpStream>, anyhow::Result<bool>) {
            if stream.size(rel_owned.as_str()).is_ok() {
                return (Some(stream), Ok(true));
            }
            // Marker directories such as `Server/` only answer to CWD.
            if stream.cwd(rel_owned.as_str()).is_err() {
                return (Some(stream), Ok(false));
            }
            match stream.cwd(base_dir.as_str()) {
                Ok(()) => (Some(stream), Ok(true)),
                // Relative paths would now resolve elsewhere; give up the session.
                Err(e) => (None, Err(anyhow!(e).context(format!("return to {base_dir}")))),
            }
        })
        .await
        .map_err(|e| Error::fetch_failed(rel, e))?;

        if stream.is_none() {
            warn!(url = %self.url, "lost track of the FTP working directory; closing session");
        }
        self.stream = stream;
        found.map_err(|e| Error::fetch_failed(rel, e))
    }

    pub async fn fetch_file(&mut self, rel: &str, dest: &Path, progress: &Arc<dyn ProgressSink>) -> Result<()> {
        let mut stream = self.take_stream(rel)?;
        let rel_owned = rel.trim_start_matches('/').to_string();
        let dest_owned: PathBuf = dest.to_path_buf();
        let progress = Arc::clone(progress);

        let (stream, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = retrieve(&mut stream, &rel_owned, &dest_owned, &progress);
            (stream, outcome)
        })
        .await
        .map_err(|e| Error::fetch_failed(rel, e))?;

        self.stream = Some(stream);
        outcome.map_err(|e| Error::fetch_failed(rel, e))
    }

    /// Send QUIT and drop the session. Called from `Drop` paths, so the
    /// blocking exchange goes to the blocking pool when a runtime is around.
    pub fn cleanup_location(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let url = self.url.to_string();
        let mut quit = move || {
            if let Err(e) = stream.quit() {
                warn!(%url, error = %e, "failed to close FTP session");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(quit);
            }
            Err(_) => quit(),
        }
    }
}

fn retrieve(stream: &mut FtpStream, rel: &str, dest: &Path, progress: &Arc<dyn ProgressSink>) -> anyhow::Result<()> {
    let total = stream.size(rel).ok().map(|s| s as u64);
    let mut data = stream.retr_as_stream(rel).with_context(|| format!("RETR {rel}"))?;
    let mut out = File::create(dest).with_context(|| format!("create {}", dest.display()))?;

    progress.start(rel, total);
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = data.read(&mut buf).with_context(|| format!("read {rel}"))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])
            .with_context(|| format!("write {}", dest.display()))?;
        progress.advance(n as u64);
    }
    stream.finalize_retr_stream(data).context("finish transfer")?;
    progress.finish();
    Ok(())
}
