use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use reqwest::{Client, StatusCode, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::progress::ProgressSink;

/// Fetches tree files over HTTP(S) relative to a base URL.
#[derive(Debug)]
pub struct HttpTransport {
    base: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(mut base: Url, user_agent: &str) -> Result<Self> {
        // Url::join drops the last segment unless the base ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::unavailable(base.as_str(), e))?;
        Ok(Self { base, client })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, rel: &str) -> Result<Url> {
        self.base
            .join(rel.trim_start_matches('/'))
            .map_err(|e| Error::fetch_failed(rel, e))
    }

    pub async fn prepare_location(&mut self) -> Result<()> {
        let res = self
            .client
            .get(self.base.clone())
            .send()
            .await
            .map_err(|e| Error::unavailable(self.base.as_str(), e))?;

        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::unavailable(
                self.base.as_str(),
                anyhow!("Opening URL {} failed: HTTP {status}", self.base),
            ));
        }
        Ok(())
    }

    pub async fn has_file(&mut self, rel: &str) -> Result<bool> {
        let url = self.url_for(rel)?;
        let res = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| Error::fetch_failed(rel, e))?;

        let status = res.status();
        debug!(%url, %status, "probed remote file");
        Ok(match status {
            s if s.is_success() => true,
            // Some mirrors refuse HEAD outright; fall back to a GET probe.
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => self
                .client
                .get(url)
                .send()
                .await
                .map(|r| r.status().is_success())
                .map_err(|e| Error::fetch_failed(rel, e))?,
            _ => false,
        })
    }

    pub async fn fetch_file(&mut self, rel: &str, dest: &Path, progress: &Arc<dyn ProgressSink>) -> Result<()> {
        let url = self.url_for(rel)?;
        let mut res = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::fetch_failed(rel, e))?;

        let mut file = File::create(dest).await.map_err(|e| Error::io(dest, e))?;
        progress.start(url.as_str(), res.content_length());

        while let Some(chunk) = res.chunk().await.map_err(|e| Error::fetch_failed(rel, e))? {
            file.write_all(&chunk).await.map_err(|e| Error::io(dest, e))?;
            progress.advance(chunk.len() as u64);
        }
        file.flush().await.map_err(|e| Error::io(dest, e))?;
        progress.finish();

        debug!(%url, dest = %dest.display(), "downloaded file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_gets_trailing_slash() {
        let t = HttpTransport::new(Url::parse("http://mirror/fedora/os").unwrap(), "test").unwrap();
        assert_eq!(t.base().as_str(), "http://mirror/fedora/os/");
        assert_eq!(
            t.url_for("images/pxeboot/vmlinuz").unwrap().as_str(),
            "http://mirror/fedora/os/images/pxeboot/vmlinuz"
        );
    }

    #[test]
    fn leading_slash_stays_relative() {
        let t = HttpTransport::new(Url::parse("http://mirror/os/").unwrap(), "test").unwrap();
        assert_eq!(t.url_for("/.treeinfo").unwrap().as_str(), "http://mirror/os/.treeinfo");
    }
}
