use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;

use super::local::{copy_with_progress, path_exists};
use super::local_join;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;

/// Reads an unpacked install tree in place, no mount involved.
#[derive(Debug)]
pub struct DirectTransport {
    root: PathBuf,
}

impl DirectTransport {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn prepare_location(&mut self) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::unavailable(
                self.root.display().to_string(),
                anyhow!("not a directory"),
            )),
            Err(e) => Err(Error::unavailable(self.root.display().to_string(), e)),
        }
    }

    pub async fn has_file(&mut self, rel: &str) -> Result<bool> {
        match local_join(&self.root, rel) {
            Some(path) => path_exists(&path, rel).await,
            None => Ok(false),
        }
    }

    pub async fn fetch_file(&mut self, rel: &str, dest: &Path, progress: &Arc<dyn ProgressSink>) -> Result<()> {
        let src = local_join(&self.root, rel)
            .ok_or_else(|| Error::fetch_failed(rel, anyhow!("path escapes the install tree")))?;
        copy_with_progress(&src, dest, rel, progress).await
    }
}
