use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::progress::ProgressSink;

const COPY_CHUNK: usize = 64 * 1024;

/// Copy a local file in chunks so progress can be reported.
pub(super) async fn copy_with_progress(
    src: &Path,
    dest: &Path,
    label: &str,
    progress: &Arc<dyn ProgressSink>,
) -> Result<()> {
    let mut input = File::open(src).await.map_err(|e| Error::fetch_failed(label, e))?;
    let total = input.metadata().await.ok().map(|m| m.len());
    let mut output = File::create(dest).await.map_err(|e| Error::io(dest, e))?;

    progress.start(label, total);
    let mut buf = vec![0u8; COPY_CHUNK];
    loop {
        let n = input.read(&mut buf).await.map_err(|e| Error::fetch_failed(label, e))?;
        if n == 0 {
            break;
        }
        output.write_all(&buf[..n]).await.map_err(|e| Error::io(dest, e))?;
        progress.advance(n as u64);
    }
    output.flush().await.map_err(|e| Error::io(dest, e))?;
    progress.finish();
    Ok(())
}

/// Whether `path` exists. A non-directory in the middle of the path means
/// absent; any other I/O error is reported against `rel`.
pub(super) async fn path_exists(path: &Path, rel: &str) -> Result<bool> {
    match tokio::fs::try_exists(path).await {
        Ok(found) => Ok(found),
        Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(false),
        Err(e) => Err(Error::fetch_failed(rel, e)),
    }
}
