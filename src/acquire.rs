//! Top-level entry points: resolve, prepare, match, extract, clean up.

use std::future::Future;

use tracing::{debug, info, warn};

use crate::config::AcquireOptions;
use crate::distro::{MatchedDistro, match_distro};
use crate::error::{Error, Result};
use crate::location::{InstallLocation, LocationResolver};
use crate::media::{BootDisk, KernelImages};
use crate::session::{AcquisitionState, FetchSession};

/// Fetch a kernel/initrd pair for the distribution at `raw`.
pub async fn acquire_kernel(raw: &str, options: &AcquireOptions) -> Result<KernelImages> {
    let location = LocationResolver::new().resolve(raw)?;
    acquire_kernel_at(&location, options).await
}

/// Fetch the boot ISO for the distribution at `raw`.
pub async fn acquire_boot_disk(raw: &str, options: &AcquireOptions) -> Result<BootDisk> {
    let location = LocationResolver::new().resolve(raw)?;
    acquire_boot_disk_at(&location, options).await
}

/// Like [`acquire_kernel`] for an already resolved location.
pub async fn acquire_kernel_at(location: &InstallLocation, options: &AcquireOptions) -> Result<KernelImages> {
    let mut session = FetchSession::open(location.clone(), options)?;
    let outcome = guarded(options, async {
        let matched = prepare_and_match(&mut session, options).await?;
        let images = matched.profile.acquire_kernel(&mut session, &options.hints).await?;
        session.advance(AcquisitionState::Extracted);
        Ok(images)
    })
    .await;
    finish(&mut session, outcome)
}

/// Like [`acquire_boot_disk`] for an already resolved location.
pub async fn acquire_boot_disk_at(location: &InstallLocation, options: &AcquireOptions) -> Result<BootDisk> {
    let mut session = FetchSession::open(location.clone(), options)?;
    let outcome = guarded(options, async {
        let matched = prepare_and_match(&mut session, options).await?;
        let disk = matched.profile.acquire_boot_disk(&mut session).await?;
        session.advance(AcquisitionState::Extracted);
        Ok(disk)
    })
    .await;
    finish(&mut session, outcome)
}

async fn prepare_and_match(session: &mut FetchSession, options: &AcquireOptions) -> Result<MatchedDistro> {
    session.prepare().await?;

    let matched = match_distro(session, &options.hints)
        .await?
        .ok_or_else(|| Error::UnrecognizedDistribution {
            location: session.location().to_string(),
        })?;
    session.advance(AcquisitionState::DistroMatched);
    Ok(matched)
}

/// Run `work` under the caller's cancellation token and deadline.
async fn guarded<T>(options: &AcquireOptions, work: impl Future<Output = Result<T>>) -> Result<T> {
    let cancellable = async {
        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Err(Error::Cancelled),
            result = work => result,
        }
    };

    match options.timeout() {
        Some(limit) => tokio::time::timeout(limit, cancellable)
            .await
            .unwrap_or(Err(Error::TimedOut(limit))),
        None => cancellable.await,
    }
}

/// Cleanup always runs; the original error, if any, is what propagates.
fn finish<T>(session: &mut FetchSession, outcome: Result<T>) -> Result<T> {
    session.cleanup();
    match &outcome {
        Ok(_) => info!(location = %session.location(), "install media acquired"),
        Err(e) => warn!(location = %session.location(), kind = e.kind(), error = %e, "acquisition failed"),
    }
    debug!(state = %session.state(), "acquisition finished");
    outcome
}
