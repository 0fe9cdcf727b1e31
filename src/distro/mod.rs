//! Distribution detection and kernel/ISO extraction.
//!
//! [`REGISTRY`] lists the known signatures in priority order. Matching
//! walks it and stops at the first signature that accepts the tree; later
//! entries are never consulted, so the order decides ambiguous trees.

pub mod arch;
mod debian;
mod gentoo;
mod mandriva;
mod redhat;
mod signature;
mod suse;
pub mod treeinfo;

pub use debian::{DebianProfile, UbuntuLayout, UbuntuProfile};
pub use gentoo::GentooProfile;
pub use mandriva::MandrivaProfile;
pub use redhat::RedHatProfile;
pub use signature::{ContentProbe, DistroSignature, Evidence};
pub use suse::SuseProfile;
pub use treeinfo::TreeInfo;

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::config::AcquireHints;
use crate::error::{Error, Result};
use crate::location::InstallLocation;
use crate::media::{BootDisk, KernelImages, remove_scratch_file};
use crate::session::{FetchSession, persist};

/// Recognised distribution families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistroFamily {
    Fedora,
    Rhel,
    CentOs,
    ScientificLinux,
    Suse,
    Debian,
    Ubuntu,
    Gentoo,
    Mandriva,
}

impl DistroFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistroFamily::Fedora => "fedora",
            DistroFamily::Rhel => "rhel",
            DistroFamily::CentOs => "centos",
            DistroFamily::ScientificLinux => "sl",
            DistroFamily::Suse => "suse",
            DistroFamily::Debian => "debian",
            DistroFamily::Ubuntu => "ubuntu",
            DistroFamily::Gentoo => "gentoo",
            DistroFamily::Mandriva => "mandriva",
        }
    }

    pub fn signature(&self) -> &'static DistroSignature {
        // Every family has exactly one registry entry.
        REGISTRY
            .iter()
            .find(|s| s.family == *self)
            .unwrap_or(&REGISTRY[0])
    }
}

impl fmt::Display for DistroFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown distribution family '{0}'")]
pub struct UnknownFamily(pub String);

impl FromStr for DistroFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        REGISTRY
            .iter()
            .map(|sig| sig.family)
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFamily(s.to_string()))
    }
}

/// Probe order. Subtypes must precede the families they resemble.
pub static REGISTRY: [DistroSignature; 9] = [
    redhat::FEDORA,
    redhat::RHEL,
    redhat::CENTOS,
    redhat::SCIENTIFIC,
    suse::SUSE,
    debian::DEBIAN,
    debian::UBUNTU,
    gentoo::GENTOO,
    mandriva::MANDRIVA,
];

/// Family-specific extraction logic for a matched tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistroProfile {
    RedHat(RedHatProfile),
    Suse(SuseProfile),
    Debian(DebianProfile),
    Ubuntu(UbuntuProfile),
    Gentoo(GentooProfile),
    Mandriva(MandrivaProfile),
}

/// Result of a successful match, consumed by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedDistro {
    pub family: DistroFamily,
    pub version: Option<String>,
    pub arch: String,
    pub profile: DistroProfile,
}

impl MatchedDistro {
    fn from_evidence(family: DistroFamily, evidence: Evidence, hints: &AcquireHints) -> Self {
        let arch = evidence.arch.clone().unwrap_or_else(|| hints.arch());
        let profile = match family {
            DistroFamily::Fedora | DistroFamily::Rhel | DistroFamily::CentOs | DistroFamily::ScientificLinux => {
                DistroProfile::RedHat(RedHatProfile {
                    family,
                    treeinfo: evidence.treeinfo,
                    arch: arch.clone(),
                })
            }
            DistroFamily::Suse => DistroProfile::Suse(SuseProfile { arch: arch.clone() }),
            DistroFamily::Debian => DistroProfile::Debian(DebianProfile { arch: arch.clone() }),
            DistroFamily::Ubuntu => DistroProfile::Ubuntu(UbuntuProfile {
                arch: arch.clone(),
                layout: UbuntuLayout::from_marker(evidence.marker),
            }),
            DistroFamily::Gentoo => DistroProfile::Gentoo(GentooProfile),
            DistroFamily::Mandriva => DistroProfile::Mandriva(MandrivaProfile),
        };
        Self {
            family,
            version: evidence.version,
            arch,
            profile,
        }
    }
}

/// Find the first signature in registry order that accepts the tree, or
/// only the hinted family when `hints.distro` is set.
pub async fn match_distro(session: &mut FetchSession, hints: &AcquireHints) -> Result<Option<MatchedDistro>> {
    let candidates: Vec<&DistroSignature> = match hints.distro {
        Some(family) => vec![family.signature()],
        None => REGISTRY.iter().collect(),
    };

    debug!(location = %session.location(), candidates = candidates.len(), "attempting to detect distro");
    for signature in candidates {
        if let Some(evidence) = signature.is_valid_store(session, hints).await? {
            let matched = MatchedDistro::from_evidence(signature.family, evidence, hints);
            info!(
                family = %matched.family,
                version = matched.version.as_deref().unwrap_or("unknown"),
                arch = %matched.arch,
                "detected distribution"
            );
            return Ok(Some(matched));
        }
    }
    Ok(None)
}

impl DistroProfile {
    pub fn family(&self) -> DistroFamily {
        match self {
            DistroProfile::RedHat(p) => p.family,
            DistroProfile::Suse(_) => DistroFamily::Suse,
            DistroProfile::Debian(_) => DistroFamily::Debian,
            DistroProfile::Ubuntu(_) => DistroFamily::Ubuntu,
            DistroProfile::Gentoo(_) => DistroFamily::Gentoo,
            DistroProfile::Mandriva(_) => DistroFamily::Mandriva,
        }
    }

    /// Tree-relative kernel and initrd paths.
    pub fn kernel_paths(&self, hints: &AcquireHints) -> (String, String) {
        let paravirt = hints.is_paravirt();
        match self {
            DistroProfile::RedHat(p) => p.kernel_paths(paravirt),
            DistroProfile::Suse(p) => p.kernel_paths(paravirt),
            DistroProfile::Debian(p) => p.kernel_paths(paravirt),
            DistroProfile::Ubuntu(p) => p.kernel_paths(),
            DistroProfile::Gentoo(p) => p.kernel_paths(),
            DistroProfile::Mandriva(p) => p.kernel_paths(),
        }
    }

    /// Tree-relative boot ISO path, if the family ships one.
    pub fn boot_iso_path(&self) -> Option<String> {
        match self {
            DistroProfile::RedHat(p) => Some(p.boot_iso_path()),
            DistroProfile::Suse(p) => Some(p.boot_iso_path()),
            DistroProfile::Debian(p) => Some(p.boot_iso_path()),
            DistroProfile::Ubuntu(p) => p.boot_iso_path(),
            DistroProfile::Gentoo(_) => None,
            DistroProfile::Mandriva(p) => Some(p.boot_iso_path()),
        }
    }

    pub fn boot_args(&self, location: &InstallLocation) -> String {
        match self {
            DistroProfile::RedHat(p) => p.boot_args(location),
            DistroProfile::Suse(p) => p.boot_args(location),
            DistroProfile::Debian(_) | DistroProfile::Ubuntu(_) => String::new(),
            DistroProfile::Gentoo(p) => p.boot_args(),
            DistroProfile::Mandriva(p) => p.boot_args(location),
        }
    }

    fn checksum(&self, path: &str) -> Option<(&str, &str)> {
        match self {
            DistroProfile::RedHat(p) => p.checksum(path),
            _ => None,
        }
    }

    /// Fetch kernel and initrd into the scratch dir. Both copies delete
    /// themselves until the pair is complete, so an error, cancellation or
    /// timeout part way through leaves no stray file.
    pub async fn acquire_kernel(&self, session: &mut FetchSession, hints: &AcquireHints) -> Result<KernelImages> {
        let (kernel_path, initrd_path) = self.kernel_paths(hints);
        let kernel = self.fetch_expected(session, &kernel_path).await?;
        let initrd = self.fetch_expected(session, &initrd_path).await?;

        let kernel = persist(kernel)?;
        let initrd = match persist(initrd) {
            Ok(initrd) => initrd,
            Err(e) => {
                remove_scratch_file(&kernel);
                return Err(e);
            }
        };
        Ok(KernelImages {
            kernel,
            initrd,
            args: self.boot_args(session.location()),
        })
    }

    /// Fetch the family's boot ISO into the scratch dir.
    pub async fn acquire_boot_disk(&self, session: &mut FetchSession) -> Result<BootDisk> {
        let iso_path = self.boot_iso_path().ok_or_else(|| Error::Unsupported {
            family: self.family().to_string(),
            operation: "boot disk acquisition".to_string(),
        })?;
        let iso = self.fetch_expected(session, &iso_path).await?;
        Ok(BootDisk { iso: persist(iso)? })
    }

    /// A matched tree promises these files; absence is an inconsistency,
    /// not a reason to try another family.
    async fn fetch_expected(&self, session: &mut FetchSession, rel: &str) -> Result<TempPath> {
        if !session.has_file(rel).await? {
            return Err(Error::ExtractionInconsistent {
                family: self.family().to_string(),
                location: session.location().to_string(),
                path: rel.to_string(),
            });
        }
        let local = session.fetch_temp(rel).await?;
        self.verify(rel, &local).await?;
        Ok(local)
    }

    async fn verify(&self, rel: &str, local: &std::path::Path) -> Result<()> {
        let Some((algorithm, expected)) = self.checksum(rel) else {
            return Ok(());
        };
        if !algorithm.eq_ignore_ascii_case("sha256") {
            warn!(file = rel, algorithm, "unsupported checksum algorithm; not verifying");
            return Ok(());
        }

        let bytes = tokio::fs::read(local).await.map_err(|e| Error::io(local, e))?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::ChecksumMismatch {
                path: rel.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        debug!(file = rel, "checksum verified");
        Ok(())
    }
}
