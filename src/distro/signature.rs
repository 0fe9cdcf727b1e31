use regex::Regex;
use tracing::debug;

use super::DistroFamily;
use super::arch;
use super::treeinfo::{TREEINFO, TreeInfo};
use crate::config::AcquireHints;
use crate::error::{Error, Result};
use crate::session::FetchSession;

/// A file whose content must contain a line matching `pattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentProbe {
    pub path: &'static str,
    pub pattern: &'static str,
    /// Optional regex with a `version` group, applied to the matching line.
    pub version: Option<&'static str>,
}

/// Static description of how a family is recognised.
///
/// The probe categories are alternatives, tried in field order. A present
/// `.treeinfo` that names another family is a definite rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistroSignature {
    pub family: DistroFamily,
    /// Regex matched against `[general] family` of `.treeinfo`.
    pub treeinfo_family: Option<&'static str>,
    /// Any one of these paths existing confirms the family.
    pub any_of: &'static [&'static str],
    /// All of these paths existing confirms the family.
    pub all_of: &'static [&'static str],
    pub content: &'static [ContentProbe],
    /// Whether paravirt (`xen`) kernels are available.
    pub paravirt: bool,
}

/// What a successful probe saw; feeds profile construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub treeinfo: Option<TreeInfo>,
    pub marker: Option<&'static str>,
    pub version: Option<String>,
    pub arch: Option<String>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("bad probe pattern '{pattern}': {e}")))
}

impl DistroSignature {
    /// Check whether the tree behind `session` belongs to this family.
    pub async fn is_valid_store(&self, session: &mut FetchSession, hints: &AcquireHints) -> Result<Option<Evidence>> {
        let family = self.family;

        if hints.is_paravirt() && !self.paravirt {
            debug!(%family, "family has no paravirt kernels; skipping");
            return Ok(None);
        }

        if let Some(pattern) = self.treeinfo_family
            && let Some(treeinfo) = session.treeinfo().await?
        {
            let treeinfo = treeinfo.clone();
            return self.check_treeinfo(pattern, treeinfo, hints);
        }

        for &marker in self.any_of {
            if session.has_file(marker).await? {
                debug!(%family, marker, "detected distro by marker file");
                return Ok(Some(Evidence {
                    marker: Some(marker),
                    ..Evidence::default()
                }));
            }
        }

        if !self.all_of.is_empty() {
            let mut all_present = true;
            for path in self.all_of {
                if !session.has_file(path).await? {
                    all_present = false;
                    break;
                }
            }
            if all_present {
                debug!(%family, "detected distro by marker set");
                return Ok(Some(Evidence {
                    marker: self.all_of.first().copied(),
                    ..Evidence::default()
                }));
            }
        }

        for probe in self.content {
            if !session.has_file(probe.path).await? {
                continue;
            }
            let text = session.read_text(probe.path).await?;
            if let Some(evidence) = match_content(probe, &text)? {
                debug!(%family, file = probe.path, "detected distro by file content");
                return Ok(Some(evidence));
            }
        }

        debug!(%family, "doesn't look like this distro");
        Ok(None)
    }

    fn check_treeinfo(&self, pattern: &str, treeinfo: TreeInfo, hints: &AcquireHints) -> Result<Option<Evidence>> {
        let family = self.family;
        let tree_family = treeinfo.family().unwrap_or_default();
        if !compile(pattern)?.is_match(tree_family) {
            debug!(%family, tree_family, "treeinfo names a different family");
            return Ok(None);
        }

        if let (Some(wanted), Some(tree_arch)) = (hints.arch.as_deref(), treeinfo.arch())
            && !arch::compatible(wanted, tree_arch)
        {
            debug!(%family, wanted, tree_arch, "treeinfo architecture does not match");
            return Ok(None);
        }

        debug!(%family, version = ?treeinfo.version(), "detected distro from treeinfo");
        Ok(Some(Evidence {
            version: treeinfo.version().map(str::to_string),
            arch: treeinfo.arch().map(str::to_string),
            marker: Some(TREEINFO),
            treeinfo: Some(treeinfo),
        }))
    }
}

fn match_content(probe: &ContentProbe, text: &str) -> Result<Option<Evidence>> {
    let re = compile(probe.pattern)?;
    let Some(line) = text.lines().find(|l| re.is_match(l)) else {
        return Ok(None);
    };

    let version = match probe.version {
        Some(v) => compile(v)?
            .captures(line)
            .and_then(|c| c.name("version"))
            .map(|m| m.as_str().to_string()),
        None => None,
    };

    Ok(Some(Evidence {
        marker: Some(probe.path),
        version,
        ..Evidence::default()
    }))
}
