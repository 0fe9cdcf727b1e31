//! Fedora, RHEL, CentOS and Scientific Linux trees (anaconda layout).

use super::DistroFamily;
use super::signature::DistroSignature;
use super::treeinfo::TreeInfo;
use crate::location::InstallLocation;

pub(super) const FEDORA: DistroSignature = DistroSignature {
    family: DistroFamily::Fedora,
    treeinfo_family: Some(".*Fedora.*"),
    any_of: &["Fedora", "fedora.css"],
    all_of: &[],
    content: &[],
    paravirt: true,
};

/// `Server`/`Client` for 5.x trees, `RedHat` for 4.x.
pub(super) const RHEL: DistroSignature = DistroSignature {
    family: DistroFamily::Rhel,
    treeinfo_family: Some(".*Red Hat Enterprise Linux.*"),
    any_of: &["Server", "Client", "RedHat"],
    all_of: &[],
    content: &[],
    paravirt: true,
};

pub(super) const CENTOS: DistroSignature = DistroSignature {
    family: DistroFamily::CentOs,
    treeinfo_family: Some(".*CentOS.*"),
    any_of: &["CentOS"],
    all_of: &[],
    content: &[],
    paravirt: true,
};

pub(super) const SCIENTIFIC: DistroSignature = DistroSignature {
    family: DistroFamily::ScientificLinux,
    treeinfo_family: Some(".*Scientific Linux.*"),
    any_of: &["SL"],
    all_of: &[],
    content: &[],
    paravirt: true,
};

const PXE_KERNEL: (&str, &str) = ("images/pxeboot/vmlinuz", "images/pxeboot/initrd.img");
const XEN_KERNEL: (&str, &str) = ("images/xen/vmlinuz", "images/xen/initrd.img");
const BOOT_ISO: &str = "images/boot.iso";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedHatProfile {
    pub(super) family: DistroFamily,
    pub(super) treeinfo: Option<TreeInfo>,
    pub(super) arch: String,
}

impl RedHatProfile {
    fn image_section(&self, paravirt: bool) -> String {
        if paravirt {
            "images-xen".to_string()
        } else {
            format!("images-{}", self.arch)
        }
    }

    /// Treeinfo entries win; the classic anaconda paths are the fallback.
    pub fn kernel_paths(&self, paravirt: bool) -> (String, String) {
        let section = self.image_section(paravirt);
        if let Some((kernel, initrd)) = self.treeinfo.as_ref().and_then(|t| t.kernel_pair(&section)) {
            return (kernel.to_string(), initrd.to_string());
        }
        let (kernel, initrd) = if paravirt { XEN_KERNEL } else { PXE_KERNEL };
        (kernel.to_string(), initrd.to_string())
    }

    pub fn boot_iso_path(&self) -> String {
        self.treeinfo
            .as_ref()
            .and_then(|t| t.get(&self.image_section(false), "boot.iso"))
            .unwrap_or(BOOT_ISO)
            .to_string()
    }

    /// Anaconda needs to be told where the packages live.
    pub fn boot_args(&self, location: &InstallLocation) -> String {
        format!("method={location}")
    }

    pub fn checksum(&self, path: &str) -> Option<(&str, &str)> {
        self.treeinfo.as_ref()?.checksum(path)
    }
}
