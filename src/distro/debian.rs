//! Debian and Ubuntu installer trees.

use super::DistroFamily;
use super::arch::debian_arch;
use super::signature::{ContentProbe, DistroSignature};

const MANIFEST: &str = "current/images/MANIFEST";
const UBUNTU_CD_VERSION: &str = "install/netboot/version.info";
const NETBOOT_ISO: &str = "current/images/netboot/mini.iso";

pub(super) const DEBIAN: DistroSignature = DistroSignature {
    family: DistroFamily::Debian,
    treeinfo_family: None,
    any_of: &[],
    all_of: &[],
    content: &[ContentProbe {
        path: MANIFEST,
        pattern: ".*debian.*",
        version: None,
    }],
    paravirt: true,
};

/// Archive installer tree first, then the alternate-CD layout.
pub(super) const UBUNTU: DistroSignature = DistroSignature {
    family: DistroFamily::Ubuntu,
    treeinfo_family: None,
    any_of: &[],
    all_of: &[],
    content: &[
        ContentProbe {
            path: MANIFEST,
            pattern: ".*[Uu]buntu.*",
            version: None,
        },
        ContentProbe {
            path: UBUNTU_CD_VERSION,
            pattern: ".*[Uu]buntu.*",
            version: Some(r"(?P<version>\d+\.\d+(\.\d+)?)"),
        },
    ],
    paravirt: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebianProfile {
    pub(super) arch: String,
}

impl DebianProfile {
    pub fn kernel_paths(&self, paravirt: bool) -> (String, String) {
        if paravirt {
            (
                "current/images/netboot/xen/vmlinuz".to_string(),
                "current/images/netboot/xen/initrd.gz".to_string(),
            )
        } else {
            let arch = debian_arch(&self.arch);
            (
                format!("current/images/netboot/debian-installer/{arch}/linux"),
                format!("current/images/netboot/debian-installer/{arch}/initrd.gz"),
            )
        }
    }

    pub fn boot_iso_path(&self) -> String {
        NETBOOT_ISO.to_string()
    }
}

/// Where the Ubuntu netboot files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UbuntuLayout {
    /// `dists/<release>/main/installer-<arch>/` on an archive mirror.
    Archive,
    /// Alternate install CD.
    Cd,
}

impl UbuntuLayout {
    pub(super) fn from_marker(marker: Option<&str>) -> Self {
        match marker {
            Some(UBUNTU_CD_VERSION) => UbuntuLayout::Cd,
            _ => UbuntuLayout::Archive,
        }
    }

    fn netboot_dir(self) -> &'static str {
        match self {
            UbuntuLayout::Archive => "current/images/netboot",
            UbuntuLayout::Cd => "install/netboot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbuntuProfile {
    pub(super) arch: String,
    pub(super) layout: UbuntuLayout,
}

impl UbuntuProfile {
    pub fn kernel_paths(&self) -> (String, String) {
        let dir = self.layout.netboot_dir();
        let arch = debian_arch(&self.arch);
        (
            format!("{dir}/ubuntu-installer/{arch}/linux"),
            format!("{dir}/ubuntu-installer/{arch}/initrd.gz"),
        )
    }

    /// Only archive mirrors carry a netboot ISO.
    pub fn boot_iso_path(&self) -> Option<String> {
        match self.layout {
            UbuntuLayout::Archive => Some(NETBOOT_ISO.to_string()),
            UbuntuLayout::Cd => None,
        }
    }
}
